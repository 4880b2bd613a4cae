//! Error taxonomy for the advisory client.

/// Errors the advisory client can return. Every variant maps to exactly one
/// row of the pipeline's error taxonomy: configuration errors are fatal at
/// start, transport errors are recoverable and drive the fallback path.
#[derive(Debug, thiserror::Error)]
pub enum AdvisoryError {
    /// The client was built with an invalid configuration (bad URL, empty
    /// API key, etc).
    #[error("invalid advisory client configuration: {0}")]
    Configuration(String),

    /// The HTTP round-trip failed or returned a non-2xx status.
    #[error("advisory service transport error (status {status}): {body}")]
    Transport {
        /// HTTP status code, or 0 if the request never completed.
        status: u16,
        /// Truncated response body, for diagnostics.
        body: String,
    },

    /// The request exceeded its configured timeout.
    #[error("advisory service request timed out")]
    Timeout,

    /// The reply body could not be parsed into the expected envelope shape.
    #[error("malformed advisory service response: {0}")]
    MalformedResponse(String),
}
