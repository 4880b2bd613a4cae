#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **otel-advisor-recommender** – orchestrates one recommendation cycle:
//! cache lookup, rate-limit acquisition, the advisory client call, parsing,
//! and the static fallback path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use otel_advisor_cache::RecommendationCache;
use otel_advisor_llm::{AdvisoryClient, AdvisoryError};
use otel_advisor_policy::render_summaries;
use otel_advisor_ratelimit::{RateLimitError, RateLimiter};
use otel_advisor_types::{
    FilterRule, LabelPolicy, ParsedRecommendations, Priority, Recommendation, RecommendationType, Sample, SignalKind,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors a recommendation cycle can return when it is not able to fall
/// back to the static rule set.
#[derive(Debug, thiserror::Error)]
pub enum RecommenderError {
    /// The rate limiter wait was cancelled before a token became available.
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
    /// The advisory client failed and no fallback was configured.
    #[error(transparent)]
    Advisory(#[from] AdvisoryError),
    /// The reply could not be parsed and no fallback was configured.
    #[error(transparent)]
    Parse(#[from] otel_advisor_parser::ParseError),
}

/// Tunables for a [`Recommender`].
#[derive(Debug, Clone, Copy)]
pub struct RecommenderOptions {
    /// Whether to consult and populate the recommendation cache.
    pub enable_cache: bool,
    /// Whether to gate advisory calls behind the rate limiter.
    pub enable_rate_limit: bool,
    /// Whether advisory/parse failures should fall back to the static
    /// rule set rather than propagate.
    pub fallback_to_static: bool,
}

impl Default for RecommenderOptions {
    fn default() -> Self {
        Self { enable_cache: true, enable_rate_limit: true, fallback_to_static: true }
    }
}

/// Orchestrates the cache -> rate-limiter -> advisory-client -> parser flow.
pub struct Recommender {
    client: Arc<dyn AdvisoryClient>,
    cache: Option<Arc<RecommendationCache>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    options: RecommenderOptions,
}

impl Recommender {
    /// Construct a recommender from its collaborators. Pass `None` for
    /// `cache`/`rate_limiter` to disable those stages outright, independent
    /// of the `enable_*` flags in `options` (both must agree for the stage
    /// to actually run).
    pub fn new(
        client: Arc<dyn AdvisoryClient>,
        cache: Option<Arc<RecommendationCache>>,
        rate_limiter: Option<Arc<RateLimiter>>,
        options: RecommenderOptions,
    ) -> Self {
        Self { client, cache, rate_limiter, options }
    }

    /// Whether this recommender falls back to the static rule set when the
    /// advisory client or parser fails.
    pub fn fallback_to_static(&self) -> bool {
        self.options.fallback_to_static
    }

    /// Run one recommendation cycle against `sample` under `policies`.
    pub async fn recommend(
        &self,
        sample: &Sample,
        policies: &[LabelPolicy],
        cancel: &CancellationToken,
    ) -> Result<ParsedRecommendations, RecommenderError> {
        if self.options.enable_cache {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.lookup(sample).await {
                    info!("recommendation cache hit");
                    return Ok(hit);
                }
            }
        }

        if self.options.enable_rate_limit {
            if let Some(limiter) = &self.rate_limiter {
                limiter.wait(cancel).await?;
            }
        }

        let sample_json = serde_json::to_string(sample).unwrap_or_default();
        let policy_summaries = render_summaries(policies);

        let parsed = match self.client.recommend(&sample_json, &policy_summaries).await {
            Ok(reply) => match otel_advisor_parser::parse(&reply, Utc::now()) {
                Ok(parsed) => parsed,
                Err(e) if self.options.fallback_to_static => {
                    warn!(error = %e, "advisory reply failed to parse, using static fallback");
                    static_fallback(Utc::now())
                }
                Err(e) => return Err(e.into()),
            },
            Err(e) if self.options.fallback_to_static => {
                warn!(error = %e, "advisory client call failed, using static fallback");
                static_fallback(Utc::now())
            }
            Err(e) => return Err(e.into()),
        };

        if self.options.enable_cache {
            if let Some(cache) = &self.cache {
                cache.store(sample, parsed.clone()).await;
            }
        }

        Ok(parsed)
    }
}

/// The built-in static recommendation set used when the advisory client is
/// unreachable and `fallback_to_static` is enabled.
pub fn static_fallback(now: DateTime<Utc>) -> ParsedRecommendations {
    let drop_debug = Recommendation {
        id: "static-drop-debug-logs".to_string(),
        r#type: RecommendationType::DropSignal,
        priority: Priority::Medium,
        description: "Drop DEBUG-level logs; they are high volume and rarely consulted".to_string(),
        rationale: "Static fallback advice used while the advisory service is unavailable".to_string(),
        rules: vec![FilterRule::new_drop(
            "static-drop-debug-logs",
            SignalKind::Log,
            r#"attributes["level"] == "DEBUG""#,
            "drop debug-level logs",
            now,
        )],
        estimated_saving: "10-20%".to_string(),
        created_at: now,
    };
    let require_env = Recommendation {
        id: "static-require-environment-label".to_string(),
        r#type: RecommendationType::LabelPolicy,
        priority: Priority::High,
        description: "Traces missing the environment resource label violate compliance requirements".to_string(),
        rationale: "Static fallback advice used while the advisory service is unavailable".to_string(),
        rules: vec![FilterRule::new_drop(
            "static-require-environment-label",
            SignalKind::Trace,
            r#"resource.attributes["environment"] == nil"#,
            "drop traces missing an environment label",
            now,
        )],
        estimated_saving: "Unknown".to_string(),
        created_at: now,
    };
    ParsedRecommendations::from_recommendations(vec![drop_debug, require_env], now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use otel_advisor_types::SampleMetadata;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubClient {
        calls: AtomicUsize,
        reply: Option<String>,
    }

    #[async_trait]
    impl AdvisoryClient for StubClient {
        async fn recommend(&self, _sample_json: &str, _policy_summaries: &[String]) -> Result<String, AdvisoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(r) => Ok(r.clone()),
                None => Err(AdvisoryError::Transport { status: 503, body: "down".to_string() }),
            }
        }

        async fn validate_connection(&self) -> Result<(), AdvisoryError> {
            Ok(())
        }
    }

    fn sample(n: usize) -> Sample {
        Sample {
            traces: vec![],
            metrics: vec![],
            logs: vec![],
            metadata: SampleMetadata {
                total_traces: n,
                total_metrics: 0,
                total_logs: 0,
                services: BTreeSet::new(),
                sampled_at: Utc::now(),
                time_range: "recent".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn fallback_returned_when_client_fails() {
        let client = Arc::new(StubClient { calls: AtomicUsize::new(0), reply: None });
        let recommender = Recommender::new(client.clone(), None, None, RecommenderOptions { enable_cache: false, enable_rate_limit: false, fallback_to_static: true });
        let cancel = CancellationToken::new();
        let parsed = recommender.recommend(&sample(1), &[], &cancel).await.unwrap();
        assert_eq!(parsed, static_fallback(parsed.generated_at));
    }

    #[tokio::test]
    async fn error_propagates_when_fallback_disabled() {
        let client = Arc::new(StubClient { calls: AtomicUsize::new(0), reply: None });
        let recommender = Recommender::new(client, None, None, RecommenderOptions { enable_cache: false, enable_rate_limit: false, fallback_to_static: false });
        let cancel = CancellationToken::new();
        assert!(recommender.recommend(&sample(1), &[], &cancel).await.is_err());
    }

    #[tokio::test]
    async fn rate_limit_cancellation_is_propagated() {
        let client = Arc::new(StubClient { calls: AtomicUsize::new(0), reply: None });
        let limiter = RateLimiter::new(1);
        // Drain the single token so the next wait would block.
        let cancel_drain = CancellationToken::new();
        limiter.wait(&cancel_drain).await.unwrap();

        let recommender = Recommender::new(
            client,
            None,
            Some(limiter),
            RecommenderOptions { enable_cache: false, enable_rate_limit: true, fallback_to_static: true },
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = recommender.recommend(&sample(1), &[], &cancel).await;
        assert!(matches!(result, Err(RecommenderError::RateLimit(_))));
    }
}
