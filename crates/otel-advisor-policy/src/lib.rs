#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **otel-advisor-policy** – loads the operator's label-policy YAML
//! document, validates it, and hot-reloads it on modification-time change.
//!
//! Follows the same shape as this codebase's agent-configuration loader:
//! read file, `serde_yaml::from_str`, field-by-field validation, and an
//! atomic whole-document replacement on reload rather than a merge.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use otel_advisor_types::LabelPolicy;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors from loading or validating a policy document.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The policy file could not be read.
    #[error("failed to read policy file {path}: {source}")]
    Io {
        /// The path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The policy file was not valid YAML.
    #[error("failed to parse policy file {path}: {source}")]
    Parse {
        /// The path that failed to parse.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },
    /// A policy failed validation.
    #[error("invalid policy {name}: {reason}")]
    Validation {
        /// Name of the offending policy, or `"<unnamed>"` if empty.
        name: String,
        /// Why validation failed.
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    policies: Vec<LabelPolicy>,
}

fn validate_policies(policies: &[LabelPolicy]) -> Result<(), PolicyError> {
    for policy in policies {
        if policy.name.trim().is_empty() {
            return Err(PolicyError::Validation {
                name: "<unnamed>".to_string(),
                reason: "name must not be empty".to_string(),
            });
        }
        for pattern in &policy.label_patterns {
            if Regex::new(pattern).is_err() {
                return Err(PolicyError::Validation {
                    name: policy.name.clone(),
                    reason: format!("invalid label pattern: {pattern}"),
                });
            }
        }
    }
    Ok(())
}

/// Load and validate a policy document from `path`, without installing it
/// anywhere. Used for both initial load and the CLI's `policy validate`
/// subcommand.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Vec<LabelPolicy>, PolicyError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| PolicyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: PolicyDocument = serde_yaml::from_str(&contents).map_err(|source| PolicyError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate_policies(&doc.policies)?;
    Ok(doc.policies)
}

/// Render short human-readable summaries of each policy, suitable for
/// interpolation into the advisory LLM's prompt.
pub fn render_summaries(policies: &[LabelPolicy]) -> Vec<String> {
    policies
        .iter()
        .map(|p| {
            format!(
                "{} (enforcement={:?}, required={:?}, forbidden={:?}, patterns={:?})",
                p.name, p.enforcement, p.required_labels, p.forbidden_labels, p.label_patterns
            )
        })
        .collect()
}

/// Owns the current policy snapshot and watches the backing file for
/// modification-time changes.
pub struct PolicyManager {
    path: PathBuf,
    current: RwLock<Arc<Vec<LabelPolicy>>>,
    last_mtime: RwLock<Option<SystemTime>>,
}

impl PolicyManager {
    /// Load the initial policy document from `path`. Fails if the initial
    /// load fails – an operator-supplied policy file that doesn't parse at
    /// start-up is a configuration error, not a recoverable one.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PolicyError> {
        let path = path.into();
        let policies = load_from_file(&path)?;
        let mtime = fs::metadata(&path).ok().and_then(|m| m.modified().ok());
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(policies)),
            last_mtime: RwLock::new(mtime),
        })
    }

    /// The current policy snapshot.
    pub async fn current(&self) -> Arc<Vec<LabelPolicy>> {
        self.current.read().await.clone()
    }

    /// Check whether the backing file's modification time has advanced
    /// since the last load and, if so, attempt to reload it. On parse or
    /// validation failure the previous snapshot is kept and a warning is
    /// logged; this method never propagates a reload failure to the
    /// caller. Returns `true` iff the snapshot was replaced.
    pub async fn reload_if_changed(&self) -> bool {
        let mtime = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "could not stat policy file for reload");
                return false;
            }
        };

        {
            let last = self.last_mtime.read().await;
            if Some(mtime) == *last {
                return false;
            }
        }

        match load_from_file(&self.path) {
            Ok(policies) => {
                *self.current.write().await = Arc::new(policies);
                *self.last_mtime.write().await = Some(mtime);
                info!(path = %self.path.display(), "reloaded policy document");
                true
            }
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "policy reload failed, keeping previous snapshot");
                false
            }
        }
    }
}

/// Spawn a background task that calls [`PolicyManager::reload_if_changed`]
/// every `interval` until `cancel` fires.
pub fn spawn_watcher(
    manager: Arc<PolicyManager>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if manager.reload_if_changed().await {
                        debug!("policy watcher applied a reload");
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    })
}
