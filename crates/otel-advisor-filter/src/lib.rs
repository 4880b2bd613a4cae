#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **otel-advisor-filter** – owns the active [`FilterRule`] set and applies
//! it inline to the telemetry stream.
//!
//! Read-mostly: the data path only ever reads the active set, while
//! installation and expiry write to it. An `RwLock` discipline keeps both
//! cheap, the same split this codebase uses between its storage backend's
//! read-heavy `header`/`payload_bytes` lookups and its rarer `commit`
//! writes.

pub mod condition;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use condition::Condition;
use otel_advisor_types::{FilterRule, Signal};
use tokio::sync::RwLock;
use tracing::warn;

struct CompiledRule {
    rule: FilterRule,
    condition: Condition,
}

/// Configuration for a [`FilterManager`].
#[derive(Debug, Clone, Copy)]
pub struct FilterConfig {
    /// Maximum number of simultaneously active rules.
    pub max_filter_rules: usize,
    /// Optional time-to-live for installed rules. `None` means rules never
    /// expire on their own.
    pub filter_timeout: Option<Duration>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { max_filter_rules: 100, filter_timeout: None }
    }
}

/// Counters tracking why installs or evaluations were not what the caller
/// might expect, surfaced for metrics.
#[derive(Debug, Default)]
pub struct FilterCounters {
    /// Rules rejected because their name was already active.
    pub duplicate_name: AtomicUsize,
    /// Rules rejected because the active set was at capacity.
    pub cap_exceeded: AtomicUsize,
    /// Evaluations against a condition this engine does not understand.
    pub unsupported_condition: AtomicUsize,
}

/// Holds the active filter rules and evaluates them against signals on the
/// data path.
pub struct FilterManager {
    config: FilterConfig,
    rules: RwLock<Vec<CompiledRule>>,
    /// Counters tracking rule install/evaluation outcomes.
    pub counters: FilterCounters,
}

impl FilterManager {
    /// Construct an empty filter manager.
    pub fn new(config: FilterConfig) -> Self {
        Self { config, rules: RwLock::new(Vec::new()), counters: FilterCounters::default() }
    }

    /// Attempt to install each rule in `rules`. A rule is admitted only if
    /// its name is not already active and the cap has not been reached;
    /// otherwise it is silently skipped and a counter is incremented.
    /// Returns the number of rules actually installed.
    pub async fn install(&self, new_rules: Vec<FilterRule>) -> usize {
        let mut active = self.rules.write().await;
        let mut installed = 0;
        let mut names: HashSet<String> = active.iter().map(|c| c.rule.name.clone()).collect();

        for rule in new_rules {
            if names.contains(&rule.name) {
                self.counters.duplicate_name.fetch_add(1, Ordering::Relaxed);
                warn!(name = %rule.name, "skipping duplicate filter rule name");
                continue;
            }
            if active.len() >= self.config.max_filter_rules {
                self.counters.cap_exceeded.fetch_add(1, Ordering::Relaxed);
                warn!(max = self.config.max_filter_rules, "filter rule cap reached, skipping rule");
                continue;
            }
            let condition = condition::compile(&rule.condition);
            names.insert(rule.name.clone());
            active.push(CompiledRule { rule, condition });
            installed += 1;
        }
        installed
    }

    /// Remove every active rule.
    pub async fn clear(&self) {
        self.rules.write().await.clear();
    }

    /// Remove rules whose `installed_at` is older than the configured
    /// `filter_timeout`, if one is set. No-op otherwise.
    pub async fn expire_stale(&self, now: DateTime<Utc>) {
        let Some(timeout) = self.config.filter_timeout else { return };
        let mut active = self.rules.write().await;
        active.retain(|c| {
            now.signed_duration_since(c.rule.installed_at)
                .to_std()
                .map(|age| age <= timeout)
                .unwrap_or(true)
        });
    }

    /// True iff some installed rule matching `signal`'s kind evaluates to a
    /// match under the supported condition subset.
    pub async fn evaluate(&self, signal: &Signal) -> bool {
        let active = self.rules.read().await;
        for compiled in active.iter() {
            if compiled.rule.signal_type != signal.kind() {
                continue;
            }
            if self.matches(&compiled.condition, signal) {
                return true;
            }
        }
        false
    }

    fn matches(&self, condition: &Condition, signal: &Signal) -> bool {
        match condition {
            Condition::AttributeEquals { key, value } => signal.attributes().get(key) == Some(value),
            Condition::ResourceEquals { key, value } => signal.resource_tags().get(key) == Some(value),
            Condition::AttributeAbsent { key } => {
                signal.attributes().get(key).map_or(true, |v| v.is_empty())
            }
            Condition::ResourceAbsent { key } => {
                signal.resource_tags().get(key).map_or(true, |v| v.is_empty())
            }
            Condition::Unsupported => {
                self.counters.unsupported_condition.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Filter a batch of signals in place, preserving arrival order among
    /// survivors. Dropped signals are elided, never reordered.
    pub async fn apply(&self, signals: Vec<Signal>) -> Vec<Signal> {
        let mut kept = Vec::with_capacity(signals.len());
        for signal in signals {
            if !self.evaluate(&signal).await {
                kept.push(signal);
            }
        }
        kept
    }

    /// Number of currently active rules.
    pub async fn active_count(&self) -> usize {
        self.rules.read().await.len()
    }

    /// A snapshot of the currently active rules, for introspection and the
    /// CLI's dry-run mode.
    pub async fn active_rules(&self) -> Vec<FilterRule> {
        self.rules.read().await.iter().map(|c| c.rule.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otel_advisor_types::{AttributeMap, LogEntry, SignalKind};

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn log_with_attr(key: &str, value: &str) -> Signal {
        let mut attrs = AttributeMap::new();
        attrs.insert(key.to_string(), value.to_string());
        Signal::Log(LogEntry {
            level: "DEBUG".into(),
            message: "m".into(),
            service: "svc".into(),
            timestamp: Utc::now(),
            attributes: attrs,
            resource_tags: AttributeMap::new(),
        })
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let fm = FilterManager::new(FilterConfig::default());
        let rule = FilterRule::new_drop("r1", SignalKind::Log, r#"attributes["level"] == "DEBUG""#, "d", now());
        assert_eq!(fm.install(vec![rule.clone()]).await, 1);
        assert_eq!(fm.install(vec![rule]).await, 0);
        assert_eq!(fm.active_count().await, 1);
        assert_eq!(fm.counters.duplicate_name.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn cap_is_enforced() {
        let fm = FilterManager::new(FilterConfig { max_filter_rules: 1, filter_timeout: None });
        let r1 = FilterRule::new_drop("r1", SignalKind::Log, r#"attributes["level"] == "DEBUG""#, "d", now());
        let r2 = FilterRule::new_drop("r2", SignalKind::Log, r#"attributes["level"] == "INFO""#, "d", now());
        assert_eq!(fm.install(vec![r1, r2]).await, 1);
        assert_eq!(fm.active_count().await, 1);
    }

    #[tokio::test]
    async fn unsupported_condition_fails_closed() {
        let fm = FilterManager::new(FilterConfig::default());
        fm.install(vec![FilterRule::new_drop("r1", SignalKind::Log, "span.duration > 5", "d", now())])
            .await;
        let signal = log_with_attr("level", "DEBUG");
        assert!(!fm.evaluate(&signal).await);
        assert_eq!(fm.counters.unsupported_condition.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn applying_filter_twice_is_idempotent() {
        let fm = FilterManager::new(FilterConfig::default());
        fm.install(vec![FilterRule::new_drop(
            "drop-debug",
            SignalKind::Log,
            r#"attributes["level"] == "DEBUG""#,
            "d",
            now(),
        )])
        .await;
        let batch = vec![log_with_attr("level", "DEBUG"), log_with_attr("level", "INFO")];
        let once = fm.apply(batch.clone()).await;
        let twice = fm.apply(once.clone()).await;
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn clear_empties_active_set() {
        let fm = FilterManager::new(FilterConfig::default());
        fm.install(vec![FilterRule::new_drop("r1", SignalKind::Log, r#"attributes["level"] == "DEBUG""#, "d", now())])
            .await;
        fm.clear().await;
        assert_eq!(fm.active_count().await, 0);
    }

    #[tokio::test]
    async fn expire_stale_removes_old_rules() {
        let fm = FilterManager::new(FilterConfig { max_filter_rules: 100, filter_timeout: Some(Duration::from_secs(0)) });
        fm.install(vec![FilterRule::new_drop(
            "r1",
            SignalKind::Log,
            r#"attributes["level"] == "DEBUG""#,
            "d",
            now() - chrono::Duration::seconds(10),
        )])
        .await;
        fm.expire_stale(now()).await;
        assert_eq!(fm.active_count().await, 0);
    }
}
