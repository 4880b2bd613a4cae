#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **otel-advisor-types** – shared data model for the telemetry advisory pipeline.
//!
//! This crate is dependency-light by design: it sits at the bottom of the
//! crate graph and every other `otel-advisor-*` crate depends on it. It has
//! no knowledge of HTTP, YAML, or any particular storage backend – it only
//! defines the shapes that flow between components.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A map of string attributes attached to a signal (span attributes, metric
/// labels, log fields, or resource tags). Ordered so output is deterministic
/// in tests and logs.
pub type AttributeMap = BTreeMap<String, String>;

/// A single trace span observed by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSpan {
    /// Span name.
    pub name: String,
    /// Owning service name.
    pub service: String,
    /// Span duration in milliseconds.
    pub duration_ms: f64,
    /// Span status (e.g. "OK", "ERROR").
    pub status: String,
    /// Span attributes.
    #[serde(default)]
    pub attributes: AttributeMap,
    /// Resource-level tags (service.name, environment, etc).
    #[serde(default)]
    pub resource_tags: AttributeMap,
}

/// A single metric data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDataPoint {
    /// Metric name.
    pub name: String,
    /// Numeric value.
    pub value: f64,
    /// Metric kind, e.g. "gauge", "counter", "histogram".
    pub kind: String,
    /// Metric labels.
    #[serde(default)]
    pub labels: AttributeMap,
    /// Observation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Resource-level tags.
    #[serde(default)]
    pub resource_tags: AttributeMap,
}

/// A single log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log level, e.g. "DEBUG", "INFO", "WARN", "ERROR".
    pub level: String,
    /// Log message body.
    pub message: String,
    /// Owning service name.
    pub service: String,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
    /// Log attributes.
    #[serde(default)]
    pub attributes: AttributeMap,
    /// Resource-level tags.
    #[serde(default)]
    pub resource_tags: AttributeMap,
}

/// The kind of signal a [`FilterRule`] or parsed recommendation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// A trace span.
    Trace,
    /// A metric data point.
    Metric,
    /// A log entry.
    Log,
}

impl SignalKind {
    /// Human readable label used in rendered policy summaries and YAML output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Trace => "trace",
            SignalKind::Metric => "metric",
            SignalKind::Log => "log",
        }
    }
}

/// A single telemetry signal, regardless of kind. The core treats this as
/// largely opaque: it only inspects attributes and resource tags for
/// filtering, and strings for anonymization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    /// A trace span.
    Trace(TraceSpan),
    /// A metric data point.
    Metric(MetricDataPoint),
    /// A log entry.
    Log(LogEntry),
}

impl Signal {
    /// The [`SignalKind`] of this signal.
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::Trace(_) => SignalKind::Trace,
            Signal::Metric(_) => SignalKind::Metric,
            Signal::Log(_) => SignalKind::Log,
        }
    }

    /// The attribute map relevant to condition evaluation (span attributes,
    /// metric labels, or log attributes).
    pub fn attributes(&self) -> &AttributeMap {
        match self {
            Signal::Trace(t) => &t.attributes,
            Signal::Metric(m) => &m.labels,
            Signal::Log(l) => &l.attributes,
        }
    }

    /// The resource-level tag map.
    pub fn resource_tags(&self) -> &AttributeMap {
        match self {
            Signal::Trace(t) => &t.resource_tags,
            Signal::Metric(m) => &m.resource_tags,
            Signal::Log(l) => &l.resource_tags,
        }
    }

    /// The owning service name, if the underlying signal carries one.
    pub fn service(&self) -> Option<&str> {
        match self {
            Signal::Trace(t) => Some(t.service.as_str()),
            Signal::Metric(_) => None,
            Signal::Log(l) => Some(l.service.as_str()),
        }
    }
}

/// Metadata describing how a [`Sample`] was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    /// Total number of traces available in the buffer at draw time.
    pub total_traces: usize,
    /// Total number of metrics available in the buffer at draw time.
    pub total_metrics: usize,
    /// Total number of logs available in the buffer at draw time.
    pub total_logs: usize,
    /// Services observed across the sampled signals.
    pub services: BTreeSet<String>,
    /// When the sample was drawn.
    pub sampled_at: DateTime<Utc>,
    /// A coarse label describing the time range the sample covers.
    pub time_range: String,
}

/// A bounded, anonymized cross-section of recently observed telemetry,
/// ready to be handed to the LLM client. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Sampled trace spans.
    pub traces: Vec<TraceSpan>,
    /// Sampled metric data points.
    pub metrics: Vec<MetricDataPoint>,
    /// Sampled log entries.
    pub logs: Vec<LogEntry>,
    /// Metadata describing the draw.
    pub metadata: SampleMetadata,
}

impl Sample {
    /// A deliberately lossy cache key: only the three source counts, never
    /// any attribute-derived material. Two samples from very different
    /// workloads with the same totals will collide; this is intentional.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}:{}:{}",
            self.metadata.total_traces, self.metadata.total_metrics, self.metadata.total_logs
        )
    }

    /// True if the sample carries no signals at all.
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty() && self.metrics.is_empty() && self.logs.is_empty()
    }
}

/// The enforcement level attached to a [`LabelPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    /// Signals violating the policy are dropped outright.
    Drop,
    /// Violations are logged but the signal is kept.
    Warn,
    /// The implementation attempts to repair the violation in place.
    Fix,
}

/// An operator-declared labeling policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelPolicy {
    /// Policy name, unique within a policy document.
    pub name: String,
    /// Labels that must be present.
    #[serde(default)]
    pub required_labels: BTreeSet<String>,
    /// Labels that must not be present.
    #[serde(default)]
    pub forbidden_labels: BTreeSet<String>,
    /// Regex-like patterns label values must match.
    #[serde(default)]
    pub label_patterns: Vec<String>,
    /// What to do on a violation.
    pub enforcement: Enforcement,
}

/// Priority of a [`Recommendation`], used for operator triage ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Can be deferred.
    Low,
    /// Second tier.
    Medium,
    /// Should be acted on first.
    High,
}

/// The category of a [`Recommendation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    /// Drop some class of signal entirely.
    DropSignal,
    /// Enforce or repair a labeling policy.
    LabelPolicy,
    /// General noise reduction that doesn't fit the other categories.
    NoiseReduction,
    /// A cost/performance optimization suggestion.
    Optimization,
}

/// A condition/action pair the [`FilterManager`](https://docs.rs) equivalent
/// installs into its active set.
///
/// The condition grammar is intentionally tiny; see
/// `otel-advisor-filter::condition` for the supported shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Unique name within the active set.
    pub name: String,
    /// Which signal kind this rule applies to.
    pub signal_type: SignalKind,
    /// The raw condition string, e.g. `attributes["level"] == "DEBUG"`.
    pub condition: String,
    /// The action to take when the condition matches. Currently only
    /// `"drop"` is semantically meaningful.
    pub action: String,
    /// Human readable description.
    pub description: String,
    /// When this rule was installed, used for optional TTL-based expiry.
    pub installed_at: DateTime<Utc>,
}

impl FilterRule {
    /// Construct a drop rule with `installed_at` stamped to `now`.
    pub fn new_drop(
        name: impl Into<String>,
        signal_type: SignalKind,
        condition: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            signal_type,
            condition: condition.into(),
            action: "drop".to_string(),
            description: description.into(),
            installed_at: now,
        }
    }
}

/// A single piece of advice produced by parsing an LLM reply (or by the
/// static fallback set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Stable identifier, unique within one [`ParsedRecommendations`] batch.
    pub id: String,
    /// Category of advice.
    pub r#type: RecommendationType,
    /// Triage priority.
    pub priority: Priority,
    /// Human readable description of the recommendation.
    pub description: String,
    /// Why the model (or fallback) believes this is worthwhile.
    pub rationale: String,
    /// Concrete rules implementing the recommendation, if any were attached.
    #[serde(default)]
    pub rules: Vec<FilterRule>,
    /// A coarse estimate of the savings this recommendation would yield.
    pub estimated_saving: String,
    /// When this recommendation was produced.
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts over a batch of [`Recommendation`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Total number of recommendations.
    pub total: usize,
    /// Count broken down by [`RecommendationType`].
    pub by_type: BTreeMap<String, usize>,
    /// Count broken down by [`Priority`].
    pub by_priority: BTreeMap<String, usize>,
    /// A coarse aggregate savings estimate.
    pub estimated_savings: String,
}

/// The fully structured result of parsing an LLM reply (or of the static
/// fallback path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecommendations {
    /// The individual recommendations.
    pub recommendations: Vec<Recommendation>,
    /// Aggregate statistics over `recommendations`.
    pub summary: Summary,
    /// When this batch was produced.
    pub generated_at: DateTime<Utc>,
}

impl ParsedRecommendations {
    /// Build a [`ParsedRecommendations`] from a list of recommendations,
    /// computing the summary.
    pub fn from_recommendations(recommendations: Vec<Recommendation>, generated_at: DateTime<Utc>) -> Self {
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_priority: BTreeMap<String, usize> = BTreeMap::new();
        for r in &recommendations {
            *by_type.entry(format!("{:?}", r.r#type)).or_insert(0) += 1;
            *by_priority.entry(format!("{:?}", r.priority)).or_insert(0) += 1;
        }
        let total = recommendations.len();
        Self {
            recommendations,
            summary: Summary {
                total,
                by_type,
                by_priority,
                estimated_savings: "Unknown".to_string(),
            },
            generated_at,
        }
    }

    /// All installable [`FilterRule`]s across every recommendation, in order.
    pub fn all_rules(&self) -> Vec<FilterRule> {
        self.recommendations
            .iter()
            .flat_map(|r| r.rules.clone())
            .collect()
    }
}

/// Errors shared across the advisory pipeline's crate boundaries that don't
/// belong to any single component.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A value failed a basic structural invariant (non-empty name, etc).
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// The offending field name.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
}
