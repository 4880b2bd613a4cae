#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **otel-advisor-sampler** – bounded FIFO buffers per signal kind, and a
//! uniform-random draw into an anonymized [`Sample`].
//!
//! The buffer/eviction shape follows the same `Arc<RwLock<_>>` discipline
//! the in-memory event store in this codebase's storage layer uses: writers
//! (the data path) and the single periodic reader (the recommendation loop)
//! never block each other for longer than a lock acquisition.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use otel_advisor_anonymizer::Anonymizer;
use otel_advisor_types::{LogEntry, MetricDataPoint, Sample, SampleMetadata, TraceSpan};
use rand::seq::index::sample as sample_indices;
use tokio::sync::RwLock;
use tracing::debug;

/// Source of randomness for sampling, injectable so tests can assert on
/// selection without depending on wall-clock entropy.
pub trait RngSource: Send + Sync {
    /// Choose `k` distinct indices in `0..len` (or all of them if `k >= len`).
    fn choose(&self, len: usize, k: usize) -> Vec<usize>;
}

/// Default [`RngSource`] backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRng;

impl RngSource for ThreadRng {
    fn choose(&self, len: usize, k: usize) -> Vec<usize> {
        if k >= len {
            return (0..len).collect();
        }
        sample_indices(&mut rand::thread_rng(), len, k).into_vec()
    }
}

/// Sampler configuration.
#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    /// Maximum number of signals of each kind a single [`Sample`] may contain.
    pub max_sample_size: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { max_sample_size: 100 }
    }
}

/// Holds bounded buffers of recently observed telemetry and produces
/// anonymized samples from them on demand.
pub struct Sampler {
    config: SamplerConfig,
    traces: RwLock<VecDeque<TraceSpan>>,
    metrics: RwLock<VecDeque<MetricDataPoint>>,
    logs: RwLock<VecDeque<LogEntry>>,
    anonymizer: Anonymizer,
    rng: Arc<dyn RngSource>,
}

impl Sampler {
    /// Construct a sampler using the default thread-local RNG.
    pub fn new(config: SamplerConfig) -> Self {
        Self::with_rng(config, Arc::new(ThreadRng))
    }

    /// Construct a sampler with an injected [`RngSource`], for deterministic
    /// tests.
    pub fn with_rng(config: SamplerConfig, rng: Arc<dyn RngSource>) -> Self {
        Self {
            config,
            traces: RwLock::new(VecDeque::new()),
            metrics: RwLock::new(VecDeque::new()),
            logs: RwLock::new(VecDeque::new()),
            anonymizer: Anonymizer::new(),
            rng,
        }
    }

    fn buffer_cap(&self) -> usize {
        self.config.max_sample_size.saturating_mul(10).max(1)
    }

    /// Append trace spans to the buffer, evicting the oldest entries in
    /// FIFO order once the cap is exceeded.
    pub async fn buffer_traces(&self, spans: impl IntoIterator<Item = TraceSpan>) {
        let cap = self.buffer_cap();
        let mut buf = self.traces.write().await;
        for s in spans {
            buf.push_back(s);
        }
        while buf.len() > cap {
            buf.pop_front();
        }
    }

    /// Append metric points to the buffer, evicting the oldest entries in
    /// FIFO order once the cap is exceeded.
    pub async fn buffer_metrics(&self, points: impl IntoIterator<Item = MetricDataPoint>) {
        let cap = self.buffer_cap();
        let mut buf = self.metrics.write().await;
        for p in points {
            buf.push_back(p);
        }
        while buf.len() > cap {
            buf.pop_front();
        }
    }

    /// Append log entries to the buffer, evicting the oldest entries in
    /// FIFO order once the cap is exceeded.
    pub async fn buffer_logs(&self, entries: impl IntoIterator<Item = LogEntry>) {
        let cap = self.buffer_cap();
        let mut buf = self.logs.write().await;
        for e in entries {
            buf.push_back(e);
        }
        while buf.len() > cap {
            buf.pop_front();
        }
    }

    /// Current buffered counts, exposed for metrics and tests.
    pub async fn buffered_counts(&self) -> (usize, usize, usize) {
        (
            self.traces.read().await.len(),
            self.metrics.read().await.len(),
            self.logs.read().await.len(),
        )
    }

    /// Draw a uniform random sub-sample from each buffer (without
    /// replacement, up to `max_sample_size` per kind), anonymize it, and
    /// return it wrapped in a [`Sample`]. Returns an empty sample if every
    /// buffer is empty.
    pub async fn draw(&self) -> Sample {
        let traces = self.traces.read().await;
        let metrics = self.metrics.read().await;
        let logs = self.logs.read().await;

        let n = self.config.max_sample_size;
        let trace_idx = self.rng.choose(traces.len(), n.min(traces.len()));
        let metric_idx = self.rng.choose(metrics.len(), n.min(metrics.len()));
        let log_idx = self.rng.choose(logs.len(), n.min(logs.len()));

        let mut services = BTreeSet::new();

        let sampled_traces: Vec<TraceSpan> = trace_idx
            .into_iter()
            .map(|i| {
                let mut t = traces[i].clone();
                t.name = self.anonymizer.anonymize_str(&t.name);
                t.service = self.anonymizer.anonymize_str(&t.service);
                t.status = self.anonymizer.anonymize_str(&t.status);
                services.insert(t.service.clone());
                t.attributes = self.anonymizer.anonymize_map(&t.attributes);
                t.resource_tags = self.anonymizer.anonymize_map(&t.resource_tags);
                t
            })
            .collect();

        let sampled_metrics: Vec<MetricDataPoint> = metric_idx
            .into_iter()
            .map(|i| {
                let mut m = metrics[i].clone();
                m.name = self.anonymizer.anonymize_str(&m.name);
                m.labels = self.anonymizer.anonymize_map(&m.labels);
                m.resource_tags = self.anonymizer.anonymize_map(&m.resource_tags);
                m
            })
            .collect();

        let sampled_logs: Vec<LogEntry> = log_idx
            .into_iter()
            .map(|i| {
                let mut l = logs[i].clone();
                l.service = self.anonymizer.anonymize_str(&l.service);
                services.insert(l.service.clone());
                l.message = self.anonymizer.anonymize_str(&l.message);
                l.attributes = self.anonymizer.anonymize_map(&l.attributes);
                l.resource_tags = self.anonymizer.anonymize_map(&l.resource_tags);
                l
            })
            .collect();

        let metadata = SampleMetadata {
            total_traces: traces.len(),
            total_metrics: metrics.len(),
            total_logs: logs.len(),
            services,
            sampled_at: Utc::now(),
            time_range: "recent".to_string(),
        };

        debug!(
            traces = sampled_traces.len(),
            metrics = sampled_metrics.len(),
            logs = sampled_logs.len(),
            "drew sample from buffers"
        );

        Sample {
            traces: sampled_traces,
            metrics: sampled_metrics,
            logs: sampled_logs,
            metadata,
        }
    }
}
