#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **otel-advisor-processor** – the pipeline-facing façade.
//!
//! Ties the sampler, filter manager, policy manager, and recommender into
//! one object with the same shape as this codebase's orchestration engine:
//! a `start`/`stop` pair that spawns cooperative background tasks
//! coordinated by a single [`CancellationToken`], plus synchronous,
//! non-suspending entry points for the data path.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use otel_advisor_cache::RecommendationCache;
use otel_advisor_filter::{FilterConfig, FilterManager};
use otel_advisor_llm::AdvisoryClient;
use otel_advisor_policy::PolicyManager;
use otel_advisor_ratelimit::RateLimiter;
use otel_advisor_recommender::Recommender;
use otel_advisor_sampler::{Sampler, SamplerConfig};
use otel_advisor_types::{LogEntry, MetricDataPoint, ParsedRecommendations, Signal, TraceSpan};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Top-level configuration for a [`Processor`].
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Sampler config (per-kind sample cap).
    pub sampler: SamplerConfig,
    /// Filter manager config (active rule cap, optional TTL).
    pub filter: FilterConfig,
    /// How often the recommendation loop ticks.
    pub sampling_interval: Duration,
    /// How often the policy watcher checks the backing file for changes.
    pub policy_reload_interval: Duration,
    /// Whether a recommendation cycle installs its rules automatically.
    pub auto_apply_filters: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            filter: FilterConfig::default(),
            sampling_interval: Duration::from_secs(300),
            policy_reload_interval: Duration::from_secs(300),
            auto_apply_filters: true,
        }
    }
}

#[derive(Debug, Default)]
struct ProcessorCounters {
    ticks_skipped_overlap: AtomicUsize,
    cycles_failed: AtomicUsize,
}

/// The pipeline-facing façade: buffers telemetry, runs the periodic
/// recommendation loop, and filters outgoing batches.
pub struct Processor {
    sampler: Arc<Sampler>,
    filter_manager: Arc<FilterManager>,
    policy_manager: Arc<PolicyManager>,
    recommender: Arc<Recommender>,
    client: Arc<dyn AdvisoryClient>,
    rate_limiter: Option<Arc<RateLimiter>>,
    cache: Option<Arc<RecommendationCache>>,
    config: ProcessorConfig,
    cancel: CancellationToken,
    active_recommendations: RwLock<Option<ParsedRecommendations>>,
    tick_in_progress: AtomicBool,
    counters: ProcessorCounters,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Processor {
    /// Assemble a processor from its already-constructed collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sampler: Arc<Sampler>,
        filter_manager: Arc<FilterManager>,
        policy_manager: Arc<PolicyManager>,
        recommender: Arc<Recommender>,
        client: Arc<dyn AdvisoryClient>,
        rate_limiter: Option<Arc<RateLimiter>>,
        cache: Option<Arc<RecommendationCache>>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            sampler,
            filter_manager,
            policy_manager,
            recommender,
            client,
            rate_limiter,
            cache,
            config,
            cancel: CancellationToken::new(),
            active_recommendations: RwLock::new(None),
            tick_in_progress: AtomicBool::new(false),
            counters: ProcessorCounters::default(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Probe the advisory service, then launch the recommendation loop,
    /// policy watcher, and any configured background tasks. If the probe
    /// fails and the recommender was not configured to fall back to the
    /// static rule set, this returns an error without starting anything.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if let Err(e) = self.client.validate_connection().await {
            if !self.recommender.fallback_to_static() {
                bail!("advisory service connectivity probe failed and no static fallback is configured: {e}");
            }
            warn!(error = %e, "advisory service connectivity probe failed, continuing on static fallback");
        }

        let mut tasks = self.tasks.lock().await;

        let this = self.clone();
        tasks.push(tokio::spawn(async move { this.recommendation_loop().await }));

        let watcher = otel_advisor_policy::spawn_watcher(
            self.policy_manager.clone(),
            self.config.policy_reload_interval,
            self.cancel.clone(),
        );
        tasks.push(watcher);

        if let Some(limiter) = &self.rate_limiter {
            tasks.push(otel_advisor_ratelimit::spawn_refill_task(limiter.clone(), self.cancel.clone()));
        }

        if let Some(cache) = &self.cache {
            tasks.push(otel_advisor_cache::spawn_sweeper(cache.clone(), self.config.sampling_interval));
        }

        info!("processor started");
        Ok(())
    }

    /// Signal every background task to stop and join them. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        info!("processor stopped");
    }

    async fn recommendation_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.sampling_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_cycle_if_idle().await,
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    async fn run_cycle_if_idle(&self) {
        if self
            .tick_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.counters.ticks_skipped_overlap.fetch_add(1, Ordering::Relaxed);
            warn!("skipping recommendation tick, previous cycle still running");
            return;
        }
        self.run_cycle().await;
        self.tick_in_progress.store(false, Ordering::SeqCst);
    }

    async fn run_cycle(&self) {
        self.filter_manager.expire_stale(Utc::now()).await;
        let sample = self.sampler.draw().await;
        if sample.is_empty() {
            return;
        }
        let policies = self.policy_manager.current().await;
        match self.recommender.recommend(&sample, &policies, &self.cancel).await {
            Ok(parsed) => {
                if self.config.auto_apply_filters {
                    let installed = self.filter_manager.install(parsed.all_rules()).await;
                    info!(installed, "installed rules from recommendation cycle");
                }
                *self.active_recommendations.write().await = Some(parsed);
            }
            Err(e) => {
                self.counters.cycles_failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "recommendation cycle failed");
            }
        }
    }

    /// The most recently produced recommendation batch, if any cycle has
    /// completed yet.
    pub async fn get_active_recommendations(&self) -> Option<ParsedRecommendations> {
        self.active_recommendations.read().await.clone()
    }

    /// Buffer a batch of trace spans and return the subset that survives
    /// the active filter set, in arrival order. Never suspends on the
    /// advisory client.
    pub async fn process_traces(&self, traces: Vec<TraceSpan>) -> Vec<TraceSpan> {
        self.sampler.buffer_traces(traces.clone()).await;
        let signals: Vec<Signal> = traces.into_iter().map(Signal::Trace).collect();
        let survivors = self.filter_manager.apply(signals).await;
        survivors
            .into_iter()
            .filter_map(|s| match s {
                Signal::Trace(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Buffer a batch of metric points and return the subset that survives
    /// the active filter set, in arrival order.
    pub async fn process_metrics(&self, metrics: Vec<MetricDataPoint>) -> Vec<MetricDataPoint> {
        self.sampler.buffer_metrics(metrics.clone()).await;
        let signals: Vec<Signal> = metrics.into_iter().map(Signal::Metric).collect();
        let survivors = self.filter_manager.apply(signals).await;
        survivors
            .into_iter()
            .filter_map(|s| match s {
                Signal::Metric(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Buffer a batch of log entries and return the subset that survives
    /// the active filter set, in arrival order.
    pub async fn process_logs(&self, logs: Vec<LogEntry>) -> Vec<LogEntry> {
        self.sampler.buffer_logs(logs.clone()).await;
        let signals: Vec<Signal> = logs.into_iter().map(Signal::Log).collect();
        let survivors = self.filter_manager.apply(signals).await;
        survivors
            .into_iter()
            .filter_map(|s| match s {
                Signal::Log(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    /// Force one recommendation cycle to run immediately, bypassing the
    /// ticker. Used by the dry-run CLI and integration tests.
    pub async fn run_cycle_now(&self) -> Result<()> {
        if self.sampler.draw().await.is_empty() {
            bail!("no buffered telemetry to sample");
        }
        self.run_cycle().await;
        Ok(())
    }
}
