use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use otel_advisor_filter::{FilterConfig, FilterManager};
use otel_advisor_llm::{AdvisoryClient, AdvisoryError};
use otel_advisor_policy::PolicyManager;
use otel_advisor_processor::{Processor, ProcessorConfig};
use otel_advisor_recommender::{Recommender, RecommenderOptions};
use otel_advisor_sampler::Sampler;
use otel_advisor_types::{AttributeMap, TraceSpan};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

fn policy_file() -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    write!(f, "policies: []\n").unwrap();
    f
}

fn write_policy(file: &mut NamedTempFile, yaml: &str) {
    use std::io::Seek;
    file.as_file_mut().set_len(0).unwrap();
    file.as_file_mut().seek(std::io::SeekFrom::Start(0)).unwrap();
    write!(file, "{yaml}").unwrap();
    file.flush().unwrap();
}

struct CapturingClient {
    captured: Mutex<Option<String>>,
    captured_summaries: Mutex<Vec<String>>,
}

#[async_trait]
impl AdvisoryClient for CapturingClient {
    async fn recommend(&self, sample_json: &str, policy_summaries: &[String]) -> Result<String, AdvisoryError> {
        *self.captured.lock().await = Some(sample_json.to_string());
        *self.captured_summaries.lock().await = policy_summaries.to_vec();
        Ok("SIGNALS TO DROP\n- drop nothing\n".to_string())
    }
    async fn validate_connection(&self) -> Result<(), AdvisoryError> {
        Ok(())
    }
}

#[tokio::test]
async fn e2e6_pii_never_reaches_the_advisory_client() {
    let config = ProcessorConfig::default();
    let sampler = Arc::new(Sampler::new(config.sampler));
    let filter_manager = Arc::new(FilterManager::new(config.filter));
    let pfile = policy_file();
    let policy_manager = Arc::new(PolicyManager::new(pfile.path()).unwrap());
    let client = Arc::new(CapturingClient { captured: Mutex::new(None), captured_summaries: Mutex::new(Vec::new()) });
    let client_dyn: Arc<dyn AdvisoryClient> = client.clone();
    let recommender = Arc::new(Recommender::new(
        client_dyn.clone(),
        None,
        None,
        RecommenderOptions { enable_cache: false, enable_rate_limit: false, fallback_to_static: false },
    ));
    let processor = Arc::new(Processor::new(
        sampler,
        filter_manager,
        policy_manager,
        recommender,
        client_dyn,
        None,
        None,
        config,
    ));

    let mut attrs = AttributeMap::new();
    attrs.insert("user.email".to_string(), "alice@example.com".to_string());
    let mut resource_tags = AttributeMap::new();
    resource_tags.insert("host.ip".to_string(), "10.0.0.5".to_string());
    let span = TraceSpan {
        name: "handle-request".into(),
        service: "svc".into(),
        duration_ms: 12.0,
        status: "OK".into(),
        attributes: attrs,
        resource_tags,
    };
    processor.process_traces(vec![span]).await;
    processor.run_cycle_now().await.unwrap();

    let captured = client.captured.lock().await.clone().expect("client should have been called");
    assert!(!captured.contains("alice@example.com"));
    assert!(!captured.contains("10.0.0.5"));
}

#[tokio::test]
async fn e2e5_reloaded_policies_reach_the_advisory_client() {
    let mut config = ProcessorConfig::default();
    config.policy_reload_interval = Duration::from_millis(20);

    let sampler = Arc::new(Sampler::new(config.sampler));
    let filter_manager = Arc::new(FilterManager::new(config.filter));
    let mut pfile = policy_file();
    write_policy(&mut pfile, "policies:\n  - name: require-env\n    required_labels: [environment]\n    forbidden_labels: []\n    label_patterns: []\n    enforcement: drop\n");
    let policy_manager = Arc::new(PolicyManager::new(pfile.path()).unwrap());
    assert_eq!(policy_manager.current().await.len(), 1);

    let client = Arc::new(CapturingClient { captured: Mutex::new(None), captured_summaries: Mutex::new(Vec::new()) });
    let client_dyn: Arc<dyn AdvisoryClient> = client.clone();
    let recommender = Arc::new(Recommender::new(
        client_dyn.clone(),
        None,
        None,
        RecommenderOptions { enable_cache: false, enable_rate_limit: false, fallback_to_static: false },
    ));
    let processor = Arc::new(Processor::new(
        sampler.clone(),
        filter_manager,
        policy_manager.clone(),
        recommender,
        client_dyn,
        None,
        None,
        config.clone(),
    ));

    let cancel = CancellationToken::new();
    let watcher = otel_advisor_policy::spawn_watcher(policy_manager.clone(), config.policy_reload_interval, cancel.clone());

    write_policy(&mut pfile, "policies:\n  - name: require-env\n    required_labels: [environment]\n    forbidden_labels: []\n    label_patterns: []\n    enforcement: drop\n  - name: no-pii-labels\n    required_labels: []\n    forbidden_labels: [ssn]\n    label_patterns: []\n    enforcement: warn\n");
    let newer = std::time::SystemTime::now() + Duration::from_secs(1);
    pfile.as_file().set_modified(newer).ok();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(policy_manager.current().await.len(), 2);

    sampler
        .buffer_traces(vec![TraceSpan {
            name: "s".into(),
            service: "svc".into(),
            duration_ms: 1.0,
            status: "OK".into(),
            attributes: AttributeMap::new(),
            resource_tags: AttributeMap::new(),
        }])
        .await;
    processor.run_cycle_now().await.unwrap();

    let summaries = client.captured_summaries.lock().await.clone();
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().any(|s| s.starts_with("require-env")));
    assert!(summaries.iter().any(|s| s.starts_with("no-pii-labels")));

    cancel.cancel();
    watcher.await.unwrap();
}
