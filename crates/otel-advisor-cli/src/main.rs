#![forbid(unsafe_code)]

//! Dry-run companion for the telemetry advisory pipeline.
//!
//! Structured the way this codebase's CLI binaries are: a `clap` derive
//! `Cli`/`Commands` pair, `tracing-subscriber` initialized from an
//! `OTEL_ADVISOR_LOG` environment variable, and a `#[tokio::main]` entry
//! point that matches on the parsed subcommand. This binary never touches
//! live ingestion; every subcommand reads from files on disk.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use otel_advisor_filter::{FilterConfig, FilterManager};
use otel_advisor_llm::{AdvisoryConfig, AdvisoryClient, HttpAdvisoryClient};
use otel_advisor_types::{FilterRule, Sample, Signal};
use tracing::info;

#[derive(Parser)]
#[command(name = "otel-advisor", about = "Dry-run companion for the telemetry advisory pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one recommendation cycle against a captured sample file.
    Recommend {
        /// Path to a JSON-encoded `Sample`.
        #[arg(long)]
        sample: PathBuf,
        /// Optional path to the operator policy YAML document.
        #[arg(long)]
        policies: Option<PathBuf>,
        /// Optional path to write the resulting recommendations as JSON.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Cap on how many signals of each kind from the sample file are
        /// actually sent, applied client-side before the request.
        #[arg(long, default_value_t = 100)]
        max_samples: usize,
    },
    /// Validate that a sample file is well-formed and internally consistent.
    Validate {
        /// Path to a JSON-encoded `Sample`.
        #[arg(long)]
        sample: PathBuf,
    },
    /// Exercise the parser against a captured advisory reply, without
    /// making a network call.
    Test {
        /// Path to a text file containing a raw advisory reply.
        #[arg(long)]
        reply: PathBuf,
    },
    /// Policy document operations.
    Policy {
        #[command(subcommand)]
        action: PolicyCommands,
    },
    /// Filter rule operations.
    Filter {
        #[command(subcommand)]
        action: FilterCommands,
    },
    /// Print the CLI version.
    Version,
}

#[derive(Subcommand)]
enum FilterCommands {
    /// Evaluate a single condition against every signal in a captured
    /// sample file and report how many would be dropped.
    Test {
        /// The condition, e.g. `attributes["level"] == "DEBUG"`.
        #[arg(long)]
        condition: String,
        /// Which signal kind the condition applies to.
        #[arg(long, value_enum)]
        kind: SignalKindArg,
        /// Path to a JSON-encoded `Sample`.
        #[arg(long)]
        sample: PathBuf,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SignalKindArg {
    Trace,
    Metric,
    Log,
}

impl From<SignalKindArg> for otel_advisor_types::SignalKind {
    fn from(value: SignalKindArg) -> Self {
        match value {
            SignalKindArg::Trace => otel_advisor_types::SignalKind::Trace,
            SignalKindArg::Metric => otel_advisor_types::SignalKind::Metric,
            SignalKindArg::Log => otel_advisor_types::SignalKind::Log,
        }
    }
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Load and validate a policy document.
    Validate {
        /// Path to the policy YAML document.
        file: PathBuf,
    },
    /// Load a policy document and print the rendered prompt summaries.
    Test {
        /// Path to the policy YAML document.
        file: PathBuf,
    },
}

fn init_tracing() {
    let filter = std::env::var("OTEL_ADVISOR_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

fn load_sample(path: &PathBuf) -> Result<Sample> {
    let contents = fs::read_to_string(path).with_context(|| format!("reading sample file {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing sample file {}", path.display()))
}

fn cap_sample(mut sample: Sample, max_samples: usize) -> Sample {
    sample.traces.truncate(max_samples);
    sample.metrics.truncate(max_samples);
    sample.logs.truncate(max_samples);
    sample
}

async fn build_client() -> Result<HttpAdvisoryClient> {
    let api_key = std::env::var("OTEL_ADVISOR_API_KEY").context(
        "OTEL_ADVISOR_API_KEY must be set to run the advisory client (set OTEL_ADVISOR_ENDPOINT/OTEL_ADVISOR_MODEL to override defaults)",
    )?;
    let endpoint = std::env::var("OTEL_ADVISOR_ENDPOINT").unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
    let model = std::env::var("OTEL_ADVISOR_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let config = AdvisoryConfig::new(api_key, endpoint, model);
    HttpAdvisoryClient::new(config).map_err(Into::into)
}

async fn run_recommend(sample: PathBuf, policies: Option<PathBuf>, output: Option<PathBuf>, max_samples: usize) -> Result<()> {
    let sample = cap_sample(load_sample(&sample)?, max_samples);
    let policy_list = match policies {
        Some(path) => otel_advisor_policy::load_from_file(&path)?,
        None => Vec::new(),
    };
    let summaries = otel_advisor_policy::render_summaries(&policy_list);

    let client = build_client().await?;
    let sample_json = serde_json::to_string(&sample)?;
    let reply = client.recommend(&sample_json, &summaries).await?;
    let parsed = otel_advisor_parser::parse(&reply, chrono::Utc::now())?;

    let rendered = serde_json::to_string_pretty(&parsed)?;
    match output {
        Some(path) => {
            fs::write(&path, &rendered).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "wrote recommendations");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn run_validate(sample_path: PathBuf) -> Result<()> {
    let sample = load_sample(&sample_path)?;
    if sample.traces.len() > sample.metadata.total_traces
        || sample.metrics.len() > sample.metadata.total_metrics
        || sample.logs.len() > sample.metadata.total_logs
    {
        anyhow::bail!("sample metadata counts are smaller than the sampled sequence lengths");
    }
    println!(
        "sample OK: {} traces, {} metrics, {} logs (source totals {}/{}/{})",
        sample.traces.len(),
        sample.metrics.len(),
        sample.logs.len(),
        sample.metadata.total_traces,
        sample.metadata.total_metrics,
        sample.metadata.total_logs
    );
    Ok(())
}

fn run_test(reply_path: PathBuf) -> Result<()> {
    let reply = fs::read_to_string(&reply_path).with_context(|| format!("reading {}", reply_path.display()))?;
    let parsed = otel_advisor_parser::parse(&reply, chrono::Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    println!("---");
    println!("{}", otel_advisor_parser::render_yaml(&parsed));
    Ok(())
}

fn run_policy_validate(file: PathBuf) -> Result<()> {
    let policies = otel_advisor_policy::load_from_file(&file)?;
    println!("policy document OK: {} polic{} loaded", policies.len(), if policies.len() == 1 { "y" } else { "ies" });
    Ok(())
}

fn run_policy_test(file: PathBuf) -> Result<()> {
    let policies = otel_advisor_policy::load_from_file(&file)?;
    for summary in otel_advisor_policy::render_summaries(&policies) {
        println!("{summary}");
    }
    Ok(())
}

async fn run_filter_test(condition: String, kind: SignalKindArg, sample_path: PathBuf) -> Result<()> {
    let sample = load_sample(&sample_path)?;
    let signal_kind = otel_advisor_types::SignalKind::from(kind);
    let signals: Vec<Signal> = match signal_kind {
        otel_advisor_types::SignalKind::Trace => sample.traces.into_iter().map(Signal::Trace).collect(),
        otel_advisor_types::SignalKind::Metric => sample.metrics.into_iter().map(Signal::Metric).collect(),
        otel_advisor_types::SignalKind::Log => sample.logs.into_iter().map(Signal::Log).collect(),
    };
    let total = signals.len();

    let manager = FilterManager::new(FilterConfig::default());
    manager
        .install(vec![FilterRule::new_drop("cli-test", signal_kind, &condition, "dry-run evaluation", chrono::Utc::now())])
        .await;
    let survivors = manager.apply(signals).await;

    println!("{} of {} signals would be dropped", total - survivors.len(), total);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Recommend { sample, policies, output, max_samples } => {
            run_recommend(sample, policies, output, max_samples).await
        }
        Commands::Validate { sample } => run_validate(sample),
        Commands::Test { reply } => run_test(reply),
        Commands::Policy { action } => match action {
            PolicyCommands::Validate { file } => run_policy_validate(file),
            PolicyCommands::Test { file } => run_policy_test(file),
        },
        Commands::Filter { action } => match action {
            FilterCommands::Test { condition, kind, sample } => run_filter_test(condition, kind, sample).await,
        },
        Commands::Version => {
            println!("otel-advisor {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
