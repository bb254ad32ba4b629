//! FlowGuard
//!
//! Command-line network-flow intrusion detection over frozen tree-ensemble
//! models: batch runs against a held-out dataset, interactive analysis of
//! uploaded flow files, and offline evaluation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowguard_classifiers::ArtifactRegistry;
use flowguard_core::{Label, Severity};
use flowguard_detector::{
    analyze, evaluate, export_csv, report, BatchRunner, ConfigOverrides, Dataset, DetectorConfig,
    EndOfDataset,
};
use flowguard_telemetry::{BatchLedger, EventQuery, EventReader, LedgerStatus};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "flowguard")]
#[command(about = "FlowGuard network-flow intrusion detection", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "flowguard.yaml", env = "FLOWGUARD_CONFIG")]
    config: PathBuf,

    /// Dataset for batch runs
    #[arg(short, long, env = "FLOWGUARD_DATASET")]
    dataset: Option<PathBuf>,

    /// Directory holding the training artifacts
    #[arg(short, long, env = "FLOWGUARD_ARTIFACTS")]
    artifacts: Option<PathBuf>,

    /// Directory for the state file, logs, journal and lock
    #[arg(short, long, env = "FLOWGUARD_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process the next batch(es) of the dataset
    Run {
        /// Number of batches to process
        #[arg(short, long, default_value_t = 1)]
        batches: usize,

        /// Records per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Restart at the first record once the dataset is exhausted
        #[arg(long)]
        wrap: bool,

        /// Write Prometheus metrics to this file when done
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },

    /// Classify a flow file and export the augmented table
    Analyze {
        /// Input CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Evaluate the models against a labeled CSV
    Evaluate {
        /// Labeled input CSV
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show the batch cursor
    Status,

    /// Show logged detection events
    Events {
        /// Only this label (Normal / Attack)
        #[arg(long)]
        label: Option<Label>,

        /// Only this severity or higher
        #[arg(long)]
        min_severity: Option<Severity>,

        /// Only this attack type
        #[arg(long)]
        attack_type: Option<String>,

        /// Most recent N matches
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Reset the batch cursor to the start of the dataset
    Reset {
        /// Also remove a lock left behind by a crashed run
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    let metrics_handle = init_metrics()?;

    let mut overrides = ConfigOverrides {
        dataset: cli.dataset.clone(),
        artifacts_dir: cli.artifacts.clone(),
        state_dir: cli.state_dir.clone(),
        ..Default::default()
    };
    if let Command::Run {
        batch_size, wrap, ..
    } = &cli.command
    {
        overrides.batch_size = *batch_size;
        if *wrap {
            overrides.end_of_dataset = Some(EndOfDataset::Wrap);
        }
    }

    let config = DetectorConfig::load(&cli.config, &overrides)
        .with_context(|| format!("loading configuration from {:?}", cli.config))?;
    info!("Configuration loaded");

    match cli.command {
        Command::Run {
            batches,
            metrics_file,
            ..
        } => run(&config, batches, metrics_file, &metrics_handle).await,
        Command::Analyze { input, output } => run_analyze(&config, input, output).await,
        Command::Evaluate { input } => run_evaluate(&config, input).await,
        Command::Status => show_status(&config),
        Command::Events {
            label,
            min_severity,
            attack_type,
            limit,
        } => {
            let mut query = EventQuery::new().limit(limit);
            query.label = label;
            query.min_severity = min_severity;
            query.attack_type = attack_type;
            show_events(&config, &query)
        }
        Command::Reset { force } => reset(&config, force),
    }
}

async fn run(
    config: &DetectorConfig,
    batches: usize,
    metrics_file: Option<PathBuf>,
    metrics_handle: &PrometheusHandle,
) -> Result<()> {
    let registry = ArtifactRegistry::new(config.classifiers.clone());
    let artifacts = registry.get().await.context("loading artifacts")?;

    let mut runner = BatchRunner::from_config(config, Arc::clone(&artifacts))?;
    info!(
        "Dataset has {} records; cursor at {}",
        runner.dataset().len(),
        runner.state().chunk_start
    );

    let (reports, error) = runner.run(batches).await;
    for batch in &reports {
        println!("{}\n", report::render_batch(batch));
    }
    if reports.len() > 1 {
        println!("{}\n", report::render_run_totals(&runner.metrics().snapshot()));
    }

    if let Some(path) = metrics_file {
        std::fs::write(&path, metrics_handle.render())
            .with_context(|| format!("writing metrics to {:?}", path))?;
        info!("Metrics written to {:?}", path);
    }

    match error {
        Some(e) => Err(e).context(format!(
            "batch {} of {} failed; nothing from it was written",
            reports.len() + 1,
            batches
        )),
        None => Ok(()),
    }
}

async fn run_analyze(config: &DetectorConfig, input: PathBuf, output: PathBuf) -> Result<()> {
    let registry = ArtifactRegistry::new(config.classifiers.clone());
    let artifacts = registry.get().await.context("loading artifacts")?;

    let dataset = Dataset::load(&input)?;
    let analysis = analyze(&artifacts, &dataset)
        .await
        .with_context(|| format!("analyzing {:?}", input))?;
    export_csv(&dataset, &analysis, &output)?;

    println!("{}", report::render_analysis(&analysis));
    println!("\nResults written to {}", output.display());
    Ok(())
}

async fn run_evaluate(config: &DetectorConfig, input: PathBuf) -> Result<()> {
    let registry = ArtifactRegistry::new(config.classifiers.clone());
    let artifacts = registry.get().await.context("loading artifacts")?;

    let dataset = Dataset::load(&input)?;
    let evaluation = evaluate(&artifacts, &dataset).await?;
    println!("{}", report::render_evaluation(&evaluation));
    Ok(())
}

fn show_status(config: &DetectorConfig) -> Result<()> {
    let status = LedgerStatus::read(&config.ledger_paths())?;
    let dataset_len = match Dataset::load(&config.dataset) {
        Ok(dataset) => Some(dataset.len()),
        Err(e) => {
            warn!("Dataset unavailable: {}", e);
            None
        }
    };
    println!("{}", report::render_status(&status, dataset_len));
    Ok(())
}

fn show_events(config: &DetectorConfig, query: &EventQuery) -> Result<()> {
    let paths = config.ledger_paths();
    let reader = EventReader::new(&paths.event_log, &paths.summary_log);
    let entries = reader.query(query)?;
    if entries.is_empty() {
        println!("No matching events.");
    } else {
        println!("{}", report::render_events(&entries));
    }
    Ok(())
}

fn reset(config: &DetectorConfig, force: bool) -> Result<()> {
    let paths = config.ledger_paths();
    if force {
        BatchLedger::break_lock(&paths)?;
    }
    let state = BatchLedger::reset(&paths)?;
    println!(
        "Batch cursor reset; logs kept in {}; next event id is {}",
        config.state_dir.display(),
        state.event_id + 1
    );
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("flowguard=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flowguard=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Install the in-process Prometheus recorder
fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;
    flowguard_telemetry::metrics::describe_metrics();
    Ok(handle)
}
