//! # Observability Pipeline CLI
//!
//! Command-line entry point for the scheduler's task callables. Each
//! subcommand prints its result as JSON on stdout; logs go to stderr and the
//! configured log file.
//!
//! Exit codes: 0 on success, 1 on a fatal error (the scheduler should retry),
//! 2 when the quality gate is configured as fatal and checks failed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use airflow_observability::config::ConfigManager;
use airflow_observability::logging::{init_structured_logging, shutdown_structured_logging};
use airflow_observability::models::ExtractionWindow;
use airflow_observability::orchestration::ObservabilityPipeline;
use airflow_observability::quality::export_suites;
use airflow_observability::PipelineError;

#[derive(Parser)]
#[command(name = "observability-pipeline")]
#[command(about = "Extract Airflow metadata into the observability database and check its quality")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment (development, test, production)
    #[arg(short, long)]
    environment: Option<String>,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract and load the trailing window, then run quality checks
    Run {
        /// Execution timestamp (RFC 3339); defaults to now
        #[arg(long)]
        execution_ts: Option<DateTime<Utc>>,
    },

    /// Extract and load only
    Extract {
        /// Execution timestamp (RFC 3339); the window is the lookback ending here
        #[arg(long, conflicts_with_all = ["start", "end"])]
        execution_ts: Option<DateTime<Utc>>,

        /// Explicit inclusive window start
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Explicit inclusive window end
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },

    /// Run the quality battery against the destination
    Check,

    /// Write the rule suites as JSON files
    Suites {
        /// Output directory
        #[arg(short, long, default_value = "expectations")]
        output_dir: PathBuf,
    },

    /// Print the scheduling contract expected from the orchestrator
    Definition,

    /// Check that the source and destination connections answer
    Health,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let code = match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = match e.downcast_ref::<PipelineError>() {
                Some(pipeline_error) if !pipeline_error.is_fatal() => 2,
                _ => 1,
            };
            error!("Pipeline command failed: {:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::from(code)
        }
    };

    shutdown_structured_logging();
    code
}

async fn execute(cli: Cli) -> Result<()> {
    let manager = match &cli.environment {
        Some(environment) => {
            ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        }
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    }
    .context("Failed to load configuration")?;

    init_structured_logging(&manager.config().logging, manager.environment());
    info!(
        environment = %manager.environment(),
        config_dir = %manager.config_directory().display(),
        "Configuration loaded"
    );

    let pipeline = ObservabilityPipeline::new(manager.config().clone());

    match cli.command {
        Commands::Run { execution_ts } => {
            let execution_ts = execution_ts.unwrap_or_else(Utc::now);
            let extraction = pipeline.extract_metadata_task(execution_ts).await?;
            let quality = pipeline.run_all_checks().await?;
            print_json(&serde_json::json!({
                "extraction": extraction,
                "quality": quality,
            }))?;
            pipeline.apply_quality_policy(&quality)?;
        }
        Commands::Extract {
            execution_ts,
            start,
            end,
        } => {
            let summary = if start.is_some() || end.is_some() {
                let window = ExtractionWindow::new(start, end).map_err(PipelineError::from)?;
                pipeline.extract_and_load(window).await?
            } else {
                pipeline
                    .extract_metadata_task(execution_ts.unwrap_or_else(Utc::now))
                    .await?
            };
            print_json(&summary)?;
        }
        Commands::Check => {
            let report = pipeline.run_all_checks().await?;
            print_json(&report)?;
            pipeline.apply_quality_policy(&report)?;
        }
        Commands::Suites { output_dir } => {
            let written = export_suites(&output_dir)
                .with_context(|| format!("Failed to export suites to {}", output_dir.display()))?;
            print_json(&written)?;
        }
        Commands::Definition => {
            print_json(&pipeline.definition())?;
        }
        Commands::Health => {
            print_json(&pipeline.check_connections().await?)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
