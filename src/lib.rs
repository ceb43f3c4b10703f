#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Airflow Observability
//!
//! Batch ETL that copies run and task-instance history out of an Airflow
//! metadata database into a separate observability PostgreSQL store, then runs
//! a battery of data quality checks over what was loaded.
//!
//! ## Overview
//!
//! An external scheduler triggers two units of work per day:
//!
//! 1. **Extract and load**: read `dag_run` and `task_instance` rows whose
//!    execution date falls in the trailing window, stamp them with an
//!    extraction timestamp and id, and append them to `dag_runs` and
//!    `task_instances`, creating those tables on first write.
//! 2. **Quality checks**: row counts, null rates and freshness over both
//!    destination tables, aggregated into a report.
//!
//! Retry policy, timeouts and scheduling belong to the scheduler; this crate
//! only exports them as a [`constants::PipelineDefinition`].
//!
//! ## Module Organization
//!
//! - [`config`] - Layered YAML/environment configuration
//! - [`database`] - Logical connection resolution and catalog queries
//! - [`models`] - Extraction window, record families and tabular batches
//! - [`extraction`] - Windowed source reads
//! - [`loading`] - Table materialization and chunked appends
//! - [`quality`] - Check battery and declarative rule suites
//! - [`orchestration`] - Scheduler-facing entry points
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and per-operation helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use airflow_observability::config::ConfigManager;
//! use airflow_observability::orchestration::ObservabilityPipeline;
//! use chrono::Utc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let pipeline = ObservabilityPipeline::new(manager.config().clone());
//!
//! let outcome = pipeline.run(Utc::now()).await?;
//! println!(
//!     "loaded {} runs, quality passed: {}",
//!     outcome.extraction.dag_runs_count, outcome.quality.all_passed
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Unit tests need no database. Integration tests use SQLx's per-test
//! database isolation and are gated behind a feature:
//!
//! ```bash
//! cargo test --lib                                   # Unit tests
//! DATABASE_URL=postgresql://... cargo test --features test-database
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod extraction;
pub mod loading;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod quality;

pub use config::{ConfigManager, PipelineConfig};
pub use constants::{DestinationTable, LifecycleState, PipelineDefinition};
pub use error::{
    CheckExecutionError, ConnectionError, LoadError, MaterializeError, PipelineError,
    PipelineResult, SourceReadError,
};
pub use models::{DagRunRecord, ExtractionWindow, RecordBatch, TaskInstanceRecord};
pub use orchestration::{ExtractionSummary, ObservabilityPipeline};
pub use quality::{CheckResult, QualityReport};
