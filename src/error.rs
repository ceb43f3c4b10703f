//! # Pipeline Error Types
//!
//! Structured error handling for the extract, load and check phases using
//! thiserror. Each phase has its own error type so callers can tell a
//! connection problem from a source read failure from a partially committed
//! load; [`PipelineError`] wraps all of them for the orchestration layer.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigurationError;

/// Failure to resolve a logical connection name to a live database handle
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Unknown logical connection: {name}")]
    UnknownConnection { name: String },

    #[error("Connection '{name}' is not configured: {reason}")]
    NotConfigured { name: String, reason: String },

    #[error("Failed to connect '{name}': {source}")]
    Unreachable {
        name: String,
        #[source]
        source: sqlx::Error,
    },
}

impl ConnectionError {
    /// Create an unknown connection error
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownConnection { name: name.into() }
    }

    /// Create a not-configured error
    pub fn not_configured(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Logical connection name this error refers to
    pub fn connection_name(&self) -> &str {
        match self {
            Self::UnknownConnection { name }
            | Self::NotConfigured { name, .. }
            | Self::Unreachable { name, .. } => name,
        }
    }
}

/// Failure while reading from the scheduler's metadata store
#[derive(Error, Debug)]
pub enum SourceReadError {
    #[error("Source query failed for {family}: {source}")]
    Query {
        family: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error(
        "Extraction timestamp {extracted_at} precedes window start {window_start} by more than {allowed_skew_seconds}s"
    )]
    ClockSkew {
        extracted_at: DateTime<Utc>,
        window_start: DateTime<Utc>,
        allowed_skew_seconds: i64,
    },

    #[error("Invalid extraction window: start {start} is after end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl SourceReadError {
    pub fn query(family: &'static str, source: sqlx::Error) -> Self {
        Self::Query { family, source }
    }
}

/// Rejection of a table or column name that is not on the allow-list
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Unknown destination table: {name}")]
    UnknownTable { name: String },

    #[error("Unknown column '{column}' for table {table}")]
    UnknownColumn { table: String, column: String },
}

/// Failure while ensuring a destination table exists
#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Cannot create table {table} from an empty sample batch")]
    EmptySample { table: String },

    #[error("Schema drift on {table}: {detail}")]
    SchemaDrift { table: String, detail: String },

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error("DDL failed for {table}: {source}")]
    Database {
        table: String,
        #[source]
        source: sqlx::Error,
    },
}

impl MaterializeError {
    pub fn schema_drift(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaDrift {
            table: table.into(),
            detail: detail.into(),
        }
    }

    pub fn database(table: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Database {
            table: table.into(),
            source,
        }
    }
}

/// Failure while writing to the destination store.
///
/// `rows_committed` counts rows in chunks that were committed before the
/// failure; those rows stay in the destination.
#[derive(Error, Debug)]
#[error("Load into {table} failed after {rows_committed} committed rows: {cause}")]
pub struct LoadError {
    pub table: String,
    pub rows_committed: u64,
    #[source]
    pub cause: LoadFailure,
}

/// Underlying reason for a [`LoadError`]
#[derive(Error, Debug)]
pub enum LoadFailure {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error("chunk of rows {chunk_start}..{chunk_end} failed: {source}")]
    Chunk {
        chunk_start: usize,
        chunk_end: usize,
        #[source]
        source: sqlx::Error,
    },
}

impl LoadError {
    pub fn new(table: impl Into<String>, rows_committed: u64, cause: impl Into<LoadFailure>) -> Self {
        Self {
            table: table.into(),
            rows_committed,
            cause: cause.into(),
        }
    }
}

/// A check could not run at all (distinct from a check that ran and failed)
#[derive(Error, Debug)]
pub enum CheckExecutionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error("Check query '{check}' failed: {source}")]
    Query {
        check: String,
        #[source]
        source: sqlx::Error,
    },
}

impl CheckExecutionError {
    pub fn query(check: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Query {
            check: check.into(),
            source,
        }
    }
}

/// Failure while writing rule suite declarations to disk
#[derive(Error, Debug)]
pub enum SuiteExportError {
    #[error("Failed to write suite file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize suite: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

/// Umbrella error returned by the orchestration entry points
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    SourceRead(#[from] SourceReadError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    CheckExecution(#[from] CheckExecutionError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Data quality gate failed: {failed_count} of {total_count} checks failed")]
    QualityGate {
        failed_count: usize,
        total_count: usize,
    },
}

impl PipelineError {
    /// Whether the orchestrator's retry policy should see this as a failed attempt
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::QualityGate { .. })
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_reports_committed_rows() {
        let err = LoadError::new(
            "dag_runs",
            2000,
            MaterializeError::schema_drift("dag_runs", "missing column run_note"),
        );
        assert_eq!(err.rows_committed, 2000);
        let message = err.to_string();
        assert!(message.contains("dag_runs"));
        assert!(message.contains("2000 committed rows"));
    }

    #[test]
    fn connection_error_exposes_name() {
        let err = ConnectionError::unknown("warehouse");
        assert_eq!(err.connection_name(), "warehouse");
        assert_eq!(err.to_string(), "Unknown logical connection: warehouse");
    }

    #[test]
    fn invalid_window_is_a_fatal_source_read_error() {
        let start = Utc::now();
        let err: PipelineError = SourceReadError::InvalidWindow {
            start,
            end: start - chrono::Duration::hours(1),
        }
        .into();
        assert!(matches!(
            err,
            PipelineError::SourceRead(SourceReadError::InvalidWindow { .. })
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn quality_gate_is_not_fatal() {
        let gate = PipelineError::QualityGate {
            failed_count: 1,
            total_count: 8,
        };
        assert!(!gate.is_fatal());

        let conn: PipelineError = ConnectionError::unknown("source").into();
        assert!(conn.is_fatal());
    }
}
