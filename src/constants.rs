//! # System Constants
//!
//! Lifecycle states, the destination table/column allow-list, logical
//! connection names and the orchestrator-facing pipeline definition.
//!
//! Every table or column name that reaches a SQL string must come from
//! [`DestinationTable`]; nothing derived from user input is interpolated.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::IdentifierError;
use crate::models::ColumnKind;

/// Logical name of the scheduler metadata connection
pub const SOURCE_CONNECTION: &str = "source";

/// Logical name of the observability database connection
pub const DESTINATION_CONNECTION: &str = "destination";

/// Lifecycle state of a run or task instance as reported by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Success,
    Failed,
    Running,
    Queued,
    Scheduled,
    Skipped,
    UpForRetry,
    UpForReschedule,
    UpstreamFailed,
    Removed,
    Restarting,
    None,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 12] = [
        Self::Success,
        Self::Failed,
        Self::Running,
        Self::Queued,
        Self::Scheduled,
        Self::Skipped,
        Self::UpForRetry,
        Self::UpForReschedule,
        Self::UpstreamFailed,
        Self::Removed,
        Self::Restarting,
        Self::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Running => "running",
            Self::Queued => "queued",
            Self::Scheduled => "scheduled",
            Self::Skipped => "skipped",
            Self::UpForRetry => "up_for_retry",
            Self::UpForReschedule => "up_for_reschedule",
            Self::UpstreamFailed => "upstream_failed",
            Self::Removed => "removed",
            Self::Restarting => "restarting",
            Self::None => "none",
        }
    }

    /// States a whole run can be in; `removed` and `restarting` only apply to task instances
    pub fn is_run_state(&self) -> bool {
        !matches!(self, Self::Removed | Self::Restarting)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("Invalid lifecycle state: {s}"))
    }
}

/// A destination column and the type it is created with when a sample has no value for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl ColumnDef {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }
}

/// Columns of the `dag_runs` destination table, in load order
pub const DAG_RUN_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("dag_id", ColumnKind::Text),
    ColumnDef::new("run_id", ColumnKind::Text),
    ColumnDef::new("execution_date", ColumnKind::Timestamp),
    ColumnDef::new("state", ColumnKind::Text),
    ColumnDef::new("run_type", ColumnKind::Text),
    ColumnDef::new("conf", ColumnKind::Text),
    ColumnDef::new("start_date", ColumnKind::Timestamp),
    ColumnDef::new("end_date", ColumnKind::Timestamp),
    ColumnDef::new("data_interval_start", ColumnKind::Timestamp),
    ColumnDef::new("data_interval_end", ColumnKind::Timestamp),
    ColumnDef::new("last_scheduling_decision", ColumnKind::Timestamp),
    ColumnDef::new("dag_hash", ColumnKind::Text),
    ColumnDef::new("creating_job_id", ColumnKind::Integer),
    ColumnDef::new("external_trigger", ColumnKind::Boolean),
    ColumnDef::new("run_note", ColumnKind::Text),
    ColumnDef::new("log_template_id", ColumnKind::Integer),
    ColumnDef::new("extracted_at", ColumnKind::Timestamp),
    ColumnDef::new("extraction_id", ColumnKind::Uuid),
];

/// Columns of the `task_instances` destination table, in load order
pub const TASK_INSTANCE_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("task_id", ColumnKind::Text),
    ColumnDef::new("dag_id", ColumnKind::Text),
    ColumnDef::new("run_id", ColumnKind::Text),
    ColumnDef::new("map_index", ColumnKind::Integer),
    ColumnDef::new("execution_date", ColumnKind::Timestamp),
    ColumnDef::new("start_date", ColumnKind::Timestamp),
    ColumnDef::new("end_date", ColumnKind::Timestamp),
    ColumnDef::new("duration", ColumnKind::Float),
    ColumnDef::new("state", ColumnKind::Text),
    ColumnDef::new("try_number", ColumnKind::Integer),
    ColumnDef::new("max_tries", ColumnKind::Integer),
    ColumnDef::new("hostname", ColumnKind::Text),
    ColumnDef::new("unixname", ColumnKind::Text),
    ColumnDef::new("job_id", ColumnKind::Integer),
    ColumnDef::new("pool", ColumnKind::Text),
    ColumnDef::new("pool_slots", ColumnKind::Integer),
    ColumnDef::new("queue", ColumnKind::Text),
    ColumnDef::new("priority_weight", ColumnKind::Integer),
    ColumnDef::new("operator", ColumnKind::Text),
    ColumnDef::new("queued_dttm", ColumnKind::Timestamp),
    ColumnDef::new("queued_by_job_id", ColumnKind::Integer),
    ColumnDef::new("pid", ColumnKind::Integer),
    ColumnDef::new("updated_at", ColumnKind::Timestamp),
    ColumnDef::new("rendered_fields", ColumnKind::Text),
    ColumnDef::new("extracted_at", ColumnKind::Timestamp),
    ColumnDef::new("extraction_id", ColumnKind::Uuid),
];

/// Append-only destination tables, the only tables this crate writes or inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationTable {
    DagRuns,
    TaskInstances,
}

impl DestinationTable {
    pub const ALL: [DestinationTable; 2] = [Self::DagRuns, Self::TaskInstances];

    pub fn name(&self) -> &'static str {
        match self {
            Self::DagRuns => "dag_runs",
            Self::TaskInstances => "task_instances",
        }
    }

    pub fn columns(&self) -> &'static [ColumnDef] {
        match self {
            Self::DagRuns => DAG_RUN_COLUMNS,
            Self::TaskInstances => TASK_INSTANCE_COLUMNS,
        }
    }

    /// Validate a column name against this table's allow-list
    pub fn column(&self, name: &str) -> Result<&'static str, IdentifierError> {
        self.columns()
            .iter()
            .map(|column| column.name)
            .find(|column| *column == name)
            .ok_or_else(|| IdentifierError::UnknownColumn {
                table: self.name().to_string(),
                column: name.to_string(),
            })
    }

    /// Double-quoted table identifier, safe to splice into SQL
    pub fn quoted(&self) -> String {
        quote_identifier(self.name())
    }
}

impl fmt::Display for DestinationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DestinationTable {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|table| table.name() == s)
            .ok_or_else(|| IdentifierError::UnknownTable {
                name: s.to_string(),
            })
    }
}

/// Quote an allow-listed identifier for PostgreSQL
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// How the external orchestrator is expected to schedule this pipeline.
///
/// Retries, timeouts and concurrency limits are enforced by the orchestrator,
/// not by this crate; this is exported so deployments can be checked against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub dag_id: String,
    pub description: String,
    pub schedule: String,
    pub retries: u32,
    pub retry_delay_seconds: u64,
    pub execution_timeout_seconds: u64,
    pub max_active_runs: u32,
    pub catchup: bool,
    pub tags: Vec<String>,
    /// Task ids in execution order
    pub tasks: Vec<String>,
}

pub mod pipeline {
    pub const DAG_ID: &str = "airflow_observability_pipeline";
    pub const SCHEDULE: &str = "0 2 * * *";
    pub const RETRIES: u32 = 3;
    pub const RETRY_DELAY_SECONDS: u64 = 5 * 60;
    pub const EXECUTION_TIMEOUT_SECONDS: u64 = 2 * 60 * 60;
    pub const MAX_ACTIVE_RUNS: u32 = 1;

    pub const EXTRACT_TASK_ID: &str = "extract_airflow_metadata";
    pub const QUALITY_TASK_ID: &str = "run_data_quality_checks";
}

impl Default for PipelineDefinition {
    fn default() -> Self {
        Self {
            dag_id: pipeline::DAG_ID.to_string(),
            description: "Extract Airflow metadata and load into observability database"
                .to_string(),
            schedule: pipeline::SCHEDULE.to_string(),
            retries: pipeline::RETRIES,
            retry_delay_seconds: pipeline::RETRY_DELAY_SECONDS,
            execution_timeout_seconds: pipeline::EXECUTION_TIMEOUT_SECONDS,
            max_active_runs: pipeline::MAX_ACTIVE_RUNS,
            catchup: false,
            tags: vec![
                "observability".to_string(),
                "metadata".to_string(),
                "data-quality".to_string(),
            ],
            tasks: vec![
                pipeline::EXTRACT_TASK_ID.to_string(),
                pipeline::QUALITY_TASK_ID.to_string(),
            ],
        }
    }
}
