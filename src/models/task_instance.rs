//! # Task Instance Record
//!
//! Point-in-time snapshot of one attempt of one task within one run. Maps to
//! the append-only `task_instances` destination table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::batch::{TabularRecord, Value};
use crate::constants::{DestinationTable, LifecycleState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstanceRecord {
    pub task_id: String,
    pub dag_id: String,
    pub run_id: String,
    /// -1 for unmapped tasks
    pub map_index: i64,
    pub execution_date: DateTime<Utc>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Seconds
    pub duration: Option<f64>,
    pub state: Option<String>,
    pub try_number: Option<i64>,
    pub max_tries: Option<i64>,
    pub hostname: Option<String>,
    pub unixname: Option<String>,
    pub job_id: Option<i64>,
    pub pool: Option<String>,
    pub pool_slots: Option<i64>,
    pub queue: Option<String>,
    pub priority_weight: Option<i64>,
    pub operator: Option<String>,
    pub queued_dttm: Option<DateTime<Utc>>,
    pub queued_by_job_id: Option<i64>,
    pub pid: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Rendered template fields as JSON text
    pub rendered_fields: Option<String>,
    pub extracted_at: DateTime<Utc>,
    pub extraction_id: Uuid,
}

impl TaskInstanceRecord {
    pub fn lifecycle_state(&self) -> Option<LifecycleState> {
        self.state.as_deref().and_then(|s| s.parse().ok())
    }
}

impl TabularRecord for TaskInstanceRecord {
    const TABLE: DestinationTable = DestinationTable::TaskInstances;

    fn to_row(&self) -> Vec<Value> {
        vec![
            self.task_id.clone().into(),
            self.dag_id.clone().into(),
            self.run_id.clone().into(),
            Value::Integer(self.map_index),
            self.execution_date.into(),
            self.start_date.into(),
            self.end_date.into(),
            self.duration.into(),
            self.state.clone().into(),
            self.try_number.into(),
            self.max_tries.into(),
            self.hostname.clone().into(),
            self.unixname.clone().into(),
            self.job_id.into(),
            self.pool.clone().into(),
            self.pool_slots.into(),
            self.queue.clone().into(),
            self.priority_weight.into(),
            self.operator.clone().into(),
            self.queued_dttm.into(),
            self.queued_by_job_id.into(),
            self.pid.into(),
            self.updated_at.into(),
            self.rendered_fields.clone().into(),
            self.extracted_at.into(),
            self.extraction_id.into(),
        ]
    }
}
