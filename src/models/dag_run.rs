//! # DAG Run Record
//!
//! Point-in-time snapshot of one run of a workflow, as extracted from the
//! scheduler's `dag_run` table. Maps to the append-only `dag_runs` destination
//! table; column order follows [`DAG_RUN_COLUMNS`](crate::constants::DAG_RUN_COLUMNS).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::batch::{TabularRecord, Value};
use crate::constants::{DestinationTable, LifecycleState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagRunRecord {
    pub dag_id: String,
    pub run_id: String,
    pub execution_date: DateTime<Utc>,
    pub state: Option<String>,
    pub run_type: Option<String>,
    /// Run configuration rendered as stable text
    pub conf: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub data_interval_start: Option<DateTime<Utc>>,
    pub data_interval_end: Option<DateTime<Utc>>,
    pub last_scheduling_decision: Option<DateTime<Utc>>,
    pub dag_hash: Option<String>,
    pub creating_job_id: Option<i64>,
    pub external_trigger: Option<bool>,
    pub run_note: Option<String>,
    pub log_template_id: Option<i64>,
    pub extracted_at: DateTime<Utc>,
    pub extraction_id: Uuid,
}

impl DagRunRecord {
    /// Parsed lifecycle state, `None` when absent or not a known state
    pub fn lifecycle_state(&self) -> Option<LifecycleState> {
        self.state.as_deref().and_then(|s| s.parse().ok())
    }
}

impl TabularRecord for DagRunRecord {
    const TABLE: DestinationTable = DestinationTable::DagRuns;

    fn to_row(&self) -> Vec<Value> {
        vec![
            self.dag_id.clone().into(),
            self.run_id.clone().into(),
            self.execution_date.into(),
            self.state.clone().into(),
            self.run_type.clone().into(),
            self.conf.clone().into(),
            self.start_date.into(),
            self.end_date.into(),
            self.data_interval_start.into(),
            self.data_interval_end.into(),
            self.last_scheduling_decision.into(),
            self.dag_hash.clone().into(),
            self.creating_job_id.into(),
            self.external_trigger.into(),
            self.run_note.clone().into(),
            self.log_template_id.into(),
            self.extracted_at.into(),
            self.extraction_id.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> DagRunRecord {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap();
        DagRunRecord {
            dag_id: "billing_daily".to_string(),
            run_id: "scheduled__2024-05-01T02:00:00+00:00".to_string(),
            execution_date: ts,
            state: Some("success".to_string()),
            run_type: Some("scheduled".to_string()),
            conf: None,
            start_date: Some(ts),
            end_date: None,
            data_interval_start: None,
            data_interval_end: None,
            last_scheduling_decision: None,
            dag_hash: Some("8f1c".to_string()),
            creating_job_id: Some(17),
            external_trigger: Some(false),
            run_note: None,
            log_template_id: Some(1),
            extracted_at: ts,
            extraction_id: Uuid::nil(),
        }
    }

    #[test]
    fn row_matches_column_allow_list() {
        let record = sample();
        let row = record.to_row();
        assert_eq!(row.len(), DestinationTable::DagRuns.columns().len());
        assert_eq!(row[0], Value::Text("billing_daily".to_string()));
        assert_eq!(row[12], Value::Integer(17));
        assert_eq!(row[17], Value::Uuid(Uuid::nil()));
    }

    #[test]
    fn parses_known_states_only() {
        let mut record = sample();
        assert_eq!(record.lifecycle_state(), Some(LifecycleState::Success));
        record.state = Some("deferred".to_string());
        assert_eq!(record.lifecycle_state(), None);
    }
}
