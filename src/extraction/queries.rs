//! Source queries against the scheduler's metadata schema and the raw row
//! shapes they decode into.
//!
//! The window bounds are bound parameters; a NULL bound disables that side of
//! the filter. Integer columns are widened to BIGINT so both record families
//! decode into `i64` regardless of the scheduler's column widths.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::fmt::Write as _;
use uuid::Uuid;

use crate::models::{DagRunRecord, TaskInstanceRecord};

pub(crate) const DAG_RUNS_QUERY: &str = r#"
    SELECT
        dr.dag_id,
        dr.run_id,
        dr.execution_date,
        dr.state,
        dr.run_type,
        dr.conf,
        dr.start_date,
        dr.end_date,
        dr.data_interval_start,
        dr.data_interval_end,
        dr.last_scheduling_decision,
        dr.dag_hash,
        dr.creating_job_id::bigint AS creating_job_id,
        dr.external_trigger,
        note.content AS run_note,
        dr.log_template_id::bigint AS log_template_id
    FROM dag_run dr
    LEFT JOIN dag_run_note note ON note.dag_run_id = dr.id
    WHERE ($1::timestamptz IS NULL OR dr.execution_date >= $1::timestamptz)
      AND ($2::timestamptz IS NULL OR dr.execution_date <= $2::timestamptz)
    ORDER BY dr.execution_date, dr.dag_id, dr.run_id
"#;

pub(crate) const TASK_INSTANCES_QUERY: &str = r#"
    SELECT
        ti.task_id,
        ti.dag_id,
        ti.run_id,
        ti.map_index::bigint AS map_index,
        dr.execution_date,
        ti.start_date,
        ti.end_date,
        ti.duration,
        ti.state,
        ti.try_number::bigint AS try_number,
        ti.max_tries::bigint AS max_tries,
        ti.hostname,
        ti.unixname,
        ti.job_id::bigint AS job_id,
        ti.pool,
        ti.pool_slots::bigint AS pool_slots,
        ti.queue,
        ti.priority_weight::bigint AS priority_weight,
        ti.operator,
        ti.queued_dttm,
        ti.queued_by_job_id::bigint AS queued_by_job_id,
        ti.pid::bigint AS pid,
        ti.updated_at,
        rtif.rendered_fields::text AS rendered_fields
    FROM task_instance ti
    JOIN dag_run dr ON dr.dag_id = ti.dag_id AND dr.run_id = ti.run_id
    LEFT JOIN rendered_task_instance_fields rtif
        ON rtif.dag_id = ti.dag_id
       AND rtif.task_id = ti.task_id
       AND rtif.run_id = ti.run_id
       AND rtif.map_index = ti.map_index
    WHERE ($1::timestamptz IS NULL OR dr.execution_date >= $1::timestamptz)
      AND ($2::timestamptz IS NULL OR dr.execution_date <= $2::timestamptz)
    ORDER BY dr.execution_date, ti.dag_id, ti.run_id, ti.task_id, ti.map_index
"#;

#[derive(Debug, FromRow)]
pub(crate) struct DagRunRow {
    dag_id: String,
    run_id: String,
    execution_date: DateTime<Utc>,
    state: Option<String>,
    run_type: Option<String>,
    conf: Option<Vec<u8>>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    data_interval_start: Option<DateTime<Utc>>,
    data_interval_end: Option<DateTime<Utc>>,
    last_scheduling_decision: Option<DateTime<Utc>>,
    dag_hash: Option<String>,
    creating_job_id: Option<i64>,
    external_trigger: Option<bool>,
    run_note: Option<String>,
    log_template_id: Option<i64>,
}

impl DagRunRow {
    pub(crate) fn into_record(self, extracted_at: DateTime<Utc>, extraction_id: Uuid) -> DagRunRecord {
        DagRunRecord {
            dag_id: self.dag_id,
            run_id: self.run_id,
            execution_date: self.execution_date,
            state: self.state,
            run_type: self.run_type,
            conf: self.conf.as_deref().map(render_opaque),
            start_date: self.start_date,
            end_date: self.end_date,
            data_interval_start: self.data_interval_start,
            data_interval_end: self.data_interval_end,
            last_scheduling_decision: self.last_scheduling_decision,
            dag_hash: self.dag_hash,
            creating_job_id: self.creating_job_id,
            external_trigger: self.external_trigger,
            run_note: self.run_note,
            log_template_id: self.log_template_id,
            extracted_at,
            extraction_id,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TaskInstanceRow {
    task_id: String,
    dag_id: String,
    run_id: String,
    map_index: Option<i64>,
    execution_date: DateTime<Utc>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    duration: Option<f64>,
    state: Option<String>,
    try_number: Option<i64>,
    max_tries: Option<i64>,
    hostname: Option<String>,
    unixname: Option<String>,
    job_id: Option<i64>,
    pool: Option<String>,
    pool_slots: Option<i64>,
    queue: Option<String>,
    priority_weight: Option<i64>,
    operator: Option<String>,
    queued_dttm: Option<DateTime<Utc>>,
    queued_by_job_id: Option<i64>,
    pid: Option<i64>,
    updated_at: Option<DateTime<Utc>>,
    rendered_fields: Option<String>,
}

impl TaskInstanceRow {
    pub(crate) fn into_record(
        self,
        extracted_at: DateTime<Utc>,
        extraction_id: Uuid,
    ) -> TaskInstanceRecord {
        TaskInstanceRecord {
            task_id: self.task_id,
            dag_id: self.dag_id,
            run_id: self.run_id,
            map_index: self.map_index.unwrap_or(-1),
            execution_date: self.execution_date,
            start_date: self.start_date,
            end_date: self.end_date,
            duration: self.duration,
            state: self.state,
            try_number: self.try_number,
            max_tries: self.max_tries,
            hostname: self.hostname,
            unixname: self.unixname,
            job_id: self.job_id,
            pool: self.pool,
            pool_slots: self.pool_slots,
            queue: self.queue,
            priority_weight: self.priority_weight,
            operator: self.operator,
            queued_dttm: self.queued_dttm,
            queued_by_job_id: self.queued_by_job_id,
            pid: self.pid,
            updated_at: self.updated_at,
            rendered_fields: self.rendered_fields,
            extracted_at,
            extraction_id,
        }
    }
}

/// Render an opaque binary field as stable text.
///
/// UTF-8 content is kept verbatim; anything else becomes PostgreSQL's hex
/// bytea text form (`\x` + lowercase hex).
pub fn render_opaque(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let mut out = String::with_capacity(2 + bytes.len() * 2);
            out.push_str("\\x");
            for byte in bytes {
                let _ = write!(out, "{byte:02x}");
            }
            out
        }
    }
}
