//! # Batch Loader
//!
//! Appends record batches to the observability store. Rows are written in
//! chunks, each chunk in its own transaction, so a failure leaves earlier
//! chunks committed and reports how many rows made it.

use sqlx::postgres::Postgres;
use sqlx::query_builder::Separated;
use sqlx::{PgPool, QueryBuilder};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use super::materializer::{TableMaterializer, TableSchema};
use crate::config::{ConnectionsConfig, LoadingConfig};
use crate::constants::{quote_identifier, DestinationTable, DESTINATION_CONNECTION};
use crate::database::ConnectionProvider;
use crate::error::{LoadError, LoadFailure, MaterializeError};
use crate::logging::log_load_operation;
use crate::models::{ColumnKind, RecordBatch, Value};

/// PostgreSQL's limit on bind parameters in one statement
const MAX_BIND_PARAMETERS: usize = 65_535;

pub struct BatchLoader {
    connections: ConnectionProvider,
    chunk_size: usize,
}

impl BatchLoader {
    pub fn new(connections: Arc<ConnectionsConfig>, settings: &LoadingConfig) -> Self {
        Self::with_provider(ConnectionProvider::new(connections), settings)
    }

    pub fn with_provider(connections: ConnectionProvider, settings: &LoadingConfig) -> Self {
        Self {
            connections,
            chunk_size: settings.chunk_size,
        }
    }

    pub fn connections(&self) -> &ConnectionProvider {
        &self.connections
    }

    /// Append `batch` to its destination table and return the rows written.
    ///
    /// An empty batch is skipped with a warning and returns 0 without touching
    /// the destination.
    pub async fn load(&self, batch: &RecordBatch) -> Result<u64, LoadError> {
        let table = batch.table();
        if batch.is_empty() {
            warn!(table = %table, "Batch is empty, skipping load");
            log_load_operation(table.name(), 0, "skipped", None, Some("empty batch"));
            return Ok(0);
        }

        let started = Instant::now();
        let pool = self
            .connections
            .resolve(DESTINATION_CONNECTION)
            .await
            .map_err(|e| LoadError::new(table.name(), 0, e))?;

        let schema = TableMaterializer::new(pool.clone())
            .ensure_table(table, batch)
            .await
            .map_err(|e| LoadError::new(table.name(), 0, e))?;
        check_value_kinds(&schema, batch).map_err(|e| LoadError::new(table.name(), 0, e))?;

        let committed = self
            .insert_chunks(&pool, &schema, batch)
            .await
            .inspect_err(|e| {
                error!(
                    table = %table,
                    rows_committed = e.rows_committed,
                    error = %e.cause,
                    "Error loading data"
                );
            })?;

        log_load_operation(
            table.name(),
            committed,
            "loaded",
            Some(started.elapsed().as_millis() as u64),
            None,
        );
        Ok(committed)
    }

    /// Load run and task-instance batches concurrently; returns `(runs, task instances)`.
    ///
    /// Both loads always run to completion. When one fails, its error is
    /// returned and the other table's committed row count is logged, since a
    /// [`LoadError`] names a single table.
    pub async fn load_all(
        &self,
        dag_runs: &RecordBatch,
        task_instances: &RecordBatch,
    ) -> Result<(u64, u64), LoadError> {
        let (runs, steps) = tokio::join!(self.load(dag_runs), self.load(task_instances));
        match (runs, steps) {
            (Ok(runs), Ok(steps)) => Ok((runs, steps)),
            (Err(e), Ok(committed)) => {
                log_sibling_outcome(&e, task_instances.table(), Ok(committed));
                Err(e)
            }
            (Ok(committed), Err(e)) => {
                log_sibling_outcome(&e, dag_runs.table(), Ok(committed));
                Err(e)
            }
            (Err(e), Err(sibling)) => {
                log_sibling_outcome(&e, task_instances.table(), Err(&sibling));
                Err(e)
            }
        }
    }

    async fn insert_chunks(
        &self,
        pool: &PgPool,
        schema: &TableSchema,
        batch: &RecordBatch,
    ) -> Result<u64, LoadError> {
        let table = schema.table;
        let kinds = schema.kinds();
        let chunk_size = effective_chunk_size(self.chunk_size, kinds.len());
        let mut committed: u64 = 0;

        for (index, chunk) in batch.rows().chunks(chunk_size).enumerate() {
            let chunk_start = index * chunk_size;
            let chunk_end = chunk_start + chunk.len();
            let chunk_failed = |source: sqlx::Error| {
                LoadError::new(
                    table.name(),
                    committed,
                    LoadFailure::Chunk {
                        chunk_start,
                        chunk_end,
                        source,
                    },
                )
            };

            let mut query = insert_prefix(schema);
            query.push_values(chunk, |mut row_values, row| {
                for (value, kind) in row.iter().zip(&kinds) {
                    bind_value(&mut row_values, value, *kind);
                }
            });

            let mut tx = pool.begin().await.map_err(chunk_failed)?;
            query
                .build()
                .execute(&mut *tx)
                .await
                .map_err(chunk_failed)?;
            tx.commit().await.map_err(chunk_failed)?;

            committed += chunk.len() as u64;
            debug!(table = %table, chunk_start, chunk_end, "Committed chunk");
        }

        Ok(committed)
    }
}

fn log_sibling_outcome(
    failed: &LoadError,
    sibling: DestinationTable,
    outcome: Result<u64, &LoadError>,
) {
    match outcome {
        Ok(committed) => warn!(
            failed_table = %failed.table,
            table = %sibling,
            rows_committed = committed,
            "Sibling table loaded while the other load failed"
        ),
        Err(e) => error!(
            failed_table = %failed.table,
            table = %sibling,
            rows_committed = e.rows_committed,
            error = %e.cause,
            "Sibling table load also failed"
        ),
    }
}

/// Rows per INSERT, bounded so one statement never exceeds the bind limit
pub(crate) fn effective_chunk_size(configured: usize, column_count: usize) -> usize {
    let by_parameters = MAX_BIND_PARAMETERS / column_count.max(1);
    configured.min(by_parameters).max(1)
}

fn insert_prefix(schema: &TableSchema) -> QueryBuilder<'static, Postgres> {
    let columns: Vec<String> = schema
        .columns
        .iter()
        .map(|(name, _)| quote_identifier(name))
        .collect();
    QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        schema.table.quoted(),
        columns.join(", ")
    ))
}

/// Every non-null cell must match the destination column's kind; nothing is coerced
pub(crate) fn check_value_kinds(
    schema: &TableSchema,
    batch: &RecordBatch,
) -> Result<(), MaterializeError> {
    for (row_index, row) in batch.rows().iter().enumerate() {
        for ((column, expected), value) in schema.columns.iter().zip(row) {
            if let Some(actual) = value.kind() {
                if actual != *expected {
                    return Err(MaterializeError::schema_drift(
                        schema.table.name(),
                        format!(
                            "row {row_index} column {column} holds {actual:?} but destination is {expected:?}"
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Bind one cell; nulls are typed by the destination column
fn bind_value(row: &mut Separated<'_, 'static, Postgres, &'static str>, value: &Value, kind: ColumnKind) {
    match value {
        Value::Text(v) => row.push_bind(v.clone()),
        Value::Integer(v) => row.push_bind(*v),
        Value::Float(v) => row.push_bind(*v),
        Value::Boolean(v) => row.push_bind(*v),
        Value::Timestamp(v) => row.push_bind(*v),
        Value::Uuid(v) => row.push_bind(*v),
        Value::Null => match kind {
            ColumnKind::Text => row.push_bind(None::<String>),
            ColumnKind::Integer => row.push_bind(None::<i64>),
            ColumnKind::Float => row.push_bind(None::<f64>),
            ColumnKind::Boolean => row.push_bind(None::<bool>),
            ColumnKind::Timestamp => row.push_bind(None::<chrono::DateTime<chrono::Utc>>),
            ColumnKind::Uuid => row.push_bind(None::<uuid::Uuid>),
        },
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DagRunRecord, TabularRecord};
    use chrono::Utc;
    use uuid::Uuid;

    fn run(run_id: &str) -> DagRunRecord {
        DagRunRecord {
            dag_id: "etl".to_string(),
            run_id: run_id.to_string(),
            execution_date: Utc::now(),
            state: Some("success".to_string()),
            run_type: Some("scheduled".to_string()),
            conf: None,
            start_date: None,
            end_date: None,
            data_interval_start: None,
            data_interval_end: None,
            last_scheduling_decision: None,
            dag_hash: None,
            creating_job_id: Some(7),
            external_trigger: Some(false),
            run_note: None,
            log_template_id: None,
            extracted_at: Utc::now(),
            extraction_id: Uuid::nil(),
        }
    }

    fn declared_schema(table: DestinationTable) -> TableSchema {
        TableSchema {
            table,
            columns: table.columns().iter().map(|c| (c.name, c.kind)).collect(),
        }
    }

    #[test]
    fn chunk_size_respects_bind_limit() {
        assert_eq!(effective_chunk_size(1000, 18), 1000);
        assert_eq!(effective_chunk_size(10_000, 26), 65_535 / 26);
        assert_eq!(effective_chunk_size(0, 26), 1);
    }

    #[test]
    fn matching_kinds_pass() {
        let batch = RecordBatch::from_records(&[run("a"), run("b")], Uuid::nil(), Utc::now());
        assert!(check_value_kinds(&declared_schema(DestinationTable::DagRuns), &batch).is_ok());
    }

    #[test]
    fn mismatched_kind_is_drift() {
        let batch = RecordBatch::from_records(&[run("a")], Uuid::nil(), Utc::now());
        let mut schema = declared_schema(DestinationTable::DagRuns);
        // creating_job_id stored as text downstream
        schema.columns[12].1 = ColumnKind::Text;

        let err = check_value_kinds(&schema, &batch).unwrap_err();
        match err {
            MaterializeError::SchemaDrift { table, detail } => {
                assert_eq!(table, "dag_runs");
                assert!(detail.contains("creating_job_id"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn insert_lists_every_column() {
        let schema = declared_schema(DestinationTable::DagRuns);
        let sql = insert_prefix(&schema).into_sql();
        assert!(sql.starts_with("INSERT INTO \"dag_runs\" (\"dag_id\", \"run_id\""));
        assert!(sql.contains("\"extraction_id\""));
        assert_eq!(run("a").to_row().len(), schema.columns.len());
    }
}
