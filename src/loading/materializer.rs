//! # Table Materializer
//!
//! Ensures an append-only destination table exists before rows are written to
//! it. A missing table is created from the sample batch's inferred column
//! kinds; an existing table is never altered, only read back and compared.

use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::constants::{quote_identifier, DestinationTable};
use crate::database::catalog;
use crate::error::MaterializeError;
use crate::models::{ColumnKind, RecordBatch};

/// Column kinds of a destination table, restricted to the batch's columns and
/// in batch column order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: DestinationTable,
    pub columns: Vec<(&'static str, ColumnKind)>,
}

impl TableSchema {
    pub fn kind_of(&self, column: &str) -> Option<ColumnKind> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, kind)| *kind)
    }

    pub fn kinds(&self) -> Vec<ColumnKind> {
        self.columns.iter().map(|(_, kind)| *kind).collect()
    }
}

#[derive(Debug, Clone)]
pub struct TableMaterializer {
    pool: PgPool,
}

impl TableMaterializer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create `table` from `sample` if it does not exist, then return the
    /// destination schema for the batch's columns.
    ///
    /// Calling this repeatedly is a no-op after the first creation. Concurrent
    /// creators racing on the same table both succeed.
    pub async fn ensure_table(
        &self,
        table: DestinationTable,
        sample: &RecordBatch,
    ) -> Result<TableSchema, MaterializeError> {
        if sample.table() != table {
            return Err(MaterializeError::schema_drift(
                table.name(),
                format!("batch of {} rows cannot be loaded here", sample.table()),
            ));
        }

        let exists = catalog::table_exists(&self.pool, table)
            .await
            .map_err(|e| MaterializeError::database(table.name(), e))?;

        if !exists {
            let kinds = sample
                .infer_column_kinds()
                .ok_or_else(|| MaterializeError::EmptySample {
                    table: table.name().to_string(),
                })?;
            self.create_table(table, &kinds).await?;
        } else {
            debug!(table = %table, "Destination table already exists");
        }

        self.read_schema(table, sample).await
    }

    async fn create_table(
        &self,
        table: DestinationTable,
        kinds: &[(&'static str, ColumnKind)],
    ) -> Result<(), MaterializeError> {
        let ddl = create_table_sql(table, kinds)?;
        info!(table = %table, columns = kinds.len(), "Creating table");

        match sqlx::query(&ddl).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(ref db_err))
                if is_concurrent_create_race(
                    db_err.code().as_deref(),
                    db_err.message(),
                    db_err.constraint(),
                ) =>
            {
                debug!(table = %table, "Table created concurrently by another writer");
                Ok(())
            }
            Err(e) => Err(MaterializeError::database(table.name(), e)),
        }
    }

    async fn read_schema(
        &self,
        table: DestinationTable,
        sample: &RecordBatch,
    ) -> Result<TableSchema, MaterializeError> {
        let existing: HashMap<String, String> = catalog::table_columns(&self.pool, table)
            .await
            .map_err(|e| MaterializeError::database(table.name(), e))?
            .into_iter()
            .collect();

        let mut columns = Vec::with_capacity(sample.columns().len());
        for column in sample.columns() {
            let data_type = existing.get(column.name).ok_or_else(|| {
                MaterializeError::schema_drift(
                    table.name(),
                    format!("destination is missing column {}", column.name),
                )
            })?;
            let kind = ColumnKind::from_information_schema(data_type).ok_or_else(|| {
                MaterializeError::schema_drift(
                    table.name(),
                    format!("column {} has unsupported type {data_type}", column.name),
                )
            })?;
            columns.push((column.name, kind));
        }

        Ok(TableSchema { table, columns })
    }
}

/// `CREATE TABLE IF NOT EXISTS` for allow-listed columns
pub(crate) fn create_table_sql(
    table: DestinationTable,
    kinds: &[(&'static str, ColumnKind)],
) -> Result<String, MaterializeError> {
    let mut definitions = Vec::with_capacity(kinds.len());
    for (column, kind) in kinds {
        let column = table.column(column)?;
        definitions.push(format!("{} {}", quote_identifier(column), kind.sql_type()));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.quoted(),
        definitions.join(", ")
    ))
}

/// Two sessions running `CREATE TABLE IF NOT EXISTS` at once can both pass the
/// existence check; the loser hits a unique violation on the catalog's type
/// name index.
fn is_concurrent_create_race(code: Option<&str>, message: &str, constraint: Option<&str>) -> bool {
    code == Some("23505")
        && (message.contains("pg_type_typname_nsp_index")
            || constraint == Some("pg_type_typname_nsp_index"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_quotes_allow_listed_columns() {
        let kinds = vec![
            ("dag_id", ColumnKind::Text),
            ("execution_date", ColumnKind::Timestamp),
            ("creating_job_id", ColumnKind::Integer),
        ];
        let ddl = create_table_sql(DestinationTable::DagRuns, &kinds).unwrap();
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"dag_runs\" (\"dag_id\" TEXT, \"execution_date\" TIMESTAMPTZ, \"creating_job_id\" BIGINT)"
        );
    }

    #[test]
    fn ddl_rejects_columns_outside_the_allow_list() {
        let kinds = vec![("duration", ColumnKind::Float)];
        let err = create_table_sql(DestinationTable::DagRuns, &kinds).unwrap_err();
        assert!(matches!(err, MaterializeError::Identifier(_)));
    }

    #[test]
    fn detects_catalog_race() {
        assert!(is_concurrent_create_race(
            Some("23505"),
            "duplicate key value violates unique constraint \"pg_type_typname_nsp_index\"",
            None,
        ));
        assert!(is_concurrent_create_race(
            Some("23505"),
            "duplicate key",
            Some("pg_type_typname_nsp_index"),
        ));
        assert!(!is_concurrent_create_race(Some("23505"), "duplicate key", Some("dag_runs_pkey")));
        assert!(!is_concurrent_create_race(Some("42P07"), "pg_type_typname_nsp_index", None));
    }

    #[test]
    fn schema_lookup_by_column() {
        let schema = TableSchema {
            table: DestinationTable::TaskInstances,
            columns: vec![("task_id", ColumnKind::Text), ("duration", ColumnKind::Float)],
        };
        assert_eq!(schema.kind_of("duration"), Some(ColumnKind::Float));
        assert_eq!(schema.kind_of("pid"), None);
        assert_eq!(schema.kinds(), vec![ColumnKind::Text, ColumnKind::Float]);
    }
}
