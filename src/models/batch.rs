//! # Tabular Batches
//!
//! Uniform row/column representation shared by both record families. The
//! extractor produces [`RecordBatch`]es, the materializer infers a table schema
//! from them and the loader binds their cells as typed parameters.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::constants::{ColumnDef, DestinationTable};

/// A single cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl Value {
    /// Column kind this value would bootstrap, `None` for nulls
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Self::Null => None,
            Self::Text(_) => Some(ColumnKind::Text),
            Self::Integer(_) => Some(ColumnKind::Integer),
            Self::Float(_) => Some(ColumnKind::Float),
            Self::Boolean(_) => Some(ColumnKind::Boolean),
            Self::Timestamp(_) => Some(ColumnKind::Timestamp),
            Self::Uuid(_) => Some(ColumnKind::Uuid),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Option<i64>> for Value {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Integer)
    }
}

impl From<Option<f64>> for Value {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Float)
    }
}

impl From<Option<bool>> for Value {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Self::Null, Self::Boolean)
    }
}

impl From<Option<DateTime<Utc>>> for Value {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Self::Null, Self::Timestamp)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

/// Destination column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Uuid,
}

impl ColumnKind {
    /// PostgreSQL type used when creating a table
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "BIGINT",
            Self::Float => "DOUBLE PRECISION",
            Self::Boolean => "BOOLEAN",
            Self::Timestamp => "TIMESTAMPTZ",
            Self::Uuid => "UUID",
        }
    }

    /// Map an `information_schema.columns.data_type` value back to a kind.
    ///
    /// Only the exact types [`sql_type`](Self::sql_type) creates are accepted.
    /// Anything a bound value would reach through an assignment cast (naive
    /// timestamps, `integer`, `numeric`, `varchar`) is reported as drift.
    pub fn from_information_schema(data_type: &str) -> Option<Self> {
        match data_type {
            "text" => Some(Self::Text),
            "bigint" => Some(Self::Integer),
            "double precision" => Some(Self::Float),
            "boolean" => Some(Self::Boolean),
            "timestamp with time zone" => Some(Self::Timestamp),
            "uuid" => Some(Self::Uuid),
            _ => None,
        }
    }
}

/// A record that can be flattened into a destination row
pub trait TabularRecord {
    const TABLE: DestinationTable;

    /// Cells in the order of `TABLE.columns()`
    fn to_row(&self) -> Vec<Value>;
}

/// Rows of one record family produced by one extraction invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordBatch {
    table: DestinationTable,
    extraction_id: Uuid,
    extracted_at: DateTime<Utc>,
    rows: Vec<Vec<Value>>,
}

impl RecordBatch {
    pub fn from_records<R: TabularRecord>(
        records: &[R],
        extraction_id: Uuid,
        extracted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            table: R::TABLE,
            extraction_id,
            extracted_at,
            rows: records.iter().map(TabularRecord::to_row).collect(),
        }
    }

    pub fn empty(table: DestinationTable, extraction_id: Uuid, extracted_at: DateTime<Utc>) -> Self {
        Self {
            table,
            extraction_id,
            extracted_at,
            rows: Vec::new(),
        }
    }

    pub fn table(&self) -> DestinationTable {
        self.table
    }

    pub fn extraction_id(&self) -> Uuid {
        self.extraction_id
    }

    pub fn extracted_at(&self) -> DateTime<Utc> {
        self.extracted_at
    }

    pub fn columns(&self) -> &'static [ColumnDef] {
        self.table.columns()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Infer a kind per column from the first row.
    ///
    /// A null in the first row falls back to the column's declared kind.
    /// Returns `None` for an empty batch, which cannot bootstrap a table.
    pub fn infer_column_kinds(&self) -> Option<Vec<(&'static str, ColumnKind)>> {
        let first = self.rows.first()?;
        let kinds = self
            .columns()
            .iter()
            .zip(first)
            .map(|(column, value)| (column.name, value.kind().unwrap_or(column.kind)))
            .collect();
        Some(kinds)
    }
}
