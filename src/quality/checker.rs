//! # Quality Checker
//!
//! Read-only battery of data quality checks over the destination tables.
//!
//! A check that runs and finds a problem returns a failing [`CheckResult`]. A
//! check whose query errors also returns a failing result, with `error`
//! populated. Only systemic problems (the destination is unreachable or the
//! table-existence check itself fails) abort [`QualityChecker::run_all`].

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{ConnectionsConfig, QualityConfig};
use crate::constants::{quote_identifier, DestinationTable, DESTINATION_CONNECTION};
use crate::database::{catalog, ConnectionProvider};
use crate::error::CheckExecutionError;
use crate::logging::log_check_result;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    RowCount,
    NullRate,
    Freshness,
}

/// A measured quantity or the threshold it was compared against
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Count(i64),
    Fraction(f64),
    Hours(f64),
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub check_name: String,
    pub check_kind: CheckKind,
    pub target_table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measured_value: Option<MetricValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<MetricValue>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn new(check_name: String, check_kind: CheckKind, table: DestinationTable) -> Self {
        Self {
            check_name,
            check_kind,
            target_table: table.name().to_string(),
            target_column: None,
            passed: false,
            measured_value: None,
            threshold: None,
            message: String::new(),
            error: None,
        }
    }

    fn on_column(mut self, column: &str) -> Self {
        self.target_column = Some(column.to_string());
        self
    }

    fn errored(mut self, context: &str, err: &CheckExecutionError) -> Self {
        self.passed = false;
        self.message = format!("Error {context} for {}: {err}", self.target_table);
        self.error = Some(err.to_string());
        self
    }
}

pub fn row_count_check_name(table: DestinationTable) -> String {
    format!("row_count_{table}")
}

pub fn null_check_name(table: DestinationTable, column: &str) -> String {
    format!("null_check_{table}_{column}")
}

pub fn freshness_check_name(table: DestinationTable) -> String {
    format!("freshness_check_{table}")
}

/// `passed = count >= min_rows`
pub fn evaluate_row_count(table: DestinationTable, count: i64, min_rows: i64) -> CheckResult {
    let mut result = CheckResult::new(row_count_check_name(table), CheckKind::RowCount, table);
    result.passed = count >= min_rows;
    result.measured_value = Some(MetricValue::Count(count));
    result.threshold = Some(MetricValue::Count(min_rows));
    result.message = format!("Row count check: {count} >= {min_rows}");
    result
}

/// `passed = nulls / total <= max_fraction`; an empty table fails
pub fn evaluate_null_rate(
    table: DestinationTable,
    column: &str,
    total: i64,
    nulls: i64,
    max_fraction: f64,
) -> CheckResult {
    let mut result =
        CheckResult::new(null_check_name(table, column), CheckKind::NullRate, table).on_column(column);
    result.threshold = Some(MetricValue::Fraction(max_fraction));

    if total == 0 {
        result.message = "Table is empty".to_string();
        return result;
    }

    let fraction = nulls as f64 / total as f64;
    result.passed = fraction <= max_fraction;
    result.measured_value = Some(MetricValue::Fraction(fraction));
    result.message = format!(
        "Null check: {:.2}% null values (max allowed: {:.2}%)",
        fraction * 100.0,
        max_fraction * 100.0
    );
    result
}

/// `passed = now - latest <= max_age`; no timestamp at all fails
pub fn evaluate_freshness(
    table: DestinationTable,
    timestamp_column: &str,
    latest: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_age: Duration,
) -> CheckResult {
    let max_hours = max_age.num_milliseconds() as f64 / MILLIS_PER_HOUR;
    let mut result = CheckResult::new(freshness_check_name(table), CheckKind::Freshness, table)
        .on_column(timestamp_column);
    result.threshold = Some(MetricValue::Hours(max_hours));

    let Some(latest) = latest else {
        result.message = "No timestamp found in table".to_string();
        return result;
    };

    let age = now - latest;
    let age_hours = age.num_milliseconds() as f64 / MILLIS_PER_HOUR;
    result.passed = age <= max_age;
    result.measured_value = Some(MetricValue::Hours(age_hours));
    result.message =
        format!("Data freshness: {age_hours:.2} hours old (max allowed: {max_hours} hours)");
    result
}

/// Aggregated outcome of one battery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub all_passed: bool,
    pub passed_count: usize,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checks: Vec<CheckResult>,
}

impl QualityReport {
    pub fn failed_count(&self) -> usize {
        self.total_count - self.passed_count
    }
}

/// Collects results for a single battery run
#[derive(Debug, Default)]
pub struct ReportBuilder {
    checks: Vec<CheckResult>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: CheckResult) -> &mut Self {
        self.checks.push(result);
        self
    }

    /// Report for a battery that could not start because tables are absent
    pub fn missing_tables(self) -> QualityReport {
        let passed_count = self.checks.iter().filter(|c| c.passed).count();
        QualityReport {
            all_passed: false,
            passed_count,
            total_count: self.checks.len(),
            message: Some("Required tables missing".to_string()),
            checks: self.checks,
        }
    }

    pub fn finish(self) -> QualityReport {
        let passed_count = self.checks.iter().filter(|c| c.passed).count();
        QualityReport {
            all_passed: passed_count == self.checks.len(),
            passed_count,
            total_count: self.checks.len(),
            message: None,
            checks: self.checks,
        }
    }
}

pub struct QualityChecker {
    connections: ConnectionProvider,
    settings: QualityConfig,
}

impl QualityChecker {
    pub fn new(connections: Arc<ConnectionsConfig>, settings: QualityConfig) -> Self {
        Self::with_provider(ConnectionProvider::new(connections), settings)
    }

    pub fn with_provider(connections: ConnectionProvider, settings: QualityConfig) -> Self {
        Self {
            connections,
            settings,
        }
    }

    pub fn connections(&self) -> &ConnectionProvider {
        &self.connections
    }

    pub fn settings(&self) -> &QualityConfig {
        &self.settings
    }

    async fn pool(&self) -> Result<PgPool, CheckExecutionError> {
        Ok(self.connections.resolve(DESTINATION_CONNECTION).await?)
    }

    /// Existence check only; never creates the table
    pub async fn check_table_exists(
        &self,
        table: DestinationTable,
    ) -> Result<bool, CheckExecutionError> {
        let pool = self.pool().await?;
        let exists = catalog::table_exists(&pool, table)
            .await
            .map_err(|e| CheckExecutionError::query(format!("table_exists_{table}"), e))?;
        if !exists {
            error!(table = %table, "Required table does not exist");
        }
        Ok(exists)
    }

    pub async fn check_row_count(&self, table: DestinationTable, min_rows: i64) -> CheckResult {
        let result = match self.count_rows(table).await {
            Ok(count) => evaluate_row_count(table, count, min_rows),
            Err(e) => CheckResult::new(row_count_check_name(table), CheckKind::RowCount, table)
                .errored("checking row count", &e),
        };
        log_check_result(&result);
        result
    }

    pub async fn check_null_rate(
        &self,
        table: DestinationTable,
        column: &str,
        max_fraction: f64,
    ) -> CheckResult {
        let result = match self.count_nulls(table, column).await {
            Ok((total, nulls)) => evaluate_null_rate(table, column, total, nulls, max_fraction),
            Err(e) => CheckResult::new(null_check_name(table, column), CheckKind::NullRate, table)
                .on_column(column)
                .errored("checking null values", &e),
        };
        log_check_result(&result);
        result
    }

    pub async fn check_freshness(
        &self,
        table: DestinationTable,
        timestamp_column: &str,
        max_age: Duration,
    ) -> CheckResult {
        self.check_freshness_at(table, timestamp_column, max_age, Utc::now())
            .await
    }

    /// Freshness measured against an explicit `now`
    pub async fn check_freshness_at(
        &self,
        table: DestinationTable,
        timestamp_column: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> CheckResult {
        let result = match self.latest_timestamp(table, timestamp_column).await {
            Ok(latest) => evaluate_freshness(table, timestamp_column, latest, now, max_age),
            Err(e) => CheckResult::new(freshness_check_name(table), CheckKind::Freshness, table)
                .on_column(timestamp_column)
                .errored("checking data freshness", &e),
        };
        log_check_result(&result);
        result
    }

    /// Run the fixed battery over both destination tables
    pub async fn run_all(&self) -> Result<QualityReport, CheckExecutionError> {
        info!("Starting data quality checks");
        let mut report = ReportBuilder::new();

        let mut all_present = true;
        for table in DestinationTable::ALL {
            all_present &= self
                .check_table_exists(table)
                .await
                .inspect_err(|e| {
                    error!(table = %table, error = %e, "Table existence check failed");
                })?;
        }
        if !all_present {
            error!("Required tables do not exist");
            return Ok(report.missing_tables());
        }

        let max_age = self.settings.freshness_max_age();
        let timestamp_column = self.settings.timestamp_column.as_str();
        let null_checked: [(DestinationTable, [&str; 2]); 2] = [
            (DestinationTable::DagRuns, ["dag_id", "run_id"]),
            (DestinationTable::TaskInstances, ["task_id", "dag_id"]),
        ];

        for (table, columns) in null_checked {
            report.record(self.check_row_count(table, self.settings.min_rows).await);
            for column in columns {
                report.record(
                    self.check_null_rate(table, column, self.settings.max_null_fraction)
                        .await,
                );
            }
            report.record(self.check_freshness(table, timestamp_column, max_age).await);
        }

        let report = report.finish();
        info!(
            passed = report.passed_count,
            total = report.total_count,
            "Data quality checks completed: {}/{} passed",
            report.passed_count,
            report.total_count
        );
        Ok(report)
    }

    async fn count_rows(&self, table: DestinationTable) -> Result<i64, CheckExecutionError> {
        let pool = self.pool().await?;
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table.quoted()))
            .fetch_one(&pool)
            .await
            .map_err(|e| CheckExecutionError::query(row_count_check_name(table), e))
    }

    /// `(total, nulls)` for one column in a single scan
    async fn count_nulls(
        &self,
        table: DestinationTable,
        column: &str,
    ) -> Result<(i64, i64), CheckExecutionError> {
        let column = table.column(column)?;
        let pool = self.pool().await?;
        let sql = format!(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE {} IS NULL) FROM {}",
            quote_identifier(column),
            table.quoted()
        );
        sqlx::query_as::<_, (i64, i64)>(&sql)
            .fetch_one(&pool)
            .await
            .map_err(|e| CheckExecutionError::query(null_check_name(table, column), e))
    }

    async fn latest_timestamp(
        &self,
        table: DestinationTable,
        timestamp_column: &str,
    ) -> Result<Option<DateTime<Utc>>, CheckExecutionError> {
        let column = table.column(timestamp_column)?;
        let pool = self.pool().await?;
        let sql = format!(
            "SELECT MAX({}) FROM {}",
            quote_identifier(column),
            table.quoted()
        );
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(&sql)
            .fetch_one(&pool)
            .await
            .map_err(|e| CheckExecutionError::query(freshness_check_name(table), e))
    }
}
