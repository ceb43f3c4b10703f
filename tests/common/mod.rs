//! Shared setup for database-backed integration tests.
//!
//! The source (`dag_run`, `task_instance`, ...) and destination (`dag_runs`,
//! `task_instances`) tables have distinct names, so one isolated test database
//! plays both roles.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use airflow_observability::config::{ConnectionsConfig, PipelineConfig};
use airflow_observability::constants::{DESTINATION_CONNECTION, SOURCE_CONNECTION};
use airflow_observability::database::ConnectionProvider;
use airflow_observability::orchestration::ObservabilityPipeline;

const AIRFLOW_SOURCE: &str = include_str!("../fixtures/airflow_source.sql");

/// Execution timestamp the fixture data is seeded around
pub fn execution_ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 2, 0, 0).unwrap()
}

pub async fn seed_airflow_source(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(AIRFLOW_SOURCE).execute(pool).await?;
    Ok(())
}

/// Provider resolving both logical names to the test pool
pub fn provider(pool: &PgPool) -> ConnectionProvider {
    ConnectionProvider::new(Arc::new(ConnectionsConfig::default()))
        .with_pool(SOURCE_CONNECTION, pool.clone())
        .with_pool(DESTINATION_CONNECTION, pool.clone())
}

pub fn pipeline(pool: &PgPool, config: PipelineConfig) -> ObservabilityPipeline {
    ObservabilityPipeline::new(config).with_pools(pool.clone(), pool.clone())
}

pub async fn count_rows(pool: &PgPool, table: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
}
