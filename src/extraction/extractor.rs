//! # Metadata Extractor
//!
//! Reads run-level and task-level history from the scheduler's metadata store
//! for one window and shapes it into [`RecordBatch`]es.
//!
//! The two families are read concurrently on separate pooled connections. Any
//! read error aborts the whole extraction; no partial result is returned.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::queries::{DagRunRow, TaskInstanceRow, DAG_RUNS_QUERY, TASK_INSTANCES_QUERY};
use crate::config::{ConnectionsConfig, ExtractionConfig};
use crate::constants::{LifecycleState, SOURCE_CONNECTION};
use crate::database::ConnectionProvider;
use crate::error::{PipelineResult, SourceReadError};
use crate::logging::log_extraction_operation;
use crate::models::{DagRunRecord, ExtractionWindow, RecordBatch, TaskInstanceRecord};

const DAG_RUN_FAMILY: &str = "dag_run";
const TASK_INSTANCE_FAMILY: &str = "task_instance";

/// Both record families from one extraction invocation
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    pub extraction_id: Uuid,
    pub window: ExtractionWindow,
    pub dag_runs: RecordBatch,
    pub task_instances: RecordBatch,
}

pub struct MetadataExtractor {
    connections: ConnectionProvider,
    allowed_clock_skew: Duration,
}

impl MetadataExtractor {
    pub fn new(connections: Arc<ConnectionsConfig>, settings: &ExtractionConfig) -> Self {
        Self::with_provider(ConnectionProvider::new(connections), settings)
    }

    pub fn with_provider(connections: ConnectionProvider, settings: &ExtractionConfig) -> Self {
        Self {
            connections,
            allowed_clock_skew: settings.allowed_clock_skew(),
        }
    }

    pub fn connections(&self) -> &ConnectionProvider {
        &self.connections
    }

    /// Extract both families for `window` under one fresh extraction id
    pub async fn extract(&self, window: ExtractionWindow) -> PipelineResult<ExtractionOutput> {
        let extraction_id = Uuid::new_v4();
        info!(
            extraction_id = %extraction_id,
            window = %window,
            "Extracting scheduler metadata"
        );

        let pool = self.connections.resolve(SOURCE_CONNECTION).await?;

        let (dag_runs, task_instances) = tokio::try_join!(
            self.read_dag_runs(&pool, window, extraction_id),
            self.read_task_instances(&pool, window, extraction_id),
        )?;

        let (dag_runs, dag_runs_at) = dag_runs;
        let (task_instances, task_instances_at) = task_instances;

        Ok(ExtractionOutput {
            extraction_id,
            window,
            dag_runs: RecordBatch::from_records(&dag_runs, extraction_id, dag_runs_at),
            task_instances: RecordBatch::from_records(
                &task_instances,
                extraction_id,
                task_instances_at,
            ),
        })
    }

    /// Extract run records only
    pub async fn extract_dag_runs(
        &self,
        window: ExtractionWindow,
    ) -> PipelineResult<Vec<DagRunRecord>> {
        let pool = self.connections.resolve(SOURCE_CONNECTION).await?;
        let (records, _) = self
            .read_dag_runs(&pool, window, Uuid::new_v4())
            .await?;
        Ok(records)
    }

    /// Extract task instance records only
    pub async fn extract_task_instances(
        &self,
        window: ExtractionWindow,
    ) -> PipelineResult<Vec<TaskInstanceRecord>> {
        let pool = self.connections.resolve(SOURCE_CONNECTION).await?;
        let (records, _) = self
            .read_task_instances(&pool, window, Uuid::new_v4())
            .await?;
        Ok(records)
    }

    async fn read_dag_runs(
        &self,
        pool: &PgPool,
        window: ExtractionWindow,
        extraction_id: Uuid,
    ) -> Result<(Vec<DagRunRecord>, DateTime<Utc>), SourceReadError> {
        let rows = sqlx::query_as::<_, DagRunRow>(DAG_RUNS_QUERY)
            .bind(window.start())
            .bind(window.end())
            .fetch_all(pool)
            .await
            .map_err(|e| read_failed(DAG_RUN_FAMILY, &window, e))?;
        let extracted_at = Utc::now();
        self.check_clock_skew(&window, extracted_at)?;

        let records: Vec<DagRunRecord> = rows
            .into_iter()
            .map(|row| row.into_record(extracted_at, extraction_id))
            .collect();
        for record in &records {
            warn_unknown_state(DAG_RUN_FAMILY, record.state.as_deref(), &record.run_id);
        }

        log_extraction_operation(
            DAG_RUN_FAMILY,
            &window.to_string(),
            records.len(),
            "extracted",
            None,
        );
        Ok((records, extracted_at))
    }

    async fn read_task_instances(
        &self,
        pool: &PgPool,
        window: ExtractionWindow,
        extraction_id: Uuid,
    ) -> Result<(Vec<TaskInstanceRecord>, DateTime<Utc>), SourceReadError> {
        let rows = sqlx::query_as::<_, TaskInstanceRow>(TASK_INSTANCES_QUERY)
            .bind(window.start())
            .bind(window.end())
            .fetch_all(pool)
            .await
            .map_err(|e| read_failed(TASK_INSTANCE_FAMILY, &window, e))?;
        let extracted_at = Utc::now();
        self.check_clock_skew(&window, extracted_at)?;

        let records: Vec<TaskInstanceRecord> = rows
            .into_iter()
            .map(|row| row.into_record(extracted_at, extraction_id))
            .collect();
        for record in &records {
            warn_unknown_state(TASK_INSTANCE_FAMILY, record.state.as_deref(), &record.task_id);
        }

        log_extraction_operation(
            TASK_INSTANCE_FAMILY,
            &window.to_string(),
            records.len(),
            "extracted",
            None,
        );
        Ok((records, extracted_at))
    }

    /// `extracted_at` must not precede the window start by more than the allowed skew
    fn check_clock_skew(
        &self,
        window: &ExtractionWindow,
        extracted_at: DateTime<Utc>,
    ) -> Result<(), SourceReadError> {
        let Some(window_start) = window.start() else {
            return Ok(());
        };
        if extracted_at < window_start - self.allowed_clock_skew {
            error!(
                window = %window,
                extracted_at = %extracted_at,
                "Extraction timestamp precedes window start"
            );
            return Err(SourceReadError::ClockSkew {
                extracted_at,
                window_start,
                allowed_skew_seconds: self.allowed_clock_skew.num_seconds(),
            });
        }
        Ok(())
    }
}

fn read_failed(family: &'static str, window: &ExtractionWindow, source: sqlx::Error) -> SourceReadError {
    error!(family = family, window = %window, error = %source, "Error extracting metadata");
    SourceReadError::query(family, source)
}

fn warn_unknown_state(family: &str, state: Option<&str>, id: &str) {
    if let Some(state) = state {
        if state.parse::<LifecycleState>().is_err() {
            warn!(family = family, id = id, state = state, "Unrecognized lifecycle state");
        }
    }
}
