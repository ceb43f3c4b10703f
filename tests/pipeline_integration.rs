//! End-to-end extract, load and check runs against a seeded scheduler schema.
//!
//! Requires: PostgreSQL reachable through DATABASE_URL
//! Enable with: --features test-database

#![cfg(feature = "test-database")]

mod common;

use chrono::Duration;
use sqlx::PgPool;

use airflow_observability::config::{PipelineConfig, QualityConfig};
use airflow_observability::models::ExtractionWindow;
use airflow_observability::quality::{CheckKind, QualityReport};
use airflow_observability::PipelineError;

use common::{count_rows, execution_ts, pipeline, seed_airflow_source};

#[sqlx::test(migrations = false)]
async fn test_extract_and_load_counts_only_rows_inside_the_window(
    pool: PgPool,
) -> anyhow::Result<()> {
    seed_airflow_source(&pool).await?;
    let pipeline = pipeline(&pool, PipelineConfig::default());

    let summary = pipeline.extract_metadata_task(execution_ts()).await?;

    assert_eq!(summary.dag_runs_count, 3);
    assert_eq!(summary.task_instances_count, 5);
    assert_eq!(
        summary.window,
        ExtractionWindow::trailing(execution_ts(), Duration::hours(24))
    );
    assert_eq!(count_rows(&pool, "dag_runs").await?, 3);
    assert_eq!(count_rows(&pool, "task_instances").await?, 5);

    let extraction_ids: Vec<uuid::Uuid> = sqlx::query_scalar(
        "SELECT DISTINCT extraction_id FROM dag_runs \
         UNION SELECT DISTINCT extraction_id FROM task_instances",
    )
    .fetch_all(&pool)
    .await?;
    assert_eq!(extraction_ids, vec![summary.extraction_id]);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_window_bounds_are_inclusive(pool: PgPool) -> anyhow::Result<()> {
    seed_airflow_source(&pool).await?;
    let pipeline = pipeline(&pool, PipelineConfig::default());
    pipeline.extract_metadata_task(execution_ts()).await?;

    let run_ids: Vec<String> =
        sqlx::query_scalar("SELECT run_id FROM dag_runs ORDER BY execution_date")
            .fetch_all(&pool)
            .await?;
    assert_eq!(
        run_ids,
        vec![
            "scheduled__2024-06-14T02:00:00+00:00",
            "manual__2024-06-14T15:30:00+00:00",
            "scheduled__2024-06-15T02:00:00+00:00",
        ]
    );
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_opaque_and_joined_fields_are_preserved(pool: PgPool) -> anyhow::Result<()> {
    seed_airflow_source(&pool).await?;
    let pipeline = pipeline(&pool, PipelineConfig::default());
    pipeline.extract_metadata_task(execution_ts()).await?;

    let (conf, note): (Option<String>, Option<String>) = sqlx::query_as(
        "SELECT conf, run_note FROM dag_runs WHERE run_id = 'manual__2024-06-14T15:30:00+00:00'",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(conf.as_deref(), Some("\\x80049500"));
    assert_eq!(
        note.as_deref(),
        Some("Upstream API returned 503, rerun scheduled")
    );

    let conf: Option<String> = sqlx::query_scalar(
        "SELECT conf FROM dag_runs WHERE run_id = 'scheduled__2024-06-15T02:00:00+00:00'",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(conf.as_deref(), Some(r#"{"full_refresh": true}"#));

    let rendered: Option<String> = sqlx::query_scalar(
        "SELECT rendered_fields FROM task_instances \
         WHERE task_id = 'extract' AND run_id = 'scheduled__2024-06-14T02:00:00+00:00'",
    )
    .fetch_one(&pool)
    .await?;
    assert!(rendered.unwrap_or_default().contains("orders"));

    let (map_index, duration, end_date): (i64, Option<f64>, Option<chrono::DateTime<chrono::Utc>>) =
        sqlx::query_as(
            "SELECT map_index, duration, end_date FROM task_instances WHERE task_id = 'publish'",
        )
        .fetch_one(&pool)
        .await?;
    assert_eq!(map_index, 0);
    assert!(duration.is_none());
    assert!(end_date.is_none());
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_quality_checks_pass_after_load(pool: PgPool) -> anyhow::Result<()> {
    seed_airflow_source(&pool).await?;
    let pipeline = pipeline(&pool, PipelineConfig::default());

    let outcome = pipeline.run(execution_ts()).await?;

    assert_eq!(outcome.extraction.dag_runs_count, 3);
    assert!(outcome.quality.all_passed, "{:?}", outcome.quality.checks);
    assert_eq!(outcome.quality.total_count, 8);
    assert_eq!(outcome.quality.passed_count, 8);
    assert!(outcome.quality.message.is_none());

    let names: Vec<&str> = outcome
        .quality
        .checks
        .iter()
        .map(|c| c.check_name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "row_count_dag_runs",
            "null_check_dag_runs_dag_id",
            "null_check_dag_runs_run_id",
            "freshness_check_dag_runs",
            "row_count_task_instances",
            "null_check_task_instances_task_id",
            "null_check_task_instances_dag_id",
            "freshness_check_task_instances",
        ]
    );
    Ok(())
}

/// Reports with freshness measurements removed, which drift with the clock
fn without_freshness(report: &QualityReport) -> QualityReport {
    let mut report = report.clone();
    for check in &mut report.checks {
        if check.check_kind == CheckKind::Freshness {
            check.measured_value = None;
            check.message.clear();
        }
    }
    report
}

#[sqlx::test(migrations = false)]
async fn test_rerunning_checks_on_unchanged_destination_is_stable(
    pool: PgPool,
) -> anyhow::Result<()> {
    seed_airflow_source(&pool).await?;
    let pipeline = pipeline(&pool, PipelineConfig::default());
    pipeline.extract_metadata_task(execution_ts()).await?;

    let first = pipeline.run_all_checks().await?;
    let second = pipeline.run_all_checks().await?;

    assert_eq!(first.checks.len(), second.checks.len());
    assert_eq!(without_freshness(&first), without_freshness(&second));
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_missing_destination_tables_report_without_error(
    pool: PgPool,
) -> anyhow::Result<()> {
    let pipeline = pipeline(&pool, PipelineConfig::default());

    let report = pipeline.run_quality_checks_task(None).await?;

    assert!(!report.all_passed);
    assert_eq!(report.message.as_deref(), Some("Required tables missing"));
    assert!(report.checks.is_empty());
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_fatal_quality_gate_fails_the_task(pool: PgPool) -> anyhow::Result<()> {
    let config = PipelineConfig {
        quality: QualityConfig {
            fail_on_check_failure: true,
            ..QualityConfig::default()
        },
        ..PipelineConfig::default()
    };
    let pipeline = pipeline(&pool, config);

    let err = pipeline.run_quality_checks_task(None).await.unwrap_err();
    assert!(matches!(err, PipelineError::QualityGate { .. }));
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_retried_window_appends_a_second_attributable_batch(
    pool: PgPool,
) -> anyhow::Result<()> {
    seed_airflow_source(&pool).await?;
    let pipeline = pipeline(&pool, PipelineConfig::default());

    let first = pipeline.extract_metadata_task(execution_ts()).await?;
    let second = pipeline.extract_metadata_task(execution_ts()).await?;

    assert_ne!(first.extraction_id, second.extraction_id);
    assert_eq!(count_rows(&pool, "dag_runs").await?, 6);

    let per_batch: Vec<(uuid::Uuid, i64)> = sqlx::query_as(
        "SELECT extraction_id, COUNT(*) FROM task_instances GROUP BY extraction_id",
    )
    .fetch_all(&pool)
    .await?;
    assert_eq!(per_batch.len(), 2);
    assert!(per_batch.iter().all(|(_, n)| *n == 5));
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_unbounded_window_reads_everything(pool: PgPool) -> anyhow::Result<()> {
    seed_airflow_source(&pool).await?;
    let pipeline = pipeline(&pool, PipelineConfig::default());

    let summary = pipeline
        .extract_and_load(ExtractionWindow::unbounded())
        .await?;

    assert_eq!(summary.dag_runs_count, 5);
    assert_eq!(summary.task_instances_count, 7);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_window_with_no_runs_loads_nothing(pool: PgPool) -> anyhow::Result<()> {
    seed_airflow_source(&pool).await?;
    let pipeline = pipeline(&pool, PipelineConfig::default());

    let summary = pipeline
        .extract_metadata_task(execution_ts() + Duration::days(30))
        .await?;

    assert_eq!(summary.dag_runs_count, 0);
    assert_eq!(summary.task_instances_count, 0);
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = 'dag_runs')",
    )
    .fetch_one(&pool)
    .await?;
    assert!(!exists, "an empty batch must not create the table");
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_missing_source_schema_is_a_source_read_error(pool: PgPool) -> anyhow::Result<()> {
    let pipeline = pipeline(&pool, PipelineConfig::default());

    let err = pipeline
        .extract_metadata_task(execution_ts())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::SourceRead(_)), "{err:?}");
    assert!(err.is_fatal());
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn test_connection_health_check_answers_for_both_connections(
    pool: PgPool,
) -> anyhow::Result<()> {
    let pipeline = pipeline(&pool, PipelineConfig::default());

    let health = pipeline.check_connections().await?;

    assert!(health.source);
    assert!(health.destination);
    assert!(!pool.is_closed());
    Ok(())
}
