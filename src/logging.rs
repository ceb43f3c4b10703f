//! # Structured Logging Module
//!
//! Environment-aware structured logging that writes human-readable output to
//! the console and JSON lines to a per-process log file, plus structured
//! helpers for the extract, load and check phases.

use chrono::Utc;
use std::fs;
use std::process;
use std::sync::{Mutex, OnceLock};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::quality::CheckResult;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Keeps the non-blocking file writer alive until [`shutdown_structured_logging`]
static FILE_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_structured_logging(settings: &LoggingConfig, environment: &str) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let log_level = settings
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(environment).to_string());

        // stdout is reserved for command results
        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_filter(EnvFilter::new(log_level.clone()));

        let pid = process::id();
        let mut log_file = None;
        let mut guard = None;
        let file_layer = if settings.file_output && fs::create_dir_all(&settings.directory).is_ok() {
            let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
            let file_name = format!("{environment}.{pid}.{timestamp}.log");
            let appender = tracing_appender::rolling::never(&settings.directory, &file_name);
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            log_file = Some(settings.directory.join(file_name));
            guard = Some(worker_guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(log_level)),
            )
        } else {
            None
        };

        // A global subscriber may already be set by an embedding host
        if tracing_subscriber::registry()
            .with(console)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = ?log_file,
            "Structured logging initialized"
        );

        if let Ok(mut slot) = FILE_GUARD.lock() {
            *slot = guard;
        }
    });
}

/// Flush buffered file output and stop the background writer.
///
/// Call once before the process exits; later events still reach the console.
pub fn shutdown_structured_logging() {
    let guard = FILE_GUARD.lock().ok().and_then(|mut slot| slot.take());
    drop(guard);
}

/// Log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

/// Log structured data for one source read
pub fn log_extraction_operation(
    family: &str,
    window: &str,
    rows: usize,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        family = %family,
        window = %window,
        rows = rows,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "EXTRACTION_OPERATION"
    );
}

/// Log structured data for one destination write
pub fn log_load_operation(
    table: &str,
    rows: u64,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        table = %table,
        rows = rows,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "LOAD_OPERATION"
    );
}

/// Log a finished quality check; failures are warnings, execution errors are errors
pub fn log_check_result(result: &CheckResult) {
    if let Some(error) = &result.error {
        tracing::error!(
            check = %result.check_name,
            table = %result.target_table,
            column = result.target_column.as_deref(),
            error = %error,
            "✗ {}: ERROR - {}",
            result.check_name,
            result.message
        );
    } else if result.passed {
        tracing::info!(
            check = %result.check_name,
            table = %result.target_table,
            column = result.target_column.as_deref(),
            "✓ {}: PASSED - {}",
            result.check_name,
            result.message
        );
    } else {
        tracing::warn!(
            check = %result.check_name,
            table = %result.target_table,
            column = result.target_column.as_deref(),
            "✗ {}: FAILED - {}",
            result.check_name,
            result.message
        );
    }
}
