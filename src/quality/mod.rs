//! # Data Quality
//!
//! The post-load check battery and the declarative rule suites exported for an
//! external validation engine.

pub mod checker;
pub mod suites;

pub use checker::{
    CheckKind, CheckResult, MetricValue, QualityChecker, QualityReport, ReportBuilder,
};
pub use suites::{dag_runs_suite, export_suites, task_instances_suite, ExpectationSuite};
