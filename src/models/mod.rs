//! # Data Model
//!
//! Extraction window, the two extracted record families and the tabular batch
//! representation they are loaded through.

pub mod batch;
pub mod dag_run;
pub mod task_instance;
pub mod window;

pub use batch::{ColumnKind, RecordBatch, TabularRecord, Value};
pub use dag_run::DagRunRecord;
pub use task_instance::TaskInstanceRecord;
pub use window::ExtractionWindow;
