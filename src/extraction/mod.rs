//! # Extraction
//!
//! Windowed reads of run and task-instance history from the scheduler's
//! metadata database.

pub mod extractor;
pub mod queries;

pub use extractor::{ExtractionOutput, MetadataExtractor};
pub use queries::render_opaque;
