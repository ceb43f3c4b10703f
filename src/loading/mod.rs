//! # Loading
//!
//! Table materialization and chunked, transactional appends into the
//! observability store.

pub mod loader;
pub mod materializer;

pub use loader::BatchLoader;
pub use materializer::{TableMaterializer, TableSchema};
