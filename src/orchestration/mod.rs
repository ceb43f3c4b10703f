//! # Orchestration
//!
//! Invocation-level entry points the external scheduler calls: extract-and-load
//! for a window, the quality battery, and a full run of both.

pub mod pipeline;

pub use pipeline::{
    ConnectionHealth, ExtractionSummary, ObservabilityPipeline, PipelineRunOutcome,
};
