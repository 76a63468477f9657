//! Audit subsystem: the two-stage admission pipeline.

pub mod pipeline;

pub use pipeline::{AuditPipeline, AuditRequest, PipelineConfig, PipelineError};
