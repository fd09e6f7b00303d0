//! Telemetry decoding and the position pipeline

pub mod parser;
pub mod pipeline;

pub use parser::{DecodeError, Telemetry, TelemetryParser};
pub use pipeline::{PipelineOutcome, PositionPipeline};
