//! Tag Locator
//!
//! Turns UWB range reports from a wireless tag into 3D positions, and keeps
//! the Bluetooth session to that tag alive without operator intervention.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod directory;
pub mod utils;
pub mod hardware;
pub mod connection;
pub mod api;

// Re-export commonly used types
pub use crate::core::{AnchorId, Coordinate3D, DeviceIdentity, PositionEstimate, RangeMeasurement};
pub use algorithms::{MultilaterationSolver, SolverError};
pub use processing::{DecodeError, PipelineOutcome, PositionPipeline, TelemetryParser};
pub use validation::{RangeValidator, ValidationOutcome};
pub use directory::{AnchorDirectory, DirectoryHandle, DirectoryRefresher};
pub use hardware::{LinkAdapter, LinkEvent, LinkEventKind, MockLink};
pub use connection::{ConnectionStateMachine, SessionState};
pub use api::{Command, HostCallbacks, PositionReport, SessionContext, TagEngine};
pub use utils::LocatorConfig;
