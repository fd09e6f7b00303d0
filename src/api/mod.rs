//! Host-facing API
//!
//! [`TagEngine`] ties the connection state machine to the position pipeline
//! and reports to the hosting shell through [`HostCallbacks`].

pub mod callback;
pub mod command;
pub mod engine;
pub mod types;

pub use callback::{HostCallbacks, Recorded, RecordingCallbacks, WriteCallback};
pub use command::{Command, DeviceRole};
pub use engine::{EngineHandle, EngineRequest, TagEngine};
pub use types::{format_location, PositionReport, ReportMeta, SessionContext};
