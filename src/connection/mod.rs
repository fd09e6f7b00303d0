//! Tag session lifecycle

pub mod state;
pub mod retry;
pub mod machine;

pub use state::SessionState;
pub use retry::RetryPolicy;
pub use machine::{CommandError, ConnectionStateMachine, MachineOutput, SessionCounters};
