//! Host collaborator interface
//!
//! The hosting shell receives status text, location lines, position reports
//! and forwarded payloads through [`HostCallbacks`]. Only `on_status` and
//! `on_location` are required; the rest default to no-ops.

use crate::api::types::PositionReport;
use crate::connection::SessionState;
use crate::hardware::LinkError;
use std::sync::{Arc, Mutex, MutexGuard};

/// Completion for a single command write
pub type WriteCallback = Box<dyn FnOnce(Result<(), LinkError>) + Send>;

/// Sink for everything the engine reports to the hosting shell
pub trait HostCallbacks: Send {
    /// Human-readable progress and error text
    fn on_status(&mut self, message: &str);

    /// Location line for the UI
    fn on_location(&mut self, text: &str);

    /// Solved position for the remote telemetry sink
    fn on_position(&mut self, _report: &PositionReport) {}

    /// Payload with a reason code other than a range report
    fn on_forwarded_payload(&mut self, _reason_code: u8, _payload: &[u8]) {}

    fn on_state_changed(&mut self, _from: SessionState, _to: SessionState) {}
}

/// Everything a [`RecordingCallbacks`] has seen
#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub statuses: Vec<String>,
    pub locations: Vec<String>,
    pub positions: Vec<PositionReport>,
    pub forwarded: Vec<(u8, Vec<u8>)>,
    pub transitions: Vec<(SessionState, SessionState)>,
}

/// Callbacks that record what they receive.
///
/// Clones share the record, so a caller can keep a handle after giving one
/// to the engine.
#[derive(Debug, Clone, Default)]
pub struct RecordingCallbacks {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> Recorded {
        self.lock().clone()
    }

    pub fn last_location(&self) -> Option<String> {
        self.lock().locations.last().cloned()
    }

    pub fn last_status(&self) -> Option<String> {
        self.lock().statuses.last().cloned()
    }
}

impl HostCallbacks for RecordingCallbacks {
    fn on_status(&mut self, message: &str) {
        self.lock().statuses.push(message.to_string());
    }

    fn on_location(&mut self, text: &str) {
        self.lock().locations.push(text.to_string());
    }

    fn on_position(&mut self, report: &PositionReport) {
        self.lock().positions.push(report.clone());
    }

    fn on_forwarded_payload(&mut self, reason_code: u8, payload: &[u8]) {
        self.lock().forwarded.push((reason_code, payload.to_vec()));
    }

    fn on_state_changed(&mut self, from: SessionState, to: SessionState) {
        self.lock().transitions.push((from, to));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_is_shared_between_clones() {
        let handle = RecordingCallbacks::new();
        let mut callbacks: Box<dyn HostCallbacks> = Box::new(handle.clone());

        callbacks.on_status("Scanning");
        callbacks.on_location("X: 0.00; Y: 0.00; Z: 0.00");
        callbacks.on_forwarded_payload(2, &[2, 1]);
        callbacks.on_state_changed(SessionState::Idle, SessionState::Scanning);

        let recorded = handle.snapshot();
        assert_eq!(recorded.statuses, vec!["Scanning".to_string()]);
        assert_eq!(recorded.forwarded, vec![(2, vec![2, 1])]);
        assert_eq!(recorded.transitions.len(), 1);
        assert_eq!(handle.last_location().as_deref(), Some("X: 0.00; Y: 0.00; Z: 0.00"));
    }
}
