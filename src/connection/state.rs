//! Session lifecycle states

use std::fmt;

/// Lifecycle state of the single tag session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Not started, or waiting for the adapter check
    Idle,
    Scanning,
    Connecting,
    /// Link up; subscription is issued immediately
    Connected,
    Subscribing,
    /// Listening for notifications
    Subscribed,
    /// A read of the location characteristic is outstanding
    AwaitingRead,
    Disconnecting,
    /// Clean end of a session; `start` begins a new one
    Disconnected,
    /// Too many consecutive failures; needs an explicit restart
    Faulted,
}

impl SessionState {
    /// True while a link to the peripheral is established
    pub fn is_link_up(&self) -> bool {
        matches!(
            self,
            SessionState::Connected
                | SessionState::Subscribing
                | SessionState::Subscribed
                | SessionState::AwaitingRead
        )
    }

    /// True when `start` may begin a new session
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Disconnected | SessionState::Faulted
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
