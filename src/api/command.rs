//! Device configuration commands
//!
//! Commands are short `Key: value` strings sent as ASCII. Role assignment
//! carries the phone's clock so the tag can sync its time base.

use crate::hardware::Characteristic;
use chrono::Utc;
use std::fmt;

/// Role a tag takes in the ranging network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Mobile = 1,
    Anchor = 2,
}

/// Configuration command for the connected tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AssignRole { role: DeviceRole, timestamp_ms: i64 },
    Ranging { enabled: bool },
}

impl Command {
    /// Role assignment stamped with the current time
    pub fn assign_role(role: DeviceRole) -> Self {
        Command::AssignRole {
            role,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    pub fn ranging(enabled: bool) -> Self {
        Command::Ranging { enabled }
    }

    /// Characteristic the device listens on for this command
    pub fn characteristic(&self) -> Characteristic {
        match self {
            Command::AssignRole { .. } => Characteristic::Status,
            Command::Ranging { .. } => Characteristic::Ranging,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::AssignRole { role, timestamp_ms } => {
                write!(f, "Role: {}; Time: {}", *role as u8, timestamp_ms)
            }
            Command::Ranging { enabled: true } => f.write_str("Ranging: On"),
            Command::Ranging { enabled: false } => f.write_str("Ranging: Off"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_command_text() {
        let command = Command::AssignRole {
            role: DeviceRole::Mobile,
            timestamp_ms: 1_500_000_000_123,
        };
        assert_eq!(command.encode(), b"Role: 1; Time: 1500000000123".to_vec());
        assert_eq!(command.characteristic(), Characteristic::Status);

        let command = Command::AssignRole {
            role: DeviceRole::Anchor,
            timestamp_ms: 42,
        };
        assert_eq!(command.to_string(), "Role: 2; Time: 42");
    }

    #[test]
    fn test_ranging_command_text() {
        assert_eq!(Command::ranging(true).encode(), b"Ranging: On".to_vec());
        assert_eq!(Command::ranging(false).encode(), b"Ranging: Off".to_vec());
        assert_eq!(Command::ranging(true).characteristic(), Characteristic::Ranging);
    }

    #[test]
    fn test_assign_role_uses_current_time() {
        let before = Utc::now().timestamp_millis();
        let Command::AssignRole { timestamp_ms, .. } = Command::assign_role(DeviceRole::Mobile) else {
            panic!("expected a role command");
        };
        assert!(timestamp_ms >= before);
    }
}
