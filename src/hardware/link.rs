//! Link adapter trait and completion events

use crate::core::{
    CALIBRATION_CHAR_UUID, LOCATION_CHAR_UUID, RANGING_CHAR_UUID, SERVICE_UUID, STATUS_CHAR_UUID,
};
use std::fmt;

/// Session generation; completions from older generations are discarded
pub type Epoch = u64;

/// GATT characteristics exposed by the tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Range reports (notify + read)
    Location,
    /// Ranging on/off toggles
    Ranging,
    /// Role assignment and time sync
    Status,
    Calibration,
}

impl Characteristic {
    pub fn uuid(&self) -> &'static str {
        match self {
            Characteristic::Location => LOCATION_CHAR_UUID,
            Characteristic::Ranging => RANGING_CHAR_UUID,
            Characteristic::Status => STATUS_CHAR_UUID,
            Characteristic::Calibration => CALIBRATION_CHAR_UUID,
        }
    }

    /// Service all tag characteristics belong to
    pub fn service_uuid(&self) -> &'static str {
        SERVICE_UUID
    }
}

/// Kinds of radio operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkOp {
    AdapterCheck,
    Scan,
    Connect,
    Subscribe,
    Read,
    Write,
    Disconnect,
}

impl fmt::Display for LinkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkOp::AdapterCheck => "adapter check",
            LinkOp::Scan => "scan",
            LinkOp::Connect => "connect",
            LinkOp::Subscribe => "subscribe",
            LinkOp::Read => "read",
            LinkOp::Write => "write",
            LinkOp::Disconnect => "disconnect",
        };
        f.write_str(name)
    }
}

/// Operations the hosting shell provides.
///
/// Every method only starts the operation. The outcome arrives later as a
/// [`LinkEvent`] carrying the `epoch` passed here. `stop_scan` has no
/// completion.
pub trait LinkAdapter: Send {
    fn is_adapter_enabled(&mut self, epoch: Epoch);

    fn start_scan(&mut self, epoch: Epoch);

    fn stop_scan(&mut self);

    fn connect(&mut self, device_id: &str, epoch: Epoch);

    fn disconnect(&mut self, device_id: &str, epoch: Epoch);

    fn start_notification(&mut self, device_id: &str, characteristic: Characteristic, epoch: Epoch);

    fn read(&mut self, device_id: &str, characteristic: Characteristic, epoch: Epoch);

    fn write(&mut self, device_id: &str, characteristic: Characteristic, data: &[u8], epoch: Epoch);
}

/// What happened on the link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEventKind {
    AdapterState { enabled: bool },
    DeviceDiscovered { device_id: String },
    ScanFailed { reason: String },
    Connected,
    ConnectFailed { reason: String },
    Subscribed,
    SubscribeFailed { reason: String },
    /// The location characteristic changed
    Notification,
    ReadCompleted { data: Vec<u8> },
    ReadFailed { reason: String },
    WriteCompleted,
    WriteFailed { reason: String },
    Disconnected,
    DisconnectFailed { reason: String },
    /// The peripheral dropped the link without being asked to
    LinkLost { reason: String },
}

/// A completion or unsolicited link event
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEvent {
    pub epoch: Epoch,
    pub kind: LinkEventKind,
}

impl LinkEvent {
    pub fn new(epoch: Epoch, kind: LinkEventKind) -> Self {
        Self { epoch, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_characteristics_share_the_service_prefix() {
        for characteristic in [
            Characteristic::Location,
            Characteristic::Ranging,
            Characteristic::Status,
            Characteristic::Calibration,
        ] {
            assert_eq!(&characteristic.uuid()[8..], &characteristic.service_uuid()[8..]);
            assert_ne!(characteristic.uuid(), characteristic.service_uuid());
        }
        assert!(Characteristic::Ranging.uuid().starts_with("d68c3154"));
        assert_eq!(LinkOp::AdapterCheck.to_string(), "adapter check");
    }
}
