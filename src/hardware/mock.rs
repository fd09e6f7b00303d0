//! Mock link adapter for testing and development

use crate::hardware::{Characteristic, Epoch, LinkAdapter, LinkEvent, LinkEventKind};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;

/// An operation the state machine asked the link to perform
#[derive(Debug, Clone, PartialEq)]
pub enum IssuedOp {
    AdapterCheck { epoch: Epoch },
    StartScan { epoch: Epoch },
    StopScan,
    Connect { device_id: String, epoch: Epoch },
    Disconnect { device_id: String, epoch: Epoch },
    StartNotification { device_id: String, characteristic: Characteristic, epoch: Epoch },
    Read { device_id: String, characteristic: Characteristic, epoch: Epoch },
    Write { device_id: String, characteristic: Characteristic, data: Vec<u8>, epoch: Epoch },
}

struct AutoReply {
    events: UnboundedSender<LinkEvent>,
    advertised_id: String,
}

#[derive(Default)]
struct MockState {
    issued: Vec<IssuedOp>,
    read_payloads: VecDeque<Vec<u8>>,
    auto_reply: Option<AutoReply>,
    /// Epoch of the active subscription, used for simulated notifications
    subscription: Option<Epoch>,
}

/// Mock link that records every issued operation.
///
/// Clones share state, so a test can keep one handle while the state machine
/// owns the other. In auto-reply mode every operation completes successfully
/// and the completion is pushed onto the given channel.
#[derive(Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    /// Create a recording-only mock; completions are delivered by the test
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that answers every operation as a healthy tag would
    pub fn with_auto_reply(events: UnboundedSender<LinkEvent>, advertised_id: impl Into<String>) -> Self {
        let link = Self::new();
        link.lock().auto_reply = Some(AutoReply {
            events,
            advertised_id: advertised_id.into(),
        });
        link
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get all operations issued so far
    pub fn issued(&self) -> Vec<IssuedOp> {
        self.lock().issued.clone()
    }

    /// Most recently issued operation
    pub fn last_issued(&self) -> Option<IssuedOp> {
        self.lock().issued.last().cloned()
    }

    /// Clear the issued operation history
    pub fn clear_issued(&self) {
        self.lock().issued.clear();
    }

    /// Queue a payload to be returned by the next auto-replied read
    pub fn queue_read_payload(&self, data: Vec<u8>) {
        self.lock().read_payloads.push_back(data);
    }

    /// Simulate the tag signalling new range data.
    ///
    /// Returns false when there is no subscription to notify on.
    pub fn notify(&self) -> bool {
        let state = self.lock();
        match (state.subscription, &state.auto_reply) {
            (Some(epoch), Some(auto)) => auto
                .events
                .send(LinkEvent::new(epoch, LinkEventKind::Notification))
                .is_ok(),
            _ => false,
        }
    }

    /// Simulate the peripheral dropping the link
    pub fn drop_link(&self, reason: &str) -> bool {
        let mut state = self.lock();
        let Some(epoch) = state.subscription.take() else {
            return false;
        };
        match &state.auto_reply {
            Some(auto) => auto
                .events
                .send(LinkEvent::new(epoch, LinkEventKind::LinkLost { reason: reason.to_string() }))
                .is_ok(),
            None => false,
        }
    }

    fn record(&self, op: IssuedOp) {
        let mut state = self.lock();
        let reply = match &op {
            IssuedOp::AdapterCheck { epoch } => Some((*epoch, LinkEventKind::AdapterState { enabled: true })),
            IssuedOp::StartScan { epoch } => state.auto_reply.as_ref().map(|auto| {
                (
                    *epoch,
                    LinkEventKind::DeviceDiscovered {
                        device_id: auto.advertised_id.clone(),
                    },
                )
            }),
            IssuedOp::StopScan => None,
            IssuedOp::Connect { epoch, .. } => Some((*epoch, LinkEventKind::Connected)),
            IssuedOp::Disconnect { epoch, .. } => {
                state.subscription = None;
                Some((*epoch, LinkEventKind::Disconnected))
            }
            IssuedOp::StartNotification { epoch, .. } => {
                state.subscription = Some(*epoch);
                Some((*epoch, LinkEventKind::Subscribed))
            }
            IssuedOp::Read { epoch, .. } => Some(match state.read_payloads.pop_front() {
                Some(data) => (*epoch, LinkEventKind::ReadCompleted { data }),
                None => (
                    *epoch,
                    LinkEventKind::ReadFailed {
                        reason: "no data queued".to_string(),
                    },
                ),
            }),
            IssuedOp::Write { epoch, .. } => Some((*epoch, LinkEventKind::WriteCompleted)),
        };

        if let (Some(auto), Some((epoch, kind))) = (&state.auto_reply, reply) {
            let _ = auto.events.send(LinkEvent::new(epoch, kind));
        }
        state.issued.push(op);
    }
}

impl LinkAdapter for MockLink {
    fn is_adapter_enabled(&mut self, epoch: Epoch) {
        self.record(IssuedOp::AdapterCheck { epoch });
    }

    fn start_scan(&mut self, epoch: Epoch) {
        self.record(IssuedOp::StartScan { epoch });
    }

    fn stop_scan(&mut self) {
        self.record(IssuedOp::StopScan);
    }

    fn connect(&mut self, device_id: &str, epoch: Epoch) {
        self.record(IssuedOp::Connect {
            device_id: device_id.to_string(),
            epoch,
        });
    }

    fn disconnect(&mut self, device_id: &str, epoch: Epoch) {
        self.record(IssuedOp::Disconnect {
            device_id: device_id.to_string(),
            epoch,
        });
    }

    fn start_notification(&mut self, device_id: &str, characteristic: Characteristic, epoch: Epoch) {
        self.record(IssuedOp::StartNotification {
            device_id: device_id.to_string(),
            characteristic,
            epoch,
        });
    }

    fn read(&mut self, device_id: &str, characteristic: Characteristic, epoch: Epoch) {
        self.record(IssuedOp::Read {
            device_id: device_id.to_string(),
            characteristic,
            epoch,
        });
    }

    fn write(&mut self, device_id: &str, characteristic: Characteristic, data: &[u8], epoch: Epoch) {
        self.record(IssuedOp::Write {
            device_id: device_id.to_string(),
            characteristic,
            data: data.to_vec(),
            epoch,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_records_operations() {
        let handle = MockLink::new();
        let mut link = handle.clone();

        link.start_scan(1);
        link.stop_scan();
        link.connect("tag", 2);
        link.write("tag", Characteristic::Ranging, b"Ranging: On", 2);

        let issued = handle.issued();
        assert_eq!(issued.len(), 4);
        assert_eq!(issued[0], IssuedOp::StartScan { epoch: 1 });
        assert_eq!(issued[1], IssuedOp::StopScan);
        assert!(matches!(
            handle.last_issued(),
            Some(IssuedOp::Write { characteristic: Characteristic::Ranging, epoch: 2, .. })
        ));

        handle.clear_issued();
        assert!(handle.issued().is_empty());
    }

    #[test]
    fn test_recording_mock_sends_nothing() {
        let link = MockLink::new();
        assert!(!link.notify());
        assert!(!link.drop_link("gone"));
    }

    #[test]
    fn test_auto_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = MockLink::with_auto_reply(tx, "tag-1");
        let mut link = handle.clone();

        link.start_scan(4);
        assert_eq!(
            rx.try_recv().unwrap(),
            LinkEvent::new(4, LinkEventKind::DeviceDiscovered { device_id: "tag-1".to_string() })
        );

        link.start_notification("tag-1", Characteristic::Location, 5);
        assert_eq!(rx.try_recv().unwrap().kind, LinkEventKind::Subscribed);

        assert!(handle.notify());
        assert_eq!(rx.try_recv().unwrap(), LinkEvent::new(5, LinkEventKind::Notification));

        handle.queue_read_payload(vec![1, 0]);
        link.read("tag-1", Characteristic::Location, 5);
        assert_eq!(
            rx.try_recv().unwrap().kind,
            LinkEventKind::ReadCompleted { data: vec![1, 0] }
        );

        link.read("tag-1", Characteristic::Location, 5);
        assert!(matches!(rx.try_recv().unwrap().kind, LinkEventKind::ReadFailed { .. }));

        assert!(handle.drop_link("out of range"));
        assert!(matches!(rx.try_recv().unwrap().kind, LinkEventKind::LinkLost { .. }));
        assert!(!handle.notify());
    }
}
