//! Connection lifecycle state machine
//!
//! Drives one tag session through scan, connect, subscribe and read. The
//! machine is synchronous: the driver feeds it [`LinkEvent`]s and the current
//! time, and calls [`ConnectionStateMachine::poll`] when the deadline from
//! [`ConnectionStateMachine::next_deadline`] passes. Every call returns the
//! [`MachineOutput`]s it produced.

use crate::connection::{RetryPolicy, SessionState};
use crate::core::DeviceIdentity;
use crate::hardware::{
    Characteristic, Epoch, LinkAdapter, LinkError, LinkErrorKind, LinkEvent, LinkEventKind, LinkOp,
    RecoveryStrategy,
};
use crate::utils::config::RetryConfig;
use log::{debug, info, warn};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Something the driver has to act on
#[derive(Debug, Clone, PartialEq)]
pub enum MachineOutput {
    StateChanged { from: SessionState, to: SessionState },
    /// Human-readable progress for the operator
    Status(String),
    /// Location characteristic contents from a completed read
    Payload(Vec<u8>),
    /// Outcome of the outstanding write
    WriteFinished(Result<(), LinkError>),
    /// Retry bound reached; the session stays down until restarted
    Faulted { last_error: LinkError },
}

/// Rejected write requests
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("no link to the device (state {state})")]
    NotConnected { state: SessionState },
    #[error("another write is still in flight")]
    WriteInProgress,
}

/// Per-session failure bookkeeping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionCounters {
    /// Failures where the peripheral was no longer known to the stack
    pub not_found: u32,
    /// Unsolicited link losses
    pub link_drops: u32,
    pub transient_failures: u32,
    pub read_failures: u32,
    pub payloads: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryTarget {
    Scan,
    Connect,
    Subscribe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeadlineKind {
    ScanTimeout,
    ConnectTimeout,
    Retry(RetryTarget),
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    kind: DeadlineKind,
}

/// Lifecycle of the single session to the target tag
pub struct ConnectionStateMachine<L: LinkAdapter> {
    link: L,
    target: DeviceIdentity,
    state: SessionState,
    epoch: Epoch,
    retry: RetryPolicy,
    scan_timeout: Duration,
    connect_timeout: Duration,
    deadline: Option<Deadline>,
    adapter_check_pending: bool,
    /// A notification arrived while a read was outstanding
    notification_pending: bool,
    write_in_flight: bool,
    counters: SessionCounters,
    outputs: Vec<MachineOutput>,
}

impl<L: LinkAdapter> ConnectionStateMachine<L> {
    pub fn new(link: L, target: DeviceIdentity, config: &RetryConfig) -> Self {
        Self {
            link,
            target,
            state: SessionState::Idle,
            epoch: 0,
            retry: RetryPolicy::from_config(config),
            scan_timeout: config.scan_timeout(),
            connect_timeout: config.connect_timeout(),
            deadline: None,
            adapter_check_pending: false,
            notification_pending: false,
            write_in_flight: false,
            counters: SessionCounters::default(),
            outputs: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Epoch that completions must carry to be accepted
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn target(&self) -> &DeviceIdentity {
        &self.target
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.retry.consecutive_failures()
    }

    /// When `poll` next has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline.map(|deadline| deadline.at)
    }

    pub fn is_write_in_flight(&self) -> bool {
        self.write_in_flight
    }

    /// Begin a new session with an adapter check
    pub fn start(&mut self) -> Vec<MachineOutput> {
        if !self.state.can_start() {
            debug!("Ignoring start while {}", self.state);
            return self.drain();
        }

        self.advance_epoch();
        self.retry.record_success();
        self.deadline = None;
        self.notification_pending = false;
        if self.state != SessionState::Idle {
            self.transition(SessionState::Idle);
        }

        self.adapter_check_pending = true;
        self.status(format!("Checking Bluetooth for {}", self.target.name));
        self.link.is_adapter_enabled(self.epoch);
        self.drain()
    }

    /// End the session. Best effort; the machine settles in `Disconnected`.
    pub fn request_disconnect(&mut self) -> Vec<MachineOutput> {
        match self.state {
            SessionState::Idle if self.adapter_check_pending => {
                self.advance_epoch();
                self.adapter_check_pending = false;
                self.transition(SessionState::Disconnected);
            }
            SessionState::Scanning => {
                self.advance_epoch();
                self.deadline = None;
                self.link.stop_scan();
                self.transition(SessionState::Disconnected);
                self.status("Stopped scanning".to_string());
            }
            SessionState::Connecting
            | SessionState::Connected
            | SessionState::Subscribing
            | SessionState::Subscribed
            | SessionState::AwaitingRead => {
                self.advance_epoch();
                self.deadline = None;
                self.notification_pending = false;
                self.transition(SessionState::Disconnecting);
                self.status(format!("Disconnecting from {}", self.target.name));
                self.link.disconnect(&self.target.id, self.epoch);
            }
            state => debug!("Nothing to disconnect in state {}", state),
        }
        self.drain()
    }

    /// Write to a characteristic on the connected device.
    ///
    /// The outcome is reported later as [`MachineOutput::WriteFinished`].
    pub fn write(&mut self, characteristic: Characteristic, data: &[u8]) -> Result<(), CommandError> {
        if !self.state.is_link_up() {
            return Err(CommandError::NotConnected { state: self.state });
        }
        if self.write_in_flight {
            return Err(CommandError::WriteInProgress);
        }

        self.write_in_flight = true;
        self.link.write(&self.target.id, characteristic, data, self.epoch);
        Ok(())
    }

    /// Apply a link completion
    pub fn handle(&mut self, event: LinkEvent, now: Instant) -> Vec<MachineOutput> {
        if event.epoch != self.epoch {
            debug!(
                "Discarding stale {:?} from epoch {} (current {})",
                event.kind, event.epoch, self.epoch
            );
            return Vec::new();
        }

        match (self.state, event.kind) {
            (SessionState::Idle, LinkEventKind::AdapterState { enabled }) if self.adapter_check_pending => {
                self.adapter_check_pending = false;
                if enabled {
                    self.status(format!("Scanning for {}", self.target.name));
                    self.transition(SessionState::Scanning);
                    self.begin_scan(now);
                } else {
                    warn!("Bluetooth adapter is disabled");
                    self.status("Bluetooth is disabled".to_string());
                }
            }

            (SessionState::Scanning, LinkEventKind::DeviceDiscovered { device_id }) => {
                if device_id == self.target.id {
                    self.link.stop_scan();
                    self.status(format!("Found {}, connecting", self.target.name));
                    self.transition(SessionState::Connecting);
                    self.begin_connect(now);
                } else {
                    debug!("Ignoring advertisement from {}", device_id);
                }
            }
            (SessionState::Scanning, LinkEventKind::ScanFailed { reason }) => {
                let error = LinkError::classify(LinkOp::Scan, reason);
                self.retry_later(error, RetryTarget::Scan, now);
            }

            (SessionState::Connecting, LinkEventKind::Connected) => {
                self.deadline = None;
                self.transition(SessionState::Connected);
                self.status(format!("Connected to {}", self.target.name));
                self.transition(SessionState::Subscribing);
                self.begin_subscribe();
            }
            (SessionState::Connecting, LinkEventKind::ConnectFailed { reason }) => {
                let error = LinkError::classify(LinkOp::Connect, reason);
                self.link_failed(error, RetryTarget::Connect, now);
            }

            (SessionState::Subscribing, LinkEventKind::Subscribed) => {
                self.retry.record_success();
                self.deadline = None;
                self.transition(SessionState::Subscribed);
                self.status(format!("Listening for ranges from {}", self.target.name));
            }
            (SessionState::Subscribing, LinkEventKind::SubscribeFailed { reason }) => {
                let error = LinkError::classify(LinkOp::Subscribe, reason);
                self.link_failed(error, RetryTarget::Subscribe, now);
            }

            (SessionState::Subscribed, LinkEventKind::Notification) => self.issue_read(),
            (SessionState::AwaitingRead, LinkEventKind::Notification) => {
                debug!("Read outstanding, coalescing notification");
                self.notification_pending = true;
            }
            (SessionState::AwaitingRead, LinkEventKind::ReadCompleted { data }) => {
                self.counters.payloads += 1;
                self.transition(SessionState::Subscribed);
                self.outputs.push(MachineOutput::Payload(data));
                self.follow_up_read();
            }
            (SessionState::AwaitingRead, LinkEventKind::ReadFailed { reason }) => {
                let error = LinkError::classify(LinkOp::Read, reason);
                warn!("{}", error);
                self.counters.read_failures += 1;
                self.status(format!("Failed to read ranges: {}", error.reason));
                self.transition(SessionState::Subscribed);
                self.follow_up_read();
            }

            (_, LinkEventKind::WriteCompleted) if self.write_in_flight => {
                self.write_in_flight = false;
                self.outputs.push(MachineOutput::WriteFinished(Ok(())));
            }
            (_, LinkEventKind::WriteFailed { reason }) if self.write_in_flight => {
                let error = LinkError::classify(LinkOp::Write, reason);
                warn!("{}", error);
                self.write_in_flight = false;
                self.outputs.push(MachineOutput::WriteFinished(Err(error)));
            }

            (state, LinkEventKind::LinkLost { reason }) if state.is_link_up() => {
                warn!("Lost link to {}: {}", self.target.name, reason);
                self.counters.link_drops += 1;
                self.notification_pending = false;
                let error = LinkError {
                    op: LinkOp::Connect,
                    kind: LinkErrorKind::Transient,
                    reason,
                };
                self.retry_later(error, RetryTarget::Connect, now);
            }

            (SessionState::Disconnecting, LinkEventKind::Disconnected) => {
                self.transition(SessionState::Disconnected);
                self.status(format!("Disconnected from {}", self.target.name));
            }
            (SessionState::Disconnecting, LinkEventKind::DisconnectFailed { reason }) => {
                warn!("{}", LinkError::classify(LinkOp::Disconnect, reason));
                self.transition(SessionState::Disconnected);
                self.status(format!("Disconnected from {}", self.target.name));
            }

            (state, kind) => debug!("Ignoring {:?} in state {}", kind, state),
        }

        self.drain()
    }

    /// Fire the pending timeout or retry if it is due
    pub fn poll(&mut self, now: Instant) -> Vec<MachineOutput> {
        let due = match self.deadline {
            Some(deadline) if deadline.at <= now => deadline,
            _ => return Vec::new(),
        };
        self.deadline = None;

        match due.kind {
            DeadlineKind::ScanTimeout => {
                self.link.stop_scan();
                let error = LinkError {
                    op: LinkOp::Scan,
                    kind: LinkErrorKind::Transient,
                    reason: format!("{} not seen within {} ms", self.target.name, self.scan_timeout.as_millis()),
                };
                warn!("{}", error);
                if self.retry.record_failure() {
                    self.fault(error);
                } else {
                    self.advance_epoch();
                    self.status(format!("Still scanning for {}", self.target.name));
                    self.transition(SessionState::Scanning);
                    self.begin_scan(now);
                }
            }
            DeadlineKind::ConnectTimeout => {
                // The abandoned attempt may still complete; its events carry the old epoch
                self.link.disconnect(&self.target.id, self.epoch);
                let error = LinkError {
                    op: LinkOp::Connect,
                    kind: LinkErrorKind::Transient,
                    reason: format!("no connection within {} ms", self.connect_timeout.as_millis()),
                };
                self.retry_later(error, RetryTarget::Connect, now);
            }
            DeadlineKind::Retry(RetryTarget::Scan) => self.begin_scan(now),
            DeadlineKind::Retry(RetryTarget::Connect) => self.begin_connect(now),
            DeadlineKind::Retry(RetryTarget::Subscribe) => self.begin_subscribe(),
        }

        self.drain()
    }

    fn begin_scan(&mut self, now: Instant) {
        self.link.start_scan(self.epoch);
        self.deadline = Some(Deadline {
            at: now + self.scan_timeout,
            kind: DeadlineKind::ScanTimeout,
        });
    }

    fn begin_connect(&mut self, now: Instant) {
        self.link.connect(&self.target.id, self.epoch);
        self.deadline = Some(Deadline {
            at: now + self.connect_timeout,
            kind: DeadlineKind::ConnectTimeout,
        });
    }

    fn begin_subscribe(&mut self) {
        self.link
            .start_notification(&self.target.id, Characteristic::Location, self.epoch);
    }

    fn issue_read(&mut self) {
        self.transition(SessionState::AwaitingRead);
        self.link.read(&self.target.id, Characteristic::Location, self.epoch);
    }

    fn follow_up_read(&mut self) {
        if self.notification_pending {
            self.notification_pending = false;
            self.issue_read();
        }
    }

    /// Connect or subscribe failure: rescan if the peripheral vanished,
    /// otherwise retry the same operation
    fn link_failed(&mut self, error: LinkError, target: RetryTarget, now: Instant) {
        if error.recovery_strategy() != RecoveryStrategy::Rescan {
            self.counters.transient_failures += 1;
            self.retry_later(error, target, now);
            return;
        }

        self.counters.not_found += 1;
        warn!("{}", error);
        if self.retry.record_failure() {
            self.fault(error);
            return;
        }

        let was_link_up = self.state.is_link_up();
        self.advance_epoch();
        self.deadline = None;
        if was_link_up {
            self.link.disconnect(&self.target.id, self.epoch);
        }
        self.status(format!("{} not found, scanning again", self.target.name));
        self.transition(SessionState::Scanning);
        self.begin_scan(now);
    }

    fn retry_later(&mut self, error: LinkError, target: RetryTarget, now: Instant) {
        warn!("{}", error);
        if self.retry.record_failure() {
            self.fault(error);
            return;
        }

        self.advance_epoch();
        let delay = self.retry.next_delay();
        self.status(format!(
            "{} failed, retrying in {} ms (failure {} of {})",
            error.op,
            delay.as_millis(),
            self.retry.consecutive_failures(),
            self.retry.max_failures()
        ));

        let state = match target {
            RetryTarget::Scan => SessionState::Scanning,
            RetryTarget::Connect => SessionState::Connecting,
            RetryTarget::Subscribe => SessionState::Subscribing,
        };
        self.transition(state);
        self.deadline = Some(Deadline {
            at: now + delay,
            kind: DeadlineKind::Retry(target),
        });
    }

    fn fault(&mut self, error: LinkError) {
        let was_link_up = self.state.is_link_up();
        self.advance_epoch();
        self.deadline = None;
        self.notification_pending = false;
        if was_link_up {
            self.link.disconnect(&self.target.id, self.epoch);
        }

        self.transition(SessionState::Faulted);
        self.status(format!(
            "Giving up on {} after {} consecutive failures: {}",
            self.target.name,
            self.retry.consecutive_failures(),
            error
        ));
        self.outputs.push(MachineOutput::Faulted { last_error: error });
    }

    /// Supersede everything in flight; the outstanding write fails
    fn advance_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if self.write_in_flight {
            self.write_in_flight = false;
            self.outputs.push(MachineOutput::WriteFinished(Err(LinkError {
                op: LinkOp::Write,
                kind: LinkErrorKind::Transient,
                reason: "session superseded before the write completed".to_string(),
            })));
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        self.state = to;
        info!("{} -> {} (epoch {})", from, to, self.epoch);
        self.outputs.push(MachineOutput::StateChanged { from, to });
    }

    fn status(&mut self, message: String) {
        info!("{}", message);
        self.outputs.push(MachineOutput::Status(message));
    }

    fn drain(&mut self) -> Vec<MachineOutput> {
        std::mem::take(&mut self.outputs)
    }
}
