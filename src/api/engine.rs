//! Tag engine: drives the state machine and the position pipeline
//!
//! Link completions and host requests arrive on tokio channels and are
//! processed one at a time by [`TagEngine::run`], so the state machine never
//! sees concurrent events. Timeouts and retry backoff come from the machine's
//! deadline.

use crate::api::callback::{HostCallbacks, WriteCallback};
use crate::api::command::Command;
use crate::api::types::{format_location, PositionReport, SessionContext};
use crate::connection::{
    CommandError, ConnectionStateMachine, MachineOutput, SessionCounters, SessionState,
};
use crate::hardware::{LinkAdapter, LinkError, LinkErrorKind, LinkEvent, LinkOp};
use crate::processing::{PipelineOutcome, PositionPipeline};
use chrono::Utc;
use log::{error, info, warn};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time;

/// Requests from the hosting shell
pub enum EngineRequest {
    Start,
    /// Application paused or closed
    Disconnect,
    Send {
        command: Command,
        done: Option<WriteCallback>,
    },
    Shutdown,
}

/// Sending side of the engine's request queue
#[derive(Debug, Clone)]
pub struct EngineHandle {
    requests: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Create a handle and the receiver to pass to [`TagEngine::run`]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineRequest>) {
        let (requests, receiver) = mpsc::channel(capacity.max(1));
        (Self { requests }, receiver)
    }

    pub async fn start(&self) -> bool {
        self.requests.send(EngineRequest::Start).await.is_ok()
    }

    pub async fn disconnect(&self) -> bool {
        self.requests.send(EngineRequest::Disconnect).await.is_ok()
    }

    pub async fn send_command(&self, command: Command, done: Option<WriteCallback>) -> bool {
        self.requests
            .send(EngineRequest::Send { command, done })
            .await
            .is_ok()
    }

    pub async fn shutdown(&self) -> bool {
        self.requests.send(EngineRequest::Shutdown).await.is_ok()
    }
}

/// Single-session tag engine
pub struct TagEngine<L: LinkAdapter, H: HostCallbacks> {
    machine: ConnectionStateMachine<L>,
    pipeline: PositionPipeline,
    context: SessionContext,
    host: H,
    pending_write: Option<(Command, Option<WriteCallback>)>,
}

impl<L: LinkAdapter, H: HostCallbacks> TagEngine<L, H> {
    pub fn new(link: L, host: H, context: SessionContext) -> Self {
        let machine = ConnectionStateMachine::new(link, context.device.clone(), &context.config.retry);
        let pipeline = PositionPipeline::from_config(&context.config);

        Self {
            machine,
            pipeline,
            context,
            host,
            pending_write: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn machine(&self) -> &ConnectionStateMachine<L> {
        &self.machine
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn start(&mut self) {
        let outputs = self.machine.start();
        self.dispatch(outputs);
    }

    pub fn disconnect(&mut self) {
        let outputs = self.machine.request_disconnect();
        self.dispatch(outputs);
    }

    /// Write a command to the tag; `done` runs once the write settles.
    ///
    /// Rejected immediately when there is no link or a write is in flight,
    /// in which case `done` has already been called with the failure.
    pub fn send_command(&mut self, command: Command, done: Option<WriteCallback>) -> Result<(), CommandError> {
        let data = command.encode();
        if let Err(error) = self.machine.write(command.characteristic(), &data) {
            warn!("Not sending \"{}\": {}", command, error);
            self.host
                .on_status("ERROR: could not send information to device!");
            if let Some(done) = done {
                done(Err(LinkError {
                    op: LinkOp::Write,
                    kind: LinkErrorKind::Transient,
                    reason: error.to_string(),
                }));
            }
            return Err(error);
        }

        info!("Sending \"{}\" on {:?}", command, command.characteristic());
        self.pending_write = Some((command, done));
        Ok(())
    }

    pub fn handle_link_event(&mut self, event: LinkEvent, now: Instant) {
        let outputs = self.machine.handle(event, now);
        self.dispatch(outputs);
    }

    pub fn poll(&mut self, now: Instant) {
        let outputs = self.machine.poll(now);
        self.dispatch(outputs);
    }

    /// Process events until shutdown or until the request queue closes
    pub async fn run(
        mut self,
        mut link_events: mpsc::UnboundedReceiver<LinkEvent>,
        mut requests: mpsc::Receiver<EngineRequest>,
    ) -> SessionCounters {
        info!("Tag engine running for {}", self.context.device.name);

        loop {
            let deadline = self.machine.next_deadline();
            let wake = async move {
                match deadline {
                    Some(at) => time::sleep_until(time::Instant::from_std(at)).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                Some(event) = link_events.recv() => self.handle_link_event(event, Instant::now()),
                request = requests.recv() => match request {
                    Some(EngineRequest::Start) => self.start(),
                    Some(EngineRequest::Disconnect) => self.disconnect(),
                    Some(EngineRequest::Send { command, done }) => {
                        let _ = self.send_command(command, done);
                    }
                    Some(EngineRequest::Shutdown) | None => break,
                },
                _ = wake => self.poll(Instant::now()),
            }
        }

        info!("Tag engine stopped in state {}", self.machine.state());
        self.machine.counters().clone()
    }

    fn dispatch(&mut self, outputs: Vec<MachineOutput>) {
        for output in outputs {
            match output {
                MachineOutput::StateChanged { from, to } => self.host.on_state_changed(from, to),
                MachineOutput::Status(message) => self.host.on_status(&message),
                MachineOutput::Payload(data) => self.process_payload(&data),
                MachineOutput::WriteFinished(result) => self.finish_write(result),
                MachineOutput::Faulted { last_error } => {
                    error!("Session with {} faulted: {}", self.context.device.name, last_error)
                }
            }
        }
    }

    fn finish_write(&mut self, result: Result<(), LinkError>) {
        let Some((command, done)) = self.pending_write.take() else {
            return;
        };

        match &result {
            Ok(()) => {
                info!("Sent \"{}\"", command);
                self.host.on_status("Sent information to device");
            }
            Err(error) => {
                warn!("Sending \"{}\" failed: {}", command, error);
                self.host
                    .on_status("ERROR: could not send information to device!");
            }
        }

        if let Some(done) = done {
            done(result);
        }
    }

    fn process_payload(&mut self, payload: &[u8]) {
        let directory = self.context.directory.snapshot();

        match self.pipeline.process(payload, directory.as_deref()) {
            Ok(PipelineOutcome::Position(estimate)) => {
                self.host.on_location(&format_location(&estimate));
                let report = PositionReport::new(&self.context.device, &estimate, Utc::now());
                self.host.on_position(&report);
            }
            Ok(PipelineOutcome::NoRanges) => self.host.on_location("Didn't get any ranges."),
            Ok(PipelineOutcome::DirectoryUnavailable) => {
                self.host.on_location("Waiting for anchor locations")
            }
            Ok(PipelineOutcome::InsufficientRanges { valid, required }) => self
                .host
                .on_location(&format!("Only {} of {} required ranges", valid, required)),
            Ok(PipelineOutcome::Forwarded { reason_code, payload }) => {
                self.host.on_forwarded_payload(reason_code, &payload)
            }
            Ok(PipelineOutcome::SolveFailed(error)) => {
                self.host.on_status(&format!("Could not compute position: {}", error))
            }
            Err(error) => {
                warn!("Dropping telemetry payload: {}", error);
                self.host.on_status(&format!("Bad telemetry: {}", error));
            }
        }
    }
}
