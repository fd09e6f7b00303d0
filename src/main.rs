use anyhow::{bail, Context};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tag_locator::api::{Command, DeviceRole, EngineHandle, HostCallbacks, PositionReport};
use tag_locator::directory::{DirectoryRefresher, FileSource, RefreshOutcome};
use tag_locator::{
    AnchorId, Coordinate3D, DeviceIdentity, DirectoryHandle, LocatorConfig, MockLink,
    SessionContext, SessionState, TagEngine, TelemetryParser,
};
use tokio::sync::{mpsc, watch};
use tokio::time;

/// Replay a simulated tag session against the mock link
#[derive(Parser, Debug)]
#[command(author, version, about = "UWB tag locator session simulator")]
struct Args {
    /// JSON configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Anchor directory JSON: { "<anchor id>": [x, y, z], ... }
    #[arg(short, long, default_value = "demos/anchors.json")]
    anchors: PathBuf,

    /// Paired tag identifier
    #[arg(long, default_value = "c0:98:e5:42:00:00:00:01")]
    device_id: String,

    #[arg(long, default_value = "TotTag")]
    device_name: String,

    /// Number of range reports to replay
    #[arg(short = 'n', long, default_value_t = 5)]
    fixes: usize,

    /// Pause between range reports in milliseconds
    #[arg(long, default_value_t = 200)]
    interval_ms: u64,

    /// Starting point of the simulated tag walk (x y z, meters)
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], default_values_t = [1.0, 1.0, 0.5])]
    start: Vec<f64>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

/// Prints everything the engine reports
struct ConsoleCallbacks {
    state: watch::Sender<SessionState>,
}

impl HostCallbacks for ConsoleCallbacks {
    fn on_status(&mut self, message: &str) {
        println!("[status] {}", message);
    }

    fn on_location(&mut self, text: &str) {
        println!("[location] {}", text);
    }

    fn on_position(&mut self, report: &PositionReport) {
        match report.to_json() {
            Ok(json) => println!("[report] {}", json),
            Err(e) => warn!("Could not serialize position report: {}", e),
        }
    }

    fn on_forwarded_payload(&mut self, reason_code: u8, payload: &[u8]) {
        println!("[forwarded] reason {} ({} bytes)", reason_code, payload.len());
    }

    fn on_state_changed(&mut self, _from: SessionState, to: SessionState) {
        let _ = self.state.send(to);
    }
}

async fn wait_for_state(states: &mut watch::Receiver<SessionState>, wanted: SessionState) -> anyhow::Result<()> {
    time::timeout(Duration::from_secs(5), states.wait_for(|state| *state == wanted))
        .await
        .with_context(|| format!("timed out waiting for {}", wanted))?
        .context("engine stopped")?;
    Ok(())
}

fn range_report(anchors: &[(AnchorId, Coordinate3D)], tag: &Coordinate3D) -> Vec<u8> {
    let ranges: Vec<(AnchorId, f64)> = anchors
        .iter()
        .map(|(id, position)| (*id, (tag - position).norm()))
        .collect();
    TelemetryParser::new().encode_range_report(&ranges)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => LocatorConfig::load_from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => LocatorConfig::default(),
    };

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let directory = DirectoryHandle::new();
    let mut refresher = DirectoryRefresher::new(FileSource::new(&args.anchors), directory.clone(), &config.refresh);
    match refresher.refresh_once().await {
        RefreshOutcome::Updated { anchors, rejected } => {
            info!("Loaded {} anchors ({} rejected)", anchors, rejected)
        }
        other => bail!("could not load anchors from {}: {:?}", args.anchors.display(), other),
    }

    let mut anchors: Vec<(AnchorId, Coordinate3D)> = directory
        .snapshot()
        .context("anchor directory is empty")?
        .iter()
        .map(|(id, position)| (*id, *position))
        .collect();
    anchors.sort_by_key(|(id, _)| *id);

    if config.refresh.enabled {
        tokio::spawn(refresher.run());
    }

    let (state_tx, mut state_rx) = watch::channel(SessionState::Idle);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let link = MockLink::with_auto_reply(events_tx, args.device_id.clone());
    let device = DeviceIdentity::new(args.device_id.clone(), args.device_name.clone());
    let context = SessionContext::new(device, directory, config.clone());
    let engine = TagEngine::new(link.clone(), ConsoleCallbacks { state: state_tx }, context);

    let (handle, requests) = EngineHandle::channel(config.event_queue_capacity);
    let task = tokio::spawn(engine.run(events_rx, requests));

    handle.start().await;
    wait_for_state(&mut state_rx, SessionState::Subscribed).await?;

    handle
        .send_command(Command::assign_role(DeviceRole::Mobile), None)
        .await;

    let start = Coordinate3D::new(args.start[0], args.start[1], args.start[2]);
    for step in 0..args.fixes {
        let tag = start + Coordinate3D::new(0.25 * step as f64, 0.1 * step as f64, 0.0);
        link.queue_read_payload(range_report(&anchors, &tag));
        if !link.notify() {
            warn!("Link went away before report {}", step);
            break;
        }
        time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    handle.disconnect().await;
    wait_for_state(&mut state_rx, SessionState::Disconnected).await?;
    handle.shutdown().await;

    let counters = task.await.context("engine task panicked")?;
    println!(
        "Session finished: {} payloads, {} read failures, {} link drops",
        counters.payloads, counters.read_failures, counters.link_drops
    );
    Ok(())
}
