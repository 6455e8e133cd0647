use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Args;
use guardian_core::alert::AlertRecord;
use guardian_core::supervisor::DEFAULT_EVENT_CAPACITY;
use guardian_core::{
    ControlSurface, Config, Dependencies, Event, HostSignal, LogNotifier, MemoryFeed,
    StaticIdentity, Supervisor, SupervisorSettings, TokioJobScheduler,
};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};

use super::identity;

#[derive(Args)]
pub struct RunArgs {
    /// JSON-lines file of alert documents to publish
    #[arg(long)]
    records: PathBuf,
    /// Signed-in user id
    #[arg(long)]
    user_id: Option<String>,
    /// Signed-in user email
    #[arg(long)]
    email: Option<String>,
    /// Stamp every record with the current time before publishing
    #[arg(long)]
    restamp: bool,
    /// Keep the supervisor running this long after the last record
    #[arg(long, default_value = "1")]
    linger_secs: u64,
    /// Config file to use instead of ~/.config/guardian/config.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

fn read_records(path: &PathBuf, restamp: bool) -> Result<Vec<AlertRecord>, Box<dyn std::error::Error>> {
    let file = std::fs::File::open(path)?;
    let mut records = Vec::new();
    for (n, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut record: AlertRecord = serde_json::from_str(line)
            .map_err(|e| format!("{}:{}: {e}", path.display(), n + 1))?;
        if restamp {
            record.timestamp = Some(Utc::now());
        }
        records.push(record);
    }
    Ok(records)
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load_or_default(),
    };
    config.validate()?;
    let records = read_records(&args.records, args.restamp)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(replay(args, config, records))
}

async fn replay(
    args: RunArgs,
    config: Config,
    records: Vec<AlertRecord>,
) -> Result<(), Box<dyn std::error::Error>> {
    let feed = Arc::new(MemoryFeed::new());
    let identity = Arc::new(StaticIdentity::new(identity(args.user_id, args.email)));
    let deps = Dependencies::new(feed.clone(), identity, Arc::new(LogNotifier));
    // One outcome per record plus lifecycle events, so nothing lags.
    let settings = SupervisorSettings {
        event_capacity: DEFAULT_EVENT_CAPACITY.max(records.len() + 16),
        ..config.supervisor_settings()
    };
    let supervisor = Supervisor::new(deps, settings);
    let (done, done_rx) = oneshot::channel();
    let printer = tokio::spawn(print_events(supervisor.subscribe_events(), done_rx));

    let scheduler = Arc::new(TokioJobScheduler::new()?);
    let control = ControlSurface::new(
        supervisor.clone(),
        scheduler.clone(),
        config.reconciliation_request(),
    );
    control.on_signal(HostSignal::BootCompleted).await;
    if !supervisor.is_running() {
        scheduler.shutdown();
        let _ = done.send(());
        printer.await??;
        return Err("supervisor failed to start".into());
    }

    let total = records.len();
    for record in records {
        tracing::debug!(alert_id = %record.id, "publishing");
        feed.publish(record);
    }
    tokio::time::sleep(Duration::from_secs(args.linger_secs)).await;

    supervisor.stop().await?;
    scheduler.shutdown();

    let _ = done.send(());
    let tally = printer.await??;
    tracing::info!(
        published = total,
        delivered = tally.delivered,
        suppressed = tally.suppressed,
        "replay finished"
    );
    Ok(())
}

#[derive(Default)]
struct Tally {
    delivered: usize,
    suppressed: usize,
}

impl Tally {
    fn print(&mut self, event: &Event) -> Result<(), serde_json::Error> {
        match event {
            Event::AlertDelivered { .. } => self.delivered += 1,
            Event::AlertSuppressed { .. } => self.suppressed += 1,
            _ => {}
        }
        println!("{}", serde_json::to_string(event)?);
        Ok(())
    }
}

/// Print events as JSON lines while the replay runs. After `done`, whatever
/// is still buffered is printed before returning.
async fn print_events(
    mut events: broadcast::Receiver<Event>,
    mut done: oneshot::Receiver<()>,
) -> Result<Tally, serde_json::Error> {
    let mut tally = Tally::default();
    loop {
        tokio::select! {
            biased;
            received = events.recv() => match received {
                Ok(event) => tally.print(&event)?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event output fell behind");
                }
                Err(RecvError::Closed) => return Ok(tally),
            },
            _ = &mut done => break,
        }
    }
    loop {
        match events.try_recv() {
            Ok(event) => tally.print(&event)?,
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event output fell behind");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(tally),
        }
    }
}
