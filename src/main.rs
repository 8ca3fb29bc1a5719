use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use syncdeck::duration::{format_duration, parse_duration};
use syncdeck::{Settings, SyncContext};
use syncdeck_types::{FetchOptions, NewQueueItem, QueueEvent};

/// How long `queue enqueue` waits for the sync pass it triggered.
const ENQUEUE_SYNC_WAIT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "syncdeck", version)]
#[command(about = "Fetch configured data sources and sync queued writes")]
struct Args {
    /// Config file (TOML, JSON or YAML). Defaults to ./syncdeck.toml if present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. "debug", "syncdeck_queue=trace")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured data sources
    Sources,

    /// Fetch one source and print the response
    Fetch {
        /// Source id
        id: String,

        /// Call-time parameter as key=value; the value is parsed as JSON when possible
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// Bypass the response cache
        #[arg(long)]
        force: bool,
    },

    /// Fetch every source, then stream source and queue events as JSON lines
    Watch {
        /// Stop after this long (e.g. "30s", "5m"); runs until Ctrl-C otherwise
        #[arg(long = "for", value_parser = parse_duration_arg)]
        duration: Option<Duration>,
    },

    /// Inspect and drive the write queue
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Dump registry and queue internals
    #[cfg(feature = "inspect")]
    Inspect,
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    /// Pending count and sync flags
    Status,

    /// Pending items in enqueue order
    List,

    /// Queue a write and wait for the sync pass it triggers
    Enqueue {
        /// Item type, selects the endpoint
        #[arg(long = "type")]
        kind: String,

        /// JSON payload
        #[arg(long, value_parser = parse_json)]
        payload: Value,

        /// Higher priorities sync first
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        priority: i32,
    },

    /// Run one sync pass now
    Sync,

    /// Drop every pending item
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;
    init_tracing(args.log_level.as_deref().unwrap_or(&settings.log_level));

    let context = SyncContext::init(&settings);
    let result = run(&context, args.command).await;
    context.dispose();
    result
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(context: &SyncContext, command: Command) -> Result<()> {
    let registry = context.registry();
    let queue = context.queue();

    match command {
        Command::Sources => {
            let configs: Vec<_> = registry
                .source_ids()
                .iter()
                .filter_map(|id| registry.config(id))
                .collect();
            print_json(&configs)
        }

        Command::Fetch { id, params, force } => {
            let options = params
                .into_iter()
                .fold(FetchOptions::new().force(force), |options, (name, value)| {
                    options.param(name, value)
                });

            let response = registry.fetch(&id, options).await;
            print_json(&response)?;
            match response.error {
                Some(error) if !response.success => bail!("fetch of '{id}' failed: {error}"),
                _ => Ok(()),
            }
        }

        Command::Watch { duration } => watch(context, duration).await,

        Command::Queue(QueueCommand::Status) => print_json(&queue.status()),

        Command::Queue(QueueCommand::List) => print_json(&queue.pending()),

        Command::Queue(QueueCommand::Enqueue {
            kind,
            payload,
            priority,
        }) => {
            let mut events = queue.subscribe();
            let item = queue.enqueue(NewQueueItem::new(kind, payload).priority(priority));
            print_json(&item)?;

            if queue.is_online() {
                wait_for_sync(&mut events, ENQUEUE_SYNC_WAIT).await;
            } else {
                info!("queue is offline, item kept for a later sync");
            }
            Ok(())
        }

        Command::Queue(QueueCommand::Sync) => {
            if !queue.is_online() {
                warn!("queue is offline, nothing dispatched");
            }
            print_json(&queue.sync().await)
        }

        Command::Queue(QueueCommand::Clear) => {
            queue.clear();
            print_json(&queue.status())
        }

        #[cfg(feature = "inspect")]
        Command::Inspect => print_json(&serde_json::json!({
            "registry": registry.inspect(),
            "queue": queue.inspect(),
        })),
    }
}

async fn watch(context: &SyncContext, duration: Option<Duration>) -> Result<()> {
    let registry = context.registry().clone();
    let queue = context.queue().clone();

    let mut source_events = registry.subscribe();
    let mut queue_events = queue.subscribe();

    for id in registry.source_ids() {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry.fetch(&id, FetchOptions::forced()).await;
        });
    }
    {
        let queue = queue.clone();
        tokio::spawn(async move {
            queue.sync().await;
        });
    }

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupt);

    match duration {
        Some(d) => info!(duration = %format_duration(d), "watching"),
        None => info!("watching until interrupted"),
    }

    loop {
        tokio::select! {
            event = source_events.recv() => {
                if !forward(event)? {
                    break;
                }
            }
            event = queue_events.recv() => {
                if !forward(event)? {
                    break;
                }
            }
            _ = &mut interrupt => {
                info!("interrupted");
                break;
            }
            _ = &mut deadline => break,
        }
    }
    Ok(())
}

/// Print one event as a JSON line. Returns false once the channel is closed.
fn forward<T: Serialize>(event: Result<T, RecvError>) -> Result<bool> {
    match event {
        Ok(event) => {
            println!("{}", serde_json::to_string(&event)?);
            Ok(true)
        }
        Err(RecvError::Lagged(skipped)) => {
            warn!(skipped, "event stream lagged");
            Ok(true)
        }
        Err(RecvError::Closed) => Ok(false),
    }
}

async fn wait_for_sync(events: &mut broadcast::Receiver<QueueEvent>, limit: Duration) {
    let finished = tokio::time::timeout(limit, async {
        loop {
            match events.recv().await {
                Ok(QueueEvent::SyncComplete { report }) => return Some(report),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;

    match finished {
        Ok(Some(report)) => info!(
            synced = report.synced,
            failed = report.failed,
            dropped = report.dropped,
            "sync finished"
        ),
        Ok(None) => {}
        Err(_) => warn!(
            waited = %format_duration(limit),
            "sync still running, item stays queued"
        ),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

fn parse_duration_arg(raw: &str) -> Result<Duration, String> {
    parse_duration(raw).map_err(|e| e.to_string())
}
