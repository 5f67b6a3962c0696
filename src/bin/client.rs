use std::sync::Arc;
use std::time::Duration;

use citypulse::config::{Config, read_config_file};
use citypulse::connection::{ConnectionHandle, ConnectionState};
use citypulse::poller::Poller;
use citypulse::store::{AlertStore, FileBackend, MemoryBackend};
use clap::Parser;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("citypulse", LevelFilter::TRACE),
        ("client", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };

    let store = match &config.storage_path {
        Some(path) => AlertStore::open(FileBackend::new(path.clone())).await,
        None => {
            warn!("no storage path configured, alerts will not survive a restart");
            AlertStore::open(MemoryBackend::new()).await
        }
    };
    let store = Arc::new(store);
    let sweeper = store.spawn_sweeper();

    let (connection, mut messages) = ConnectionHandle::spawn(config.stream());
    connection.connect().await?;

    let poller = Arc::new(Poller::new(config.poller()));
    poller.start();

    let message_store = Arc::clone(&store);
    let dispatcher = tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            message_store.apply(message).await;
        }
    });

    let mut state_rx = connection.state_watch();
    let mut summary = tokio::time::interval(Duration::from_secs(10));
    summary.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }

            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                info!("connection state: {state}");
                if state == ConnectionState::Terminated {
                    error!("stream terminated, exiting");
                    break;
                }
            }

            _ = summary.tick() => {
                let health = poller.health();
                info!(
                    "{} active alerts, {} edge nodes online, backend {}",
                    store.active_alerts().len(),
                    poller.online_nodes().len(),
                    health.status,
                );
            }
        }
    }

    poller.stop();
    sweeper.cancel();
    connection.disconnect().await.ok();
    dispatcher.abort();

    Ok(())
}
