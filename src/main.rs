//! Agent binary
//!
//! Wires up:
//! - Local adapters (tokio processes, working directories, event hub)
//! - The remote node client
//! - The publish scheduler loop and the live session registry
//! - A JSON-lines command intake on stdin

use std::sync::Arc;

use relaycast::adapters::local::{EventHub, FanoutSink, TokioProcessLauncher, WorkingDirs};
use relaycast::adapters::HttpNodeClient;
use relaycast::application::live::LiveContext;
use relaycast::application::{CommandIntake, LiveSessionRegistry, MediaProbe, PublishScheduler};
use relaycast::ports::events::EventSink;
use relaycast::ports::process::ProcessLauncher;
use relaycast::AgentConfig;
use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config = AgentConfig::from_env();

    tracing_subscriber::fmt::init();

    // 1. Adapters
    let launcher: Arc<dyn ProcessLauncher> = Arc::new(TokioProcessLauncher::new());
    let node = match HttpNodeClient::new(&config.node_url, &config.node_token) {
        Ok(node) => Arc::new(node),
        Err(e) => {
            error!(error = %e, "failed to build node client");
            std::process::exit(1);
        }
    };
    let hub = EventHub::new();
    let events: Arc<dyn EventSink> = Arc::new(
        FanoutSink::new()
            .with(Arc::new(hub.clone()))
            .with(node.clone()),
    );
    let dirs = WorkingDirs::new(&config.work_dir);
    if let Err(e) = dirs.ensure(dirs.root()).await {
        error!(error = %e, "working directory unavailable");
        std::process::exit(1);
    }

    // 2. Encoder profile
    let toolchain = MediaProbe::new(launcher.clone())
        .toolchain(&config.encoder, &config.prober, config.hardware)
        .await;
    info!(encoder = %toolchain.encoder, hardware = %toolchain.hardware, "toolchain ready");

    // 3. Application services
    let scheduler = PublishScheduler::new(
        launcher.clone(),
        node.clone(),
        events.clone(),
        dirs.clone(),
        toolchain.clone(),
        config.scheduler.clone(),
    );
    let live = LiveSessionRegistry::new(LiveContext {
        launcher,
        node,
        events,
        dirs,
        toolchain,
        settings: config.live.clone(),
        snapshots: config.snapshot.clone(),
    });

    // 4. Local event log
    let mut notifications = hub.subscribe();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => debug!(?notification, "notification"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "notification log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 5. Loops
    let shutdown = CancellationToken::new();
    let scheduler_task = tokio::spawn({
        let scheduler = scheduler.clone();
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });
    tokio::spawn({
        let intake = CommandIntake::new(scheduler, live.clone());
        let shutdown = shutdown.clone();
        async move {
            intake
                .run(BufReader::new(tokio::io::stdin()), shutdown)
                .await
        }
    });
    info!(work_dir = %config.work_dir.display(), node = %config.node_url, "relaycast agent ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
    shutdown.cancel();
    live.stop_all().await;
    let _ = scheduler_task.await;

    // A pending stdin read would otherwise hold the runtime open.
    std::process::exit(0);
}
