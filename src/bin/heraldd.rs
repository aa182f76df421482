//! The herald daemon.
//!
//! Wires the lifecycle engine to a SQLite state store and runs it until
//! interrupted. The presentation side is stubbed with a logger: a real
//! desktop frontend attaches to the same channels.

use anyhow::Context;
use herald::{
    ConditionalExecutor, DaemonConfig, EngineRunner, IdleMonitor, LifecycleEngine,
    ModuleRepository, PresentEvent, SharedIdleSource, SqliteStore, StateStore,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DaemonConfig::load().context("loading configuration")?;

    std::fs::create_dir_all(&config.state_dir)
        .with_context(|| format!("creating state dir {}", config.state_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&config.state_dir, "heraldd.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(file_writer)
        .with_ansi(false)
        .init();

    info!(
        modules_dir = %config.modules_dir.display(),
        state_dir = %config.state_dir.display(),
        "heraldd starting"
    );
    std::fs::create_dir_all(&config.modules_dir)
        .with_context(|| format!("creating modules dir {}", config.modules_dir.display()))?;

    let store: Arc<dyn StateStore> =
        Arc::new(SqliteStore::open(&config.state_dir).context("opening state store")?);

    let (present_tx, mut present_rx) = mpsc::channel::<PresentEvent>(64);
    let (_action_tx, action_rx) = mpsc::channel(16);
    let idle_source = SharedIdleSource::new();

    // Placeholder presentation sink: log what a frontend would render.
    tokio::spawn(async move {
        while let Some(event) = present_rx.recv().await {
            match event {
                PresentEvent::Show(request) => info!(
                    module = request.module_id,
                    title = request.title,
                    category = request.category,
                    "would display notification"
                ),
                PresentEvent::HideAll => info!("would withdraw all notifications"),
            }
        }
    });

    let engine = LifecycleEngine::new(
        ModuleRepository::new(&config.modules_dir),
        store.clone(),
        ConditionalExecutor::new(config.condition_workers),
        IdleMonitor::new(idle_source),
        present_tx,
    );

    let cancel = CancellationToken::new();
    let runner = EngineRunner::new(engine, store, action_rx, cancel.clone());
    let runner_handle = tokio::spawn(runner.run());

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    cancel.cancel();
    runner_handle.await.context("joining runner")??;

    Ok(())
}
