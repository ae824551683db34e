use std::sync::Arc;

use tracing::{error, info, warn};

use rentald::clock::SystemClock;
use rentald::config::Config;
use rentald::engine::{Engine, EngineSettings};
use rentald::{observability, sweeper};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cfg = Config::from_env();
    observability::init(cfg.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&cfg.data_dir)?;

    let settings = EngineSettings {
        clock: Arc::new(SystemClock),
        refunds: cfg.refund_table.clone(),
    };
    let engine = Arc::new(Engine::open(&cfg.journal_path(), settings).await?);

    info!("rentald started");
    info!("  data_dir: {}", cfg.data_dir.display());
    info!(
        "  hold_ttl: {}",
        cfg.hold_ttl
            .map_or("disabled".to_string(), |ttl| format!("{}s", ttl.num_seconds()))
    );
    info!(
        "  metrics: {}",
        cfg.metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    if let Some(ttl) = cfg.hold_ttl {
        let sweeper_engine = engine.clone();
        let period = cfg.sweep_interval;
        tokio::spawn(async move {
            sweeper::run_hold_sweeper(sweeper_engine, ttl, period).await;
        });
    }
    let compactor_engine = engine.clone();
    let (threshold, period) = (cfg.compact_threshold, cfg.sweep_interval);
    tokio::spawn(async move {
        sweeper::run_compactor(compactor_engine, threshold, period).await;
    });

    // Lifecycle facts go to the log until a delivery channel subscribes.
    let mut events = engine.notify.subscribe_all();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(target: "rentald::events", "{}", event.payload()),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("event log lagged, {n} events skipped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Graceful shutdown on SIGTERM/ctrl-c
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutdown signal received, compacting journal");
    if let Err(e) = engine.compact_journal().await {
        error!("final compaction failed: {e}");
    }
    info!("rentald stopped");
    Ok(())
}
