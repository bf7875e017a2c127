use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use tablewait::config::Config;
use tablewait::engine::Engine;
use tablewait::notify::LogNotifier;
use tablewait::policy::RandomTickPolicy;
use tablewait::store::DurableStore;
use tablewait::ticker::{self, Ticker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    tablewait::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;
    let wal_path = config.wal_path();
    let store = Arc::new(DurableStore::open(&wal_path)?);

    let engine = Arc::new(Engine::new(
        store.clone(),
        store.clone(),
        Arc::new(LogNotifier),
        Arc::new(RandomTickPolicy::new(&config.simulation)),
        config.engine.clone(),
    ));

    info!("tablewait started");
    info!("  wal: {}", wal_path.display());
    info!("  entries: {}", store.entry_count());
    info!("  tick interval: {:?}", config.tick_interval);
    info!(
        "  response window: {} min, expiry {}",
        config.engine.response_window_ms / tablewait::model::MINUTE_MS,
        if config.engine.enforce_expiry { "enforced" } else { "not enforced" }
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let ticker = Ticker::new(engine.clone(), config.tick_interval);
    ticker.start();

    let compactor_token = CancellationToken::new();
    let compactor = tokio::spawn(ticker::run_compactor(
        store.clone(),
        config.compact_threshold,
        ticker::COMPACT_CHECK_INTERVAL,
        compactor_token.clone(),
    ));

    // Graceful shutdown on SIGTERM/ctrl-c: let an in-flight sweep finish
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    info!("shutdown signal received, stopping ticker");

    ticker.stop().await;
    compactor_token.cancel();
    compactor.await?;

    info!("tablewait stopped");
    Ok(())
}
