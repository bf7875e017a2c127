use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::store::DurableStore;

/// How often the compactor checks the WAL size.
pub const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives `Engine::sweep` on a fixed period until stopped.
pub struct Ticker {
    engine: Arc<Engine>,
    period: Duration,
    running: Mutex<Option<Running>>,
}

impl Ticker {
    pub fn new(engine: Arc<Engine>, period: Duration) -> Self {
        Self {
            engine,
            period,
            running: Mutex::new(None),
        }
    }

    /// Begin sweeping; the first sweep runs one period from now. Returns
    /// false if already running. Must be called inside a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut running = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if running.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_sweeps(self.engine.clone(), self.period, token.clone()));
        *running = Some(Running { token, handle });
        info!("ticker started, period {:?}", self.period);
        true
    }

    /// Stop sweeping. A sweep already under way finishes first. Returns
    /// false if the ticker was not running.
    pub async fn stop(&self) -> bool {
        let taken = match self.running.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(Running { token, handle }) = taken else {
            return false;
        };

        token.cancel();
        if let Err(e) = handle.await {
            warn!("ticker task ended abnormally: {e}");
        }
        info!("ticker stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().map(|r| r.is_some()).unwrap_or(false)
    }
}

async fn run_sweeps(engine: Arc<Engine>, period: Duration, token: CancellationToken) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                let report = engine.sweep().await;
                if report.promoted > 0 || report.lapsed > 0 || report.failed > 0 {
                    info!(
                        promoted = report.promoted,
                        lapsed = report.lapsed,
                        failed = report.failed,
                        "sweep over {} active entries",
                        report.ticked + report.failed
                    );
                }
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends pile up.
pub async fn run_compactor(
    store: Arc<DurableStore>,
    threshold: u64,
    period: Duration,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                let appends = store.appends_since_compact().await;
                if appends < threshold {
                    continue;
                }
                match store.compact().await {
                    Ok(()) => info!("compacted WAL after {appends} appends"),
                    Err(e) => warn!("WAL compaction failed: {e}"),
                }
            }
        }
    }
    debug!("compactor stopped");
}
