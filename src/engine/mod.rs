mod error;
mod mutations;
mod queries;

pub use error::EngineError;

use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::{Generator, Ulid};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::emitter::ReservationEmitter;
use crate::model::*;
use crate::notify::NotificationChannel;
use crate::policy::TickPolicy;
use crate::store::{EntryStore, ReservationStore};

/// Estimated wait never drops below this many minutes while still queued.
pub const WAIT_FLOOR_MINUTES: u32 = 5;

/// What a single tick did to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickApplied {
    /// Entry was not active; nothing touched.
    Skipped,
    Held,
    Advanced { position: u32, estimated_wait_minutes: u32 },
    Promoted { available_time: TimeSlot },
}

/// Totals for one pass of the tick driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub ticked: usize,
    pub held: usize,
    pub advanced: usize,
    pub promoted: usize,
    pub skipped: usize,
    pub lapsed: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, applied: TickApplied) {
        self.ticked += 1;
        match applied {
            TickApplied::Skipped => self.skipped += 1,
            TickApplied::Held => self.held += 1,
            TickApplied::Advanced { .. } => self.advanced += 1,
            TickApplied::Promoted { .. } => self.promoted += 1,
        }
    }
}

/// Owns the waitlist entry lifecycle.
///
/// Every read-modify-write of an entry happens under that entry's mutex, so
/// the tick driver and guest-initiated operations never interleave on the
/// same entry. Different entries proceed in parallel.
pub struct Engine {
    pub(super) entries: Arc<dyn EntryStore>,
    pub(super) emitter: ReservationEmitter,
    pub(super) notifier: Arc<dyn NotificationChannel>,
    pub(super) policy: Arc<dyn TickPolicy>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: EngineConfig,
    /// Per-entry write locks. Entries are never deleted, so neither are these.
    locks: DashMap<Ulid, Arc<Mutex<()>>>,
    /// Join locks per (restaurant, date) queue.
    queues: DashMap<(String, NaiveDate), Arc<Mutex<()>>>,
    /// Monotonic within a millisecond, so id order is join order.
    ids: std::sync::Mutex<Generator>,
}

impl Engine {
    pub fn new(
        entries: Arc<dyn EntryStore>,
        reservations: Arc<dyn ReservationStore>,
        notifier: Arc<dyn NotificationChannel>,
        policy: Arc<dyn TickPolicy>,
        config: EngineConfig,
    ) -> Self {
        Self {
            entries,
            emitter: ReservationEmitter::new(reservations),
            notifier,
            policy,
            clock: Arc::new(SystemClock),
            config,
            locks: DashMap::new(),
            queues: DashMap::new(),
            ids: std::sync::Mutex::new(Generator::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(super) fn now(&self) -> Ms {
        self.clock.now_ms()
    }

    pub(super) fn next_id(&self) -> Ulid {
        let mut ids = match self.ids.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        ids.generate().unwrap_or_else(|_| Ulid::new())
    }

    /// Acquire the entry's write lock, then load its current state.
    /// Unknown ids fail before a lock is ever created for them.
    pub(super) async fn lock_entry(
        &self,
        id: Ulid,
    ) -> Result<(OwnedMutexGuard<()>, WaitlistEntry), EngineError> {
        if !self.locks.contains_key(&id) && self.entries.get(id).await?.is_none() {
            return Err(EngineError::NotFound(id));
        }
        let lock = self.locks.entry(id).or_default().clone();
        let guard = lock.lock_owned().await;
        let entry = self
            .entries
            .get(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        Ok((guard, entry))
    }

    /// Run an operation and record its outcome under `op`.
    pub(super) async fn observed<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        let started = std::time::Instant::now();
        let result = fut.await;
        let status = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        crate::observability::record_operation(op, status, started);
        result
    }
}

/// Fail unless `entry` is currently in `expected`.
pub(super) fn ensure_status(
    entry: &WaitlistEntry,
    expected: EntryStatus,
    action: &'static str,
) -> Result<(), EngineError> {
    if entry.status != expected {
        return Err(EngineError::InvalidTransition {
            id: entry.id,
            from: entry.status,
            action,
        });
    }
    Ok(())
}
