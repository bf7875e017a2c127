use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

use super::{EntryStore, MemoryStore, ReservationStore, StoreError};

/// Most commands the writer takes off the channel per wakeup.
const MAX_BATCH: usize = 256;

type Ack = oneshot::Sender<io::Result<()>>;

enum WalOp {
    Append(Record, Ack),
    Rewrite(Vec<Record>, Ack),
    PendingAppends(oneshot::Sender<u64>),
}

/// Owns the log. Each wakeup drains whatever is queued; consecutive
/// appends share one fsync, other ops run in arrival order between them.
async fn run_writer(mut wal: Wal, mut rx: mpsc::Receiver<WalOp>) {
    let mut queued = Vec::with_capacity(MAX_BATCH);
    while rx.recv_many(&mut queued, MAX_BATCH).await > 0 {
        let mut ops = queued.drain(..).peekable();
        while let Some(op) = ops.next() {
            match op {
                WalOp::Append(record, ack) => {
                    let mut batch = vec![(record, ack)];
                    while let Some(WalOp::Append(record, ack)) =
                        ops.next_if(|op| matches!(op, WalOp::Append(..)))
                    {
                        batch.push((record, ack));
                    }
                    commit(&mut wal, batch);
                }
                WalOp::Rewrite(records, ack) => {
                    let _ = ack.send(wal.rewrite(&records));
                }
                WalOp::PendingAppends(reply) => {
                    let _ = reply.send(wal.appends_since_compact());
                }
            }
        }
    }
}

fn commit(wal: &mut Wal, batch: Vec<(Record, Ack)>) {
    let (records, acks): (Vec<Record>, Vec<Ack>) = batch.into_iter().unzip();
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(records.len() as f64);
    let started = std::time::Instant::now();
    let result = wal.append_batch(&records);
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    for ack in acks {
        let _ = ack.send(match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        });
    }
}

/// Why a replayed record can't be applied on top of `state`, if it can't.
fn rejects(state: &MemoryStore, record: &Record) -> Option<String> {
    match record {
        Record::EntryPut(entry) => {
            let stamps = [entry.confirmed_at, entry.declined_at, entry.cancelled_at];
            if stamps.iter().flatten().count() > 1 {
                return Some(format!("entry {} has more than one terminal timestamp", entry.id));
            }
            let stamped = match entry.status {
                EntryStatus::Confirmed => entry.confirmed_at.is_some(),
                EntryStatus::Declined => entry.declined_at.is_some(),
                EntryStatus::Cancelled => entry.cancelled_at.is_some(),
                EntryStatus::Active | EntryStatus::Available => true,
            };
            if !stamped {
                return Some(format!("{} entry {} has no timestamp", entry.status, entry.id));
            }
            let prior = state.entry_status(entry.id)?;
            (prior.is_terminal() && prior != entry.status)
                .then(|| format!("entry {} moves from {prior} to {}", entry.id, entry.status))
        }
        Record::ReservationCreated(_) => None,
        Record::ReservationCancelled { id, at } => {
            state.check_cancel(*id, *at).err().map(|e| e.to_string())
        }
    }
}

/// Entry and reservation store persisted to an append-only log.
///
/// State lives in memory and every mutation is appended to the WAL (and
/// fsynced as part of a group commit) before it is applied. Opening replays
/// the log, skipping records that would break the entry lifecycle.
pub struct DurableStore {
    state: MemoryStore,
    wal_tx: mpsc::Sender<WalOp>,
    /// Serializes reservation check-then-write.
    reservation_lock: Mutex<()>,
    /// Held across snapshot + rewrite so no append lands in between.
    compact_lock: RwLock<()>,
}

impl DurableStore {
    /// Replay `wal_path` and start the writer task. Must be called inside a
    /// tokio runtime.
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let (wal, records) = Wal::open(wal_path)?;
        let state = MemoryStore::new();
        let mut skipped = 0;
        for record in &records {
            match rejects(&state, record) {
                None => state.apply(record),
                Some(reason) => {
                    warn!("skipping replayed record: {reason}");
                    skipped += 1;
                }
            }
        }
        info!(
            "replayed {} records from {} ({} entries, {} reservations, {skipped} skipped)",
            records.len(),
            wal_path.display(),
            state.entry_count(),
            state.reservation_count()
        );

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(run_writer(wal, wal_rx));

        Ok(Self {
            state,
            wal_tx,
            reservation_lock: Mutex::new(()),
            compact_lock: RwLock::new(()),
        })
    }

    /// Send an op carrying an ack and wait for the writer's answer.
    async fn request(&self, op: impl FnOnce(Ack) -> WalOp) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(op(tx))
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::WriterClosed)??;
        Ok(())
    }

    /// WAL-append then apply.
    async fn persist_and_apply(&self, record: Record) -> Result<(), StoreError> {
        let _shared = self.compact_lock.read().await;
        self.request(|ack| WalOp::Append(record.clone(), ack)).await?;
        self.state.apply(&record);
        Ok(())
    }

    /// Rewrite the log with only the records needed to recreate current
    /// state: one put per entry, one record per reservation with its final
    /// status folded in.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _exclusive = self.compact_lock.write().await;
        let records = self.state.snapshot();
        self.request(|ack| WalOp::Rewrite(records, ack)).await
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self.wal_tx.send(WalOp::PendingAppends(tx)).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub fn entry_count(&self) -> usize {
        self.state.entry_count()
    }
}

#[async_trait]
impl EntryStore for DurableStore {
    async fn get(&self, id: Ulid) -> Result<Option<WaitlistEntry>, StoreError> {
        self.state.get(id).await
    }

    async fn put(&self, entry: WaitlistEntry) -> Result<(), StoreError> {
        self.persist_and_apply(Record::EntryPut(entry)).await
    }

    async fn list_by_status(
        &self,
        statuses: &[EntryStatus],
    ) -> Result<Vec<WaitlistEntry>, StoreError> {
        Ok(self.state.entries_with_status(statuses))
    }
}

#[async_trait]
impl ReservationStore for DurableStore {
    async fn create(&self, record: ReservationRecord) -> Result<Ulid, StoreError> {
        let id = record.id;
        self.persist_and_apply(Record::ReservationCreated(record))
            .await?;
        Ok(id)
    }

    async fn get_reservation(&self, id: Ulid) -> Result<Option<ReservationRecord>, StoreError> {
        self.state.get_reservation(id).await
    }

    async fn cancel_reservation(&self, id: Ulid, at: Ms) -> Result<ReservationRecord, StoreError> {
        let _guard = self.reservation_lock.lock().await;
        let cancelled = self.state.check_cancel(id, at)?;
        self.persist_and_apply(Record::ReservationCancelled { id, at })
            .await?;
        Ok(cancelled)
    }

    async fn list_reservations(&self) -> Result<Vec<ReservationRecord>, StoreError> {
        Ok(self.state.all_reservations())
    }
}
