//! Persistence seams between the engine and wherever records live.
//!
//! The engine only ever talks to [`EntryStore`] and [`ReservationStore`].
//! Both are implemented by [`MemoryStore`] and by the WAL-backed
//! [`DurableStore`].

mod durable;
mod memory;

pub use durable::DurableStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{EntryStatus, Ms, ReservationRecord, WaitlistEntry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("store writer shut down")]
    WriterClosed,
    #[error("reservation not found: {0}")]
    ReservationNotFound(Ulid),
    #[error("reservation already cancelled: {0}")]
    ReservationCancelled(Ulid),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Waitlist entries keyed by id. Entries are soft-terminated, never deleted.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn get(&self, id: Ulid) -> Result<Option<WaitlistEntry>, StoreError>;

    /// Insert or overwrite.
    async fn put(&self, entry: WaitlistEntry) -> Result<(), StoreError>;

    /// Entries whose status is in `statuses`, in join order.
    async fn list_by_status(
        &self,
        statuses: &[EntryStatus],
    ) -> Result<Vec<WaitlistEntry>, StoreError>;
}

/// Receives reservations emitted on confirmation and owns them afterwards.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn create(&self, record: ReservationRecord) -> Result<Ulid, StoreError>;

    async fn get_reservation(&self, id: Ulid) -> Result<Option<ReservationRecord>, StoreError>;

    /// Mark a reservation cancelled. Fails if unknown or already cancelled.
    async fn cancel_reservation(&self, id: Ulid, at: Ms) -> Result<ReservationRecord, StoreError>;

    async fn list_reservations(&self) -> Result<Vec<ReservationRecord>, StoreError>;
}
