use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::{EntryStore, ReservationStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<Ulid, WaitlistEntry>,
    reservations: DashMap<Ulid, ReservationRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Apply a record to in-memory state. No validation; callers check first.
    pub(crate) fn apply(&self, record: &Record) {
        match record {
            Record::EntryPut(entry) => {
                self.entries.insert(entry.id, entry.clone());
            }
            Record::ReservationCreated(reservation) => {
                self.reservations.insert(reservation.id, reservation.clone());
            }
            Record::ReservationCancelled { id, at } => {
                if let Some(mut r) = self.reservations.get_mut(id) {
                    r.status = ReservationStatus::Cancelled;
                    r.cancelled_at = Some(*at);
                }
            }
        }
    }

    pub(crate) fn entry_status(&self, id: Ulid) -> Option<EntryStatus> {
        self.entries.get(&id).map(|e| e.status)
    }

    /// The reservation as it would look after cancelling, or why it can't be.
    pub(crate) fn check_cancel(&self, id: Ulid, at: Ms) -> Result<ReservationRecord, StoreError> {
        let mut record = self
            .reservations
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::ReservationNotFound(id))?;
        if record.status == ReservationStatus::Cancelled {
            return Err(StoreError::ReservationCancelled(id));
        }
        record.status = ReservationStatus::Cancelled;
        record.cancelled_at = Some(at);
        Ok(record)
    }

    /// Minimal record set that recreates the current state.
    pub(crate) fn snapshot(&self) -> Vec<Record> {
        let mut entries: Vec<WaitlistEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.id);
        let mut reservations: Vec<ReservationRecord> =
            self.reservations.iter().map(|r| r.value().clone()).collect();
        reservations.sort_by_key(|r| r.id);

        entries
            .into_iter()
            .map(Record::EntryPut)
            .chain(reservations.into_iter().map(Record::ReservationCreated))
            .collect()
    }

    pub(crate) fn entries_with_status(&self, statuses: &[EntryStatus]) -> Vec<WaitlistEntry> {
        let mut out: Vec<WaitlistEntry> = self
            .entries
            .iter()
            .filter(|e| statuses.contains(&e.status))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|e| e.id);
        out
    }

    pub(crate) fn all_reservations(&self) -> Vec<ReservationRecord> {
        let mut out: Vec<ReservationRecord> =
            self.reservations.iter().map(|r| r.value().clone()).collect();
        out.sort_by_key(|r| r.id);
        out
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn get(&self, id: Ulid) -> Result<Option<WaitlistEntry>, StoreError> {
        Ok(self.entries.get(&id).map(|e| e.value().clone()))
    }

    async fn put(&self, entry: WaitlistEntry) -> Result<(), StoreError> {
        self.entries.insert(entry.id, entry);
        Ok(())
    }

    async fn list_by_status(
        &self,
        statuses: &[EntryStatus],
    ) -> Result<Vec<WaitlistEntry>, StoreError> {
        Ok(self.entries_with_status(statuses))
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn create(&self, record: ReservationRecord) -> Result<Ulid, StoreError> {
        let id = record.id;
        self.reservations.insert(id, record);
        Ok(id)
    }

    async fn get_reservation(&self, id: Ulid) -> Result<Option<ReservationRecord>, StoreError> {
        Ok(self.reservations.get(&id).map(|r| r.value().clone()))
    }

    async fn cancel_reservation(&self, id: Ulid, at: Ms) -> Result<ReservationRecord, StoreError> {
        // Check and write under the shard lock so two cancels can't both win.
        let mut slot = self
            .reservations
            .get_mut(&id)
            .ok_or(StoreError::ReservationNotFound(id))?;
        if slot.status == ReservationStatus::Cancelled {
            return Err(StoreError::ReservationCancelled(id));
        }
        slot.status = ReservationStatus::Cancelled;
        slot.cancelled_at = Some(at);
        Ok(slot.value().clone())
    }

    async fn list_reservations(&self) -> Result<Vec<ReservationRecord>, StoreError> {
        Ok(self.all_reservations())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{sample_entry, sample_reservation};

    #[tokio::test]
    async fn put_get_and_overwrite() {
        let store = MemoryStore::new();
        let mut e = sample_entry(EntryStatus::Active);
        store.put(e.clone()).await.unwrap();
        assert_eq!(store.get(e.id).await.unwrap(), Some(e.clone()));

        e.position = 7;
        store.put(e.clone()).await.unwrap();
        assert_eq!(store.get(e.id).await.unwrap().unwrap().position, 7);
        assert_eq!(store.entry_count(), 1);
    }

    #[tokio::test]
    async fn get_unknown_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get(Ulid::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_by_status_filters_and_orders() {
        let store = MemoryStore::new();
        let a = sample_entry(EntryStatus::Active);
        let b = sample_entry(EntryStatus::Cancelled);
        let c = sample_entry(EntryStatus::Available);
        for e in [&c, &b, &a] {
            store.put(e.clone()).await.unwrap();
        }
        let open = store.list_by_status(&EntryStatus::OPEN).await.unwrap();
        let ids: Vec<Ulid> = open.iter().map(|e| e.id).collect();
        let mut expected = vec![a.id, c.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn cancel_reservation_once() {
        let store = MemoryStore::new();
        let r = sample_reservation();
        let id = store.create(r).await.unwrap();

        let cancelled = store.cancel_reservation(id, 99).await.unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert_eq!(cancelled.cancelled_at, Some(99));

        let again = store.cancel_reservation(id, 100).await;
        assert_eq!(again, Err(StoreError::ReservationCancelled(id)));
        let missing = store.cancel_reservation(Ulid::new(), 100).await;
        assert!(matches!(missing, Err(StoreError::ReservationNotFound(_))));
    }

    #[test]
    fn snapshot_rebuilds_state() {
        let store = MemoryStore::new();
        store.apply(&Record::EntryPut(sample_entry(EntryStatus::Active)));
        let r = sample_reservation();
        store.apply(&Record::ReservationCreated(r.clone()));
        store.apply(&Record::ReservationCancelled { id: r.id, at: 42 });

        let rebuilt = MemoryStore::new();
        for record in store.snapshot() {
            rebuilt.apply(&record);
        }
        assert_eq!(rebuilt.entry_count(), 1);
        let back = rebuilt.all_reservations();
        assert_eq!(back[0].status, ReservationStatus::Cancelled);
        assert_eq!(back[0].cancelled_at, Some(42));
    }
}
