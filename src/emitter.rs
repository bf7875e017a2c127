use std::sync::Arc;

use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;
use crate::store::{ReservationStore, StoreError};

/// Turns confirmed waitlist entries into reservations and hands them to the
/// reservation store.
pub struct ReservationEmitter {
    store: Arc<dyn ReservationStore>,
}

impl ReservationEmitter {
    pub fn new(store: Arc<dyn ReservationStore>) -> Self {
        Self { store }
    }

    /// Copy the venue, slot, party and guest fields of a confirmed entry.
    pub fn translate(entry: &WaitlistEntry) -> Result<ReservationRecord, EngineError> {
        let invalid = || EngineError::InvalidTransition {
            id: entry.id,
            from: entry.status,
            action: "emit reservation for",
        };
        if entry.status != EntryStatus::Confirmed {
            return Err(invalid());
        }
        let time = entry.available_time.ok_or_else(invalid)?;
        let confirmed_at = entry.confirmed_at.ok_or_else(invalid)?;

        Ok(ReservationRecord {
            id: Ulid::new(),
            restaurant_id: entry.restaurant_id.clone(),
            restaurant_name: entry.restaurant_name.clone(),
            date: entry.date,
            time,
            party_size: entry.party_size,
            guest_name: entry.guest_name.clone(),
            guest_email: entry.guest_email.clone(),
            guest_phone: entry.guest_phone.clone(),
            status: ReservationStatus::Confirmed,
            source: ReservationSource::Waitlist,
            confirmed_at,
            cancelled_at: None,
        })
    }

    pub async fn emit(&self, record: ReservationRecord) -> Result<ReservationRecord, StoreError> {
        let id = self.store.create(record.clone()).await?;
        metrics::counter!(crate::observability::RESERVATIONS_EMITTED_TOTAL).increment(1);
        Ok(ReservationRecord { id, ..record })
    }

    /// Undo an emitted reservation whose entry could not be saved.
    pub async fn retract(&self, id: Ulid, at: Ms) -> Result<(), StoreError> {
        self.store.cancel_reservation(id, at).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testutil::sample_entry;

    fn confirmed() -> WaitlistEntry {
        let mut e = sample_entry(EntryStatus::Confirmed);
        e.party_size = 6;
        e.guest_phone = "555-0199".into();
        e.available_time = Some("8:00 PM".parse().unwrap());
        e.notified_at = Some(100);
        e.expires_at = Some(100 + 15 * MINUTE_MS);
        e.confirmed_at = Some(200);
        e
    }

    #[test]
    fn translation_copies_every_field() {
        let e = confirmed();
        let r = ReservationEmitter::translate(&e).unwrap();
        assert_eq!(r.restaurant_id, e.restaurant_id);
        assert_eq!(r.restaurant_name, e.restaurant_name);
        assert_eq!(r.date, e.date);
        assert_eq!(Some(r.time), e.available_time);
        assert_eq!(r.party_size, 6);
        assert_eq!(r.guest_name, e.guest_name);
        assert_eq!(r.guest_email, e.guest_email);
        assert_eq!(r.guest_phone, "555-0199");
        assert_eq!(r.status, ReservationStatus::Confirmed);
        assert_eq!(r.source, ReservationSource::Waitlist);
        assert_eq!(r.confirmed_at, 200);
        assert_eq!(r.cancelled_at, None);
    }

    #[test]
    fn translation_refuses_unconfirmed_entries() {
        let mut e = confirmed();
        e.status = EntryStatus::Available;
        assert!(matches!(
            ReservationEmitter::translate(&e),
            Err(EngineError::InvalidTransition { from: EntryStatus::Available, .. })
        ));
    }

    #[tokio::test]
    async fn emit_hands_record_to_store() {
        let store = Arc::new(MemoryStore::new());
        let emitter = ReservationEmitter::new(store.clone());
        let record = ReservationEmitter::translate(&confirmed()).unwrap();

        let emitted = emitter.emit(record.clone()).await.unwrap();
        assert_eq!(emitted, record);
        assert_eq!(store.reservation_count(), 1);

        emitter.retract(emitted.id, 300).await.unwrap();
        let back = store.get_reservation(emitted.id).await.unwrap().unwrap();
        assert_eq!(back.status, ReservationStatus::Cancelled);
    }
}
