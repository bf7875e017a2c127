use std::collections::BTreeSet;

use futures::{stream, StreamExt};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::emitter::ReservationEmitter;
use crate::limits::*;
use crate::model::*;
use crate::notify::Offer;
use crate::observability::{
    ACTIVE_ENTRIES, NOTIFY_FAILURES_TOTAL, SWEEP_DURATION_SECONDS, SWEEP_ERRORS_TOTAL,
    TRANSITIONS_TOTAL,
};
use crate::policy::TickOutcome;

use super::{ensure_status, Engine, EngineError, SweepReport, TickApplied, WAIT_FLOOR_MINUTES};

fn count_transition(to: EntryStatus) {
    metrics::counter!(TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
}

fn validate_join(req: &JoinRequest) -> Result<BTreeSet<TimeSlot>, EngineError> {
    if req.restaurant_id.trim().is_empty() {
        return Err(EngineError::validation("restaurant id is required"));
    }
    if req.restaurant_id.len() > MAX_RESTAURANT_ID_LEN {
        return Err(EngineError::validation("restaurant id too long"));
    }
    if req.restaurant_name.trim().is_empty() {
        return Err(EngineError::validation("restaurant name is required"));
    }
    if req.guest_name.trim().is_empty() {
        return Err(EngineError::validation("guest name is required"));
    }
    if req.guest_email.trim().is_empty() {
        return Err(EngineError::validation("guest email is required"));
    }
    if req.restaurant_name.len() > MAX_NAME_LEN || req.guest_name.len() > MAX_NAME_LEN {
        return Err(EngineError::validation("name too long"));
    }
    if req.guest_email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::validation("guest email too long"));
    }
    if req.guest_phone.len() > MAX_PHONE_LEN {
        return Err(EngineError::validation("guest phone too long"));
    }
    if req.party_size == 0 || req.party_size > MAX_PARTY_SIZE {
        return Err(EngineError::validation(format!(
            "party size must be between 1 and {MAX_PARTY_SIZE}"
        )));
    }
    let times: BTreeSet<TimeSlot> = req.preferred_times.iter().copied().collect();
    if times.is_empty() {
        return Err(EngineError::validation("at least one preferred time is required"));
    }
    if times.len() > MAX_PREFERRED_TIMES {
        return Err(EngineError::validation("too many preferred times"));
    }
    Ok(times)
}

impl Engine {
    /// Put a guest on the waitlist. Nothing is stored if the request is invalid.
    pub async fn join(&self, req: JoinRequest) -> Result<WaitlistEntry, EngineError> {
        self.observed("join", self.join_inner(req)).await
    }

    async fn join_inner(&self, req: JoinRequest) -> Result<WaitlistEntry, EngineError> {
        let preferred_times = validate_join(&req)?;
        let restaurant_id = req.restaurant_id.trim().to_string();

        // Count and insert under the queue lock so concurrent joins get
        // distinct positions.
        let queue = self
            .queues
            .entry((restaurant_id.clone(), req.date))
            .or_default()
            .clone();
        let _queue = queue.lock().await;
        let ahead = self.queue_length(&restaurant_id, req.date).await?;
        let position = ahead as u32 + 1;

        let entry = WaitlistEntry {
            id: self.next_id(),
            restaurant_id,
            restaurant_name: req.restaurant_name.trim().to_string(),
            date: req.date,
            party_size: req.party_size,
            preferred_times,
            guest_name: req.guest_name.trim().to_string(),
            guest_email: req.guest_email.trim().to_string(),
            guest_phone: req.guest_phone.trim().to_string(),
            status: EntryStatus::Active,
            position,
            estimated_wait_minutes: position.saturating_mul(self.config.minutes_per_position),
            available_time: None,
            notified_at: None,
            expires_at: None,
            joined_at: self.now(),
            confirmed_at: None,
            declined_at: None,
            cancelled_at: None,
        };
        self.entries.put(entry.clone()).await?;

        info!(
            entry = %entry.id,
            restaurant = %entry.restaurant_name,
            date = %entry.date,
            party = entry.party_size,
            "joined waitlist at position {}",
            entry.position
        );
        count_transition(EntryStatus::Active);
        Ok(entry)
    }

    /// Accept an offered table. Emits exactly one reservation.
    pub async fn confirm(&self, id: Ulid) -> Result<ReservationRecord, EngineError> {
        self.observed("confirm", self.confirm_inner(id)).await
    }

    async fn confirm_inner(&self, id: Ulid) -> Result<ReservationRecord, EngineError> {
        let (_guard, mut entry) = self.lock_entry(id).await?;
        ensure_status(&entry, EntryStatus::Available, "confirm")?;

        let now = self.now();
        if self.config.enforce_expiry && entry.offer_expired(now) {
            let expires_at = entry.expires_at.unwrap_or(now);
            self.lapse(&mut entry, now).await?;
            return Err(EngineError::OfferExpired { id, expires_at });
        }

        entry.status = EntryStatus::Confirmed;
        entry.confirmed_at = Some(now);
        let record = ReservationEmitter::translate(&entry)?;
        let record = self.emitter.emit(record).await?;

        if let Err(e) = self.entries.put(entry.clone()).await {
            // Entry is still `available` in the store; take the reservation back.
            if let Err(undo) = self.emitter.retract(record.id, now).await {
                warn!(entry = %id, reservation = %record.id, "could not retract reservation: {undo}");
            }
            return Err(e.into());
        }

        info!(
            entry = %id,
            reservation = %record.id,
            time = %record.time,
            "offer confirmed"
        );
        count_transition(EntryStatus::Confirmed);
        Ok(record)
    }

    /// Turn down an offered table. The entry does not go back in the queue.
    pub async fn decline(&self, id: Ulid) -> Result<WaitlistEntry, EngineError> {
        self.observed("decline", self.decline_inner(id)).await
    }

    async fn decline_inner(&self, id: Ulid) -> Result<WaitlistEntry, EngineError> {
        let (_guard, mut entry) = self.lock_entry(id).await?;
        ensure_status(&entry, EntryStatus::Available, "decline")?;

        entry.status = EntryStatus::Declined;
        entry.declined_at = Some(self.now());
        self.entries.put(entry.clone()).await?;

        info!(entry = %id, "offer declined");
        count_transition(EntryStatus::Declined);
        Ok(entry)
    }

    /// Guest leaves the queue. Only allowed while still waiting; an outstanding
    /// offer must be confirmed or declined instead.
    pub async fn cancel(&self, id: Ulid) -> Result<WaitlistEntry, EngineError> {
        self.observed("cancel", self.cancel_inner(id)).await
    }

    async fn cancel_inner(&self, id: Ulid) -> Result<WaitlistEntry, EngineError> {
        let (_guard, mut entry) = self.lock_entry(id).await?;
        ensure_status(&entry, EntryStatus::Active, "cancel")?;

        entry.status = EntryStatus::Cancelled;
        entry.cancelled_at = Some(self.now());
        self.entries.put(entry.clone()).await?;

        info!(entry = %id, "left waitlist");
        count_transition(EntryStatus::Cancelled);
        Ok(entry)
    }

    /// Advance one entry's queue simulation. Non-active entries are untouched.
    pub async fn tick_entry(&self, id: Ulid) -> Result<TickApplied, EngineError> {
        let (_guard, mut entry) = self.lock_entry(id).await?;
        if entry.status != EntryStatus::Active {
            debug!(entry = %id, status = %entry.status, "tick skipped");
            return Ok(TickApplied::Skipped);
        }

        match self.policy.decide(&entry) {
            TickOutcome::Hold => Ok(TickApplied::Held),
            TickOutcome::Advance { positions, minutes } => {
                let position = entry.position.saturating_sub(positions).max(1);
                let floor = WAIT_FLOOR_MINUTES.min(entry.estimated_wait_minutes);
                let wait = entry.estimated_wait_minutes.saturating_sub(minutes).max(floor);
                if position == entry.position && wait == entry.estimated_wait_minutes {
                    return Ok(TickApplied::Held);
                }

                entry.position = position;
                entry.estimated_wait_minutes = wait;
                self.entries.put(entry).await?;
                debug!(entry = %id, position, wait, "advanced in queue");
                Ok(TickApplied::Advanced {
                    position,
                    estimated_wait_minutes: wait,
                })
            }
            TickOutcome::Promote { slot } => {
                let available_time = entry.preferred_slot(slot).ok_or_else(|| {
                    EngineError::validation(format!("entry {id} has no preferred times"))
                })?;
                let now = self.now();
                entry.status = EntryStatus::Available;
                entry.available_time = Some(available_time);
                entry.notified_at = Some(now);
                entry.expires_at = Some(now + self.config.response_window_ms);
                self.entries.put(entry.clone()).await?;

                info!(entry = %id, time = %available_time, "table available");
                count_transition(EntryStatus::Available);
                self.announce(&entry);
                Ok(TickApplied::Promoted { available_time })
            }
        }
    }

    /// Fire-and-forget notification of a fresh offer.
    fn announce(&self, entry: &WaitlistEntry) {
        let Some(offer) = Offer::from_entry(entry) else {
            return;
        };
        if let Err(e) = self.notifier.notify(&offer) {
            warn!(entry = %entry.id, "notification failed: {e}");
            metrics::counter!(NOTIFY_FAILURES_TOTAL).increment(1);
        }
    }

    /// Decline an offer whose response window has closed. Caller holds the lock.
    async fn lapse(&self, entry: &mut WaitlistEntry, now: Ms) -> Result<(), EngineError> {
        entry.status = EntryStatus::Declined;
        entry.declined_at = Some(now);
        self.entries.put(entry.clone()).await?;
        info!(entry = %entry.id, "offer lapsed");
        count_transition(EntryStatus::Declined);
        Ok(())
    }

    /// Lapse the entry if its offer has expired. Returns whether it did.
    pub async fn lapse_if_expired(&self, id: Ulid) -> Result<bool, EngineError> {
        let (_guard, mut entry) = self.lock_entry(id).await?;
        let now = self.now();
        if !entry.offer_expired(now) {
            return Ok(false);
        }
        self.lapse(&mut entry, now).await?;
        Ok(true)
    }

    /// One pass of the tick driver: tick every active entry, then lapse
    /// expired offers. Per-entry failures are logged and counted, never fatal.
    pub async fn sweep(&self) -> SweepReport {
        let started = std::time::Instant::now();
        let mut report = SweepReport::default();

        match self.entries.list_by_status(&[EntryStatus::Active]).await {
            Ok(active) => {
                metrics::gauge!(ACTIVE_ENTRIES).set(active.len() as f64);
                let results: Vec<(Ulid, Result<TickApplied, EngineError>)> =
                    stream::iter(active.into_iter().map(|e| e.id))
                        .map(|id| async move { (id, self.tick_entry(id).await) })
                        .buffer_unordered(self.config.sweep_concurrency.max(1))
                        .collect()
                        .await;
                for (id, result) in results {
                    match result {
                        Ok(applied) => report.record(applied),
                        Err(e) => {
                            warn!(entry = %id, "tick failed: {e}");
                            metrics::counter!(SWEEP_ERRORS_TOTAL).increment(1);
                            report.failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!("sweep could not list active entries: {e}");
                report.failed += 1;
            }
        }

        if self.config.enforce_expiry {
            self.lapse_expired(&mut report).await;
        }

        metrics::histogram!(SWEEP_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        debug!(?report, "sweep finished");
        report
    }

    async fn lapse_expired(&self, report: &mut SweepReport) {
        let now = self.now();
        let offered = match self.entries.list_by_status(&[EntryStatus::Available]).await {
            Ok(v) => v,
            Err(e) => {
                warn!("sweep could not list offers: {e}");
                report.failed += 1;
                return;
            }
        };
        for entry in offered.iter().filter(|e| e.offer_expired(now)) {
            match self.lapse_if_expired(entry.id).await {
                Ok(true) => report.lapsed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(entry = %entry.id, "lapse failed: {e}");
                    metrics::counter!(SWEEP_ERRORS_TOTAL).increment(1);
                    report.failed += 1;
                }
            }
        }
    }
}
