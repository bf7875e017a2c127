use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;
use ulid::Ulid;

use crate::model::{Ms, TimeSlot, WaitlistEntry};

const CHANNEL_CAPACITY: usize = 16;

/// A table offered to a waitlisted guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub entry_id: Ulid,
    pub restaurant_name: String,
    pub guest_email: String,
    pub guest_phone: String,
    pub available_time: TimeSlot,
    pub expires_at: Ms,
}

impl Offer {
    /// `None` unless the entry carries an offered slot and deadline.
    pub fn from_entry(entry: &WaitlistEntry) -> Option<Self> {
        Some(Self {
            entry_id: entry.id,
            restaurant_name: entry.restaurant_name.clone(),
            guest_email: entry.guest_email.clone(),
            guest_phone: entry.guest_phone.clone(),
            available_time: entry.available_time?,
            expires_at: entry.expires_at?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("no open listener for entry {0}")]
    Closed(Ulid),
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Where promotions are announced. Fire and forget: the engine logs failures
/// and carries on.
pub trait NotificationChannel: Send + Sync {
    fn notify(&self, offer: &Offer) -> Result<(), NotifyError>;
}

/// Broadcast hub keyed by entry id, for front ends watching one entry.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Offer>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to offers for an entry. Creates the channel if needed.
    pub fn subscribe(&self, entry_id: Ulid) -> broadcast::Receiver<Offer> {
        let sender = self
            .channels
            .entry(entry_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }
}

impl NotificationChannel for NotifyHub {
    /// No-op if nobody ever subscribed; an error if every subscriber left.
    fn notify(&self, offer: &Offer) -> Result<(), NotifyError> {
        let Some(sender) = self.channels.get(&offer.entry_id) else {
            return Ok(());
        };
        if sender.send(offer.clone()).is_err() {
            drop(sender);
            self.channels.remove(&offer.entry_id);
            return Err(NotifyError::Closed(offer.entry_id));
        }
        Ok(())
    }
}

/// Writes offers to the log instead of contacting the guest.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationChannel for LogNotifier {
    fn notify(&self, offer: &Offer) -> Result<(), NotifyError> {
        info!(
            entry = %offer.entry_id,
            restaurant = %offer.restaurant_name,
            time = %offer.available_time,
            expires_at = offer.expires_at,
            "table offered to {}",
            offer.guest_email
        );
        Ok(())
    }
}
