use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Unix milliseconds. The only timestamp type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// A time-of-day slot, e.g. `7:00 PM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSlot(NaiveTime);

impl TimeSlot {
    /// Whole-minute slot; `None` if hour/minute are out of range.
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSlotError(pub String);

impl fmt::Display for ParseSlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time slot: {:?}", self.0)
    }
}

impl std::error::Error for ParseSlotError {}

impl FromStr for TimeSlot {
    type Err = ParseSlotError;

    /// Accepts `7:00 PM` (12-hour) or `19:00` (24-hour).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, "%I:%M %p")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .map(Self)
            .map_err(|_| ParseSlotError(s.to_string()))
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%-I:%M %p"))
    }
}

impl Serialize for TimeSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Active,
    Available,
    Confirmed,
    Declined,
    Cancelled,
}

impl EntryStatus {
    pub const ALL: [EntryStatus; 5] = [
        EntryStatus::Active,
        EntryStatus::Available,
        EntryStatus::Confirmed,
        EntryStatus::Declined,
        EntryStatus::Cancelled,
    ];

    /// Statuses a guest still has to act on.
    pub const OPEN: [EntryStatus; 2] = [EntryStatus::Active, EntryStatus::Available];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EntryStatus::Confirmed | EntryStatus::Declined | EntryStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Active => "active",
            EntryStatus::Available => "available",
            EntryStatus::Confirmed => "confirmed",
            EntryStatus::Declined => "declined",
            EntryStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One guest's waitlist registration for a restaurant, date and party size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistEntry {
    pub id: Ulid,
    pub restaurant_id: String,
    pub restaurant_name: String,
    pub date: NaiveDate,
    pub party_size: u32,
    pub preferred_times: BTreeSet<TimeSlot>,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: String,
    pub status: EntryStatus,
    /// Queue rank, only meaningful while `Active`.
    pub position: u32,
    /// Only meaningful while `Active`.
    pub estimated_wait_minutes: u32,
    pub available_time: Option<TimeSlot>,
    pub notified_at: Option<Ms>,
    pub expires_at: Option<Ms>,
    pub joined_at: Ms,
    pub confirmed_at: Option<Ms>,
    pub declined_at: Option<Ms>,
    pub cancelled_at: Option<Ms>,
}

impl WaitlistEntry {
    /// True while an offer is outstanding and its window has closed.
    pub fn offer_expired(&self, now: Ms) -> bool {
        self.status == EntryStatus::Available && self.expires_at.is_some_and(|exp| now > exp)
    }

    /// `preferred_times[index % len]`, in slot order.
    pub fn preferred_slot(&self, index: usize) -> Option<TimeSlot> {
        if self.preferred_times.is_empty() {
            return None;
        }
        self.preferred_times
            .iter()
            .nth(index % self.preferred_times.len())
            .copied()
    }
}

/// Payload of a join operation, as submitted by a front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub restaurant_id: String,
    pub restaurant_name: String,
    pub date: NaiveDate,
    pub party_size: u32,
    pub preferred_times: Vec<TimeSlot>,
    pub guest_name: String,
    pub guest_email: String,
    #[serde(default)]
    pub guest_phone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationSource {
    Waitlist,
    Direct,
}

/// A booked table. Carries copies of the venue and guest fields, no link
/// back to the waitlist entry it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRecord {
    pub id: Ulid,
    pub restaurant_id: String,
    pub restaurant_name: String,
    pub date: NaiveDate,
    pub time: TimeSlot,
    pub party_size: u32,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: String,
    pub status: ReservationStatus,
    pub source: ReservationSource,
    pub confirmed_at: Ms,
    pub cancelled_at: Option<Ms>,
}

/// Narrowing applied by `Engine::list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFilter {
    pub statuses: Vec<EntryStatus>,
    pub restaurant_id: Option<String>,
    pub guest_email: Option<String>,
}

impl EntryFilter {
    /// Entries still waiting on the guest or the restaurant.
    pub fn open() -> Self {
        Self::with_statuses(&EntryStatus::OPEN)
    }

    pub fn all() -> Self {
        Self::with_statuses(&EntryStatus::ALL)
    }

    pub fn with_statuses(statuses: &[EntryStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            restaurant_id: None,
            guest_email: None,
        }
    }

    pub fn restaurant(mut self, restaurant_id: impl Into<String>) -> Self {
        self.restaurant_id = Some(restaurant_id.into());
        self
    }

    pub fn guest(mut self, email: impl Into<String>) -> Self {
        self.guest_email = Some(email.into());
        self
    }

    pub fn matches(&self, entry: &WaitlistEntry) -> bool {
        self.statuses.contains(&entry.status)
            && self
                .restaurant_id
                .as_ref()
                .is_none_or(|r| *r == entry.restaurant_id)
            && self
                .guest_email
                .as_ref()
                .is_none_or(|e| e.eq_ignore_ascii_case(&entry.guest_email))
    }
}

/// Store records, flat. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    EntryPut(WaitlistEntry),
    ReservationCreated(ReservationRecord),
    ReservationCancelled { id: Ulid, at: Ms },
}
