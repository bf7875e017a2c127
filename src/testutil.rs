use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

pub(crate) fn sample_entry(status: EntryStatus) -> WaitlistEntry {
    WaitlistEntry {
        id: Ulid::new(),
        restaurant_id: "2".into(),
        restaurant_name: "Sakura Sushi".into(),
        date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
        party_size: 2,
        preferred_times: ["8:00 PM".parse().unwrap()].into_iter().collect(),
        guest_name: "Lin".into(),
        guest_email: "lin@example.com".into(),
        guest_phone: String::new(),
        status,
        position: 1,
        estimated_wait_minutes: 15,
        available_time: None,
        notified_at: None,
        expires_at: None,
        joined_at: 0,
        confirmed_at: None,
        declined_at: None,
        cancelled_at: None,
    }
}

pub(crate) fn sample_reservation() -> ReservationRecord {
    ReservationRecord {
        id: Ulid::new(),
        restaurant_id: "2".into(),
        restaurant_name: "Sakura Sushi".into(),
        date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
        time: "8:00 PM".parse().unwrap(),
        party_size: 2,
        guest_name: "Lin".into(),
        guest_email: "lin@example.com".into(),
        guest_phone: String::new(),
        status: ReservationStatus::Confirmed,
        source: ReservationSource::Waitlist,
        confirmed_at: 5,
        cancelled_at: None,
    }
}
