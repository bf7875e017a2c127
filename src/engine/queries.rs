use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn get(&self, id: Ulid) -> Result<WaitlistEntry, EngineError> {
        self.entries
            .get(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// Entries matching `filter`, in join order. Reads are not serialized
    /// against writers; each entry is whatever was last committed.
    pub async fn list(&self, filter: &EntryFilter) -> Result<Vec<WaitlistEntry>, EngineError> {
        let mut entries = self.entries.list_by_status(&filter.statuses).await?;
        entries.retain(|e| filter.matches(e));
        Ok(entries)
    }

    /// Number of guests still waiting for a restaurant on a date.
    pub async fn queue_length(
        &self,
        restaurant_id: &str,
        date: NaiveDate,
    ) -> Result<usize, EngineError> {
        Ok(self
            .entries
            .list_by_status(&[EntryStatus::Active])
            .await?
            .iter()
            .filter(|e| e.restaurant_id == restaurant_id && e.date == date)
            .count())
    }
}
