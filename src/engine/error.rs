use thiserror::Error;
use ulid::Ulid;

use crate::model::{EntryStatus, Ms};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("waitlist entry not found: {0}")]
    NotFound(Ulid),
    #[error("cannot {action} entry {id} while {from}")]
    InvalidTransition {
        id: Ulid,
        from: EntryStatus,
        action: &'static str,
    },
    /// The response window closed; the entry has been declined.
    #[error("offer for entry {id} expired at {expires_at}")]
    OfferExpired { id: Ulid, expires_at: Ms },
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl EngineError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::OfferExpired { .. } => "offer_expired",
            EngineError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}
