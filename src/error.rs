//! Domain error taxonomy.
//!
//! Errors are classified by recoverability:
//! - Retryable: transient store/network failures
//! - Recoverable duplicates: uniqueness violations raised by the backing
//!   store under concurrent writers — callers report them, never crash
//! - Input errors: missing reasons, incomplete catalog entries, bad
//!   references — surfaced to the operator with the offending field named

use chrono::NaiveDate;
use thiserror::Error;

use crate::db::DbError;
use crate::postgrest::StoreError;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("slot already planned for this date and shift type")]
    DuplicateSlot,

    #[error("person already has a live assignment for this slot")]
    DuplicateActiveAssignment,

    #[error("a reason is required for {0}")]
    MissingReason(&'static str),

    #[error("shift type '{0}' has no default schedule and no override was supplied")]
    CatalogIncomplete(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("{field} reference not found: {value}")]
    ReferenceNotFound { field: &'static str, value: String },

    #[error("no planned slot for {date} / {shift_type}")]
    SlotNotPlanned { date: NaiveDate, shift_type: String },

    #[error("invalid assignment state transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("pagination aborted after {requests} requests ({fetched}/{reported} rows)")]
    PaginationExceeded {
        requests: u32,
        fetched: usize,
        reported: u64,
    },

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error(transparent)]
    Db(DbError),

    #[error(transparent)]
    Store(StoreError),
}

impl RosterError {
    /// True if retrying the same operation may succeed. Validation and
    /// uniqueness failures never are; only transport-level trouble is.
    pub fn is_retryable(&self) -> bool {
        match self {
            RosterError::Transient(_) => true,
            RosterError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Convenience constructor used throughout the lookup paths.
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        RosterError::NotFound {
            entity,
            key: key.into(),
        }
    }
}

impl From<DbError> for RosterError {
    fn from(err: DbError) -> Self {
        RosterError::Db(err)
    }
}

impl From<StoreError> for RosterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PaginationExceeded {
                requests,
                fetched,
                reported,
            } => RosterError::PaginationExceeded {
                requests,
                fetched,
                reported,
            },
            other if other.is_retryable() => RosterError::Transient(other.to_string()),
            other => RosterError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_classification() {
        assert!(RosterError::Transient("timeout".into()).is_retryable());
        assert!(!RosterError::DuplicateSlot.is_retryable());
        assert!(!RosterError::MissingReason("override").is_retryable());
        assert!(!RosterError::not_found("day", "2031-01-01").is_retryable());
    }

    #[test]
    fn test_pagination_error_promoted_from_store() {
        let err = RosterError::from(StoreError::PaginationExceeded {
            requests: 50,
            fetched: 100,
            reported: 5000,
        });
        assert!(matches!(err, RosterError::PaginationExceeded { requests: 50, .. }));
    }
}
