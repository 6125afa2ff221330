//! Store Errors
//!
//! Error types for persistence operations.

use uuid::Uuid;

/// Errors that can occur in the ledger store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict: the row moved past the version we read
    #[error("Concurrency conflict for {aggregate_type} {aggregate_id}: expected version {expected}")]
    Conflict {
        aggregate_type: &'static str,
        aggregate_id: Uuid,
        expected: i64,
    },

    /// Another transaction already owns this idempotency key
    #[error("Idempotency key already exists: {0}")]
    IdempotencyKeyExists(String),

    /// One wallet per owner per currency
    #[error("Wallet already exists for owner {owner_user_id} in {currency}")]
    WalletAlreadyExists { owner_user_id: Uuid, currency: String },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored row could not be turned back into a domain value
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Backend unavailable (also used for injected faults)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
