//! Aggregate module
//!
//! Wallet and Transaction aggregate roots. Each is persisted independently
//! and carries an integer version used for optimistic concurrency.

pub mod transaction;
pub mod wallet;

pub use transaction::{
    CancelReason, Movement, NewTransaction, Transaction, TransactionStatus, TransactionType,
    TransactionValidationError,
};
pub use wallet::{Wallet, WalletStatus};

/// Aggregate trait that all aggregates must implement
pub trait Aggregate {
    /// Get the aggregate type name (for storage and outbox rows)
    fn aggregate_type() -> &'static str;

    /// Get the aggregate ID
    fn id(&self) -> uuid::Uuid;

    /// Current version, bumped by every mutation
    fn version(&self) -> i64;

    /// Version as last read from (or written to) storage; 0 for a new aggregate
    fn persisted_version(&self) -> i64;

    /// Whether the aggregate has never been stored
    fn is_new(&self) -> bool {
        self.persisted_version() == 0
    }

    /// Whether the aggregate changed since it was loaded
    fn is_dirty(&self) -> bool {
        self.version() != self.persisted_version()
    }
}
