//! Store module
//!
//! Persistence ports and their adapters. A unit of work is opened with
//! [`UnitOfWork::begin`]; everything written through the returned
//! [`LedgerTx`] becomes visible atomically on [`LedgerTx::commit`]. Dropping
//! the handle without committing rolls the whole unit back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::aggregate::{Transaction, Wallet};
use crate::domain::LedgerEvent;
use crate::outbox::OutboxEvent;

mod error;
pub mod memory;
pub mod postgres;

pub use error::StoreError;
pub use memory::{Fault, InMemoryLedger};
pub use postgres::PgLedger;

/// Wallet persistence inside a unit of work
#[async_trait]
pub trait WalletRepository: Send {
    /// Load a wallet, locking it until the unit of work ends
    async fn find_wallet(&mut self, id: Uuid) -> Result<Option<Wallet>, StoreError>;

    /// Insert a new wallet, or compare-and-swap an existing one against the
    /// version it was loaded at
    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError>;
}

/// Transaction persistence inside a unit of work
#[async_trait]
pub trait TransactionRepository: Send {
    async fn find_transaction(&mut self, id: Uuid) -> Result<Option<Transaction>, StoreError>;

    async fn find_transaction_by_key(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Insert (unique idempotency key) or compare-and-swap update
    async fn save_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError>;
}

/// Appends events to the outbox of the current unit of work
#[async_trait]
pub trait EventPublisher: Send {
    async fn publish(&mut self, event: &LedgerEvent) -> Result<(), StoreError>;
}

/// An open unit of work
#[async_trait]
pub trait LedgerTx: WalletRepository + TransactionRepository + EventPublisher {
    /// Make every staged write visible at once
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Opens units of work
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;
}

/// Non-locking reads of committed state
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn get_wallet(&self, id: Uuid) -> Result<Option<Wallet>, StoreError>;

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError>;

    async fn get_transaction_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Transaction>, StoreError>;
}

/// Access used by the outbox dispatcher; never called by the ledger core
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest unpublished events first
    async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxEvent>, StoreError>;

    async fn mark_published(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Delete published events older than the cutoff
    async fn purge_published(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Everything the application needs from a backend
pub trait LedgerStore: UnitOfWork + LedgerReader + OutboxStore {}

impl<T: UnitOfWork + LedgerReader + OutboxStore> LedgerStore for T {}
