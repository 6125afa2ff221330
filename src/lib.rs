//! wallet_ledger Library
//!
//! Wallet ledger core for a payment gateway: wallets, idempotent money
//! movements, optimistic concurrency and a transactional outbox.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod handlers;
pub mod jobs;
pub mod outbox;
pub mod store;

pub use config::{Config, LogFormat};
pub use domain::{AmountError, Currency, DomainError, ErrorKind, Money, OperationContext};
pub use error::{status_for, AppError, AppResult, ErrorResponse};
pub use handlers::LedgerError;
