//! Domain module
//!
//! Core domain types and business rules.

pub mod context;
pub mod error;
pub mod events;
pub mod money;

pub use context::OperationContext;
pub use error::{DomainError, ErrorKind};
pub use events::{LedgerEvent, TRANSACTION_AGGREGATE, WALLET_AGGREGATE};
pub use money::{parse_decimal, AmountError, Currency, Money};
