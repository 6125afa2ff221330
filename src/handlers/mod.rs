//! Command Handlers module
//!
//! Use cases over wallets and transactions. Each handler opens one unit of
//! work, mutates aggregates, appends outbox events and commits.

mod commands;
mod credit_handler;
mod error;
mod payout_handler;
mod pipeline;
mod query_handler;
mod transaction_handler;
mod transfer_handler;
mod wallet_handler;


pub use commands::*;
pub use credit_handler::{CreditWalletHandler, DebitWalletHandler};
pub use error::LedgerError;
pub use payout_handler::{PayoutHandler, SettlePayoutHandler};
pub use query_handler::LedgerQueryHandler;
pub use transaction_handler::{
    CancelTransactionHandler, CreateTransactionHandler, ProcessTransactionHandler,
};
pub use transfer_handler::TransferHandler;
pub use wallet_handler::{ChangeWalletStatusHandler, CreateWalletHandler};
