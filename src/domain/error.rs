//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Currency;

/// Discriminant for every error surfaced by the ledger.
///
/// Callers branch on the kind instead of probing concrete error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, rejected before any unit of work opens
    Validation,
    /// Well-formed request forbidden by domain rules
    BusinessRule,
    /// Optimistic version mismatch
    Concurrency,
    /// Referenced wallet or transaction does not exist
    NotFound,
    /// Uniqueness conflict (duplicate wallet, reused idempotency key)
    Conflict,
    /// Caller deadline expired before commit
    Timeout,
    /// Database or serialization failure
    Infrastructure,
}

impl ErrorKind {
    /// Only optimistic conflicts are safe to retry by re-reading.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Concurrency)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::BusinessRule => "business_rule",
            ErrorKind::Concurrency => "concurrency",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Infrastructure => "infrastructure",
        }
    }
}

/// Business rule violations.
///
/// The operation was well-formed but the ledger's invariants forbid it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Insufficient funds for a debit or reservation
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// Wallet is not ACTIVE
    #[error("Wallet is not active (status {status})")]
    WalletNotActive { status: String },

    /// Money arithmetic across currencies
    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    /// Wallet still holds funds
    #[error("Wallet is not empty: available {available}, reserved {reserved}")]
    WalletNotEmpty {
        available: Decimal,
        reserved: Decimal,
    },

    /// Transaction state machine rejected the transition
    #[error("Invalid transaction state: cannot {action} from {current}")]
    InvalidTransactionState {
        current: String,
        action: &'static str,
    },

    /// Wallet status machine rejected the transition
    #[error("Invalid wallet state: cannot {action} from {current}")]
    InvalidWalletState {
        current: String,
        action: &'static str,
    },

    /// Subtraction would go below zero
    #[error("Negative result: {minuend} - {subtrahend}")]
    NegativeResult {
        minuend: Decimal,
        subtrahend: Decimal,
    },

    /// Decimal arithmetic overflowed
    #[error("Amount overflow")]
    AmountOverflow,
}

impl DomainError {
    /// Create an insufficient balance error
    pub fn insufficient_balance(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientBalance {
            required,
            available,
        }
    }

    pub fn invalid_transaction_state(current: impl ToString, action: &'static str) -> Self {
        Self::InvalidTransactionState {
            current: current.to_string(),
            action,
        }
    }

    pub fn invalid_wallet_state(current: impl ToString, action: &'static str) -> Self {
        Self::InvalidWalletState {
            current: current.to_string(),
            action,
        }
    }

    /// Stable machine-readable code, also stored as the failure reason prefix
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::WalletNotActive { .. } => "wallet_not_active",
            Self::CurrencyMismatch { .. } => "currency_mismatch",
            Self::WalletNotEmpty { .. } => "wallet_not_empty",
            Self::InvalidTransactionState { .. } => "invalid_transaction_state",
            Self::InvalidWalletState { .. } => "invalid_wallet_state",
            Self::NegativeResult { .. } => "negative_result",
            Self::AmountOverflow => "amount_overflow",
        }
    }

    /// Text persisted in `transactions.failure_reason`
    pub fn failure_reason(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}
