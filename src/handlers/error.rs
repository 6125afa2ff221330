//! Ledger Errors
//!
//! Every use case returns [`LedgerError`]; callers branch on
//! [`LedgerError::kind`] rather than on concrete variants.

use uuid::Uuid;

use crate::aggregate::transaction::TransactionValidationError;
use crate::aggregate::{Aggregate, Transaction};
use crate::domain::{AmountError, DomainError, ErrorKind};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    // Validation
    #[error(transparent)]
    InvalidAmount(#[from] AmountError),

    #[error(transparent)]
    InvalidTransaction(#[from] TransactionValidationError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Business rules
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Business rule failure recorded on a FAILED transaction
    #[error("Transaction {} rejected: {reason}", .transaction.id())]
    Rejected {
        transaction: Box<Transaction>,
        reason: DomainError,
    },

    // Not found
    #[error("Wallet not found: {0}")]
    WalletNotFound(Uuid),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("No transaction for idempotency key: {0}")]
    IdempotencyKeyNotFound(String),

    // Conflicts
    #[error("Wallet already exists for owner {owner_user_id} in {currency}")]
    WalletAlreadyExists { owner_user_id: Uuid, currency: String },

    #[error("Idempotency key reused with a different request: {0}")]
    IdempotencyKeyReused(String),

    #[error("Concurrent modification of {aggregate_type} {aggregate_id}, retry the request")]
    Concurrency {
        aggregate_type: &'static str,
        aggregate_id: Uuid,
    },

    #[error("Deadline exceeded before commit")]
    DeadlineExceeded,

    // Infrastructure
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                aggregate_type,
                aggregate_id,
                ..
            } => LedgerError::Concurrency {
                aggregate_type,
                aggregate_id,
            },
            StoreError::WalletAlreadyExists {
                owner_user_id,
                currency,
            } => LedgerError::WalletAlreadyExists {
                owner_user_id,
                currency,
            },
            other => LedgerError::Store(other),
        }
    }
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidTransaction(_)
            | LedgerError::InvalidRequest(_) => ErrorKind::Validation,
            LedgerError::Domain(_) | LedgerError::Rejected { .. } => ErrorKind::BusinessRule,
            LedgerError::WalletNotFound(_)
            | LedgerError::TransactionNotFound(_)
            | LedgerError::IdempotencyKeyNotFound(_) => ErrorKind::NotFound,
            LedgerError::WalletAlreadyExists { .. } | LedgerError::IdempotencyKeyReused(_) => {
                ErrorKind::Conflict
            }
            LedgerError::Concurrency { .. } => ErrorKind::Concurrency,
            LedgerError::DeadlineExceeded => ErrorKind::Timeout,
            LedgerError::Store(StoreError::IdempotencyKeyExists(_)) => ErrorKind::Conflict,
            LedgerError::Store(_) => ErrorKind::Infrastructure,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::InvalidTransaction(_) => "invalid_transaction",
            LedgerError::InvalidRequest(_) => "invalid_request",
            LedgerError::Domain(e) => e.code(),
            LedgerError::Rejected { reason, .. } => reason.code(),
            LedgerError::WalletNotFound(_) => "wallet_not_found",
            LedgerError::TransactionNotFound(_) => "transaction_not_found",
            LedgerError::IdempotencyKeyNotFound(_) => "idempotency_key_not_found",
            LedgerError::WalletAlreadyExists { .. } => "wallet_already_exists",
            LedgerError::IdempotencyKeyReused(_) => "idempotency_key_reused",
            LedgerError::Concurrency { .. } => "concurrency_conflict",
            LedgerError::DeadlineExceeded => "deadline_exceeded",
            LedgerError::Store(StoreError::IdempotencyKeyExists(_)) => "idempotency_key_exists",
            LedgerError::Store(_) => "store_error",
        }
    }

    /// The business rule behind a rejection, recorded or not
    pub fn domain_error(&self) -> Option<&DomainError> {
        match self {
            LedgerError::Domain(e) | LedgerError::Rejected { reason: e, .. } => Some(e),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_store_conflict_becomes_concurrency() {
        let err: LedgerError = StoreError::Conflict {
            aggregate_type: "Wallet",
            aggregate_id: Uuid::new_v4(),
            expected: 2,
        }
        .into();

        assert_eq!(err.kind(), ErrorKind::Concurrency);
        assert!(err.is_retryable());
        assert_eq!(err.code(), "concurrency_conflict");
    }

    #[test]
    fn test_kinds() {
        let insufficient: LedgerError =
            DomainError::insufficient_balance(Decimal::ONE, Decimal::ZERO).into();
        assert_eq!(insufficient.kind(), ErrorKind::BusinessRule);
        assert_eq!(insufficient.code(), "insufficient_balance");
        assert!(!insufficient.is_retryable());

        let amount: LedgerError = AmountError::InvalidFormat("1e5".to_string()).into();
        assert_eq!(amount.kind(), ErrorKind::Validation);

        assert_eq!(
            LedgerError::WalletNotFound(Uuid::new_v4()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LedgerError::IdempotencyKeyReused("k".to_string()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(LedgerError::DeadlineExceeded.kind(), ErrorKind::Timeout);
        assert_eq!(
            LedgerError::from(StoreError::Unavailable("down".to_string())).kind(),
            ErrorKind::Infrastructure
        );
    }
}
