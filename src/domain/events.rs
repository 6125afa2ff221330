//! Domain Events
//!
//! Facts published through the outbox after a committed ledger change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Currency, Money};

/// Aggregate type names as stored in `outbox.aggregate_type`
pub const WALLET_AGGREGATE: &str = "Wallet";
pub const TRANSACTION_AGGREGATE: &str = "Transaction";

/// Ledger events written to the outbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    /// Wallet was opened
    WalletCreated {
        wallet_id: Uuid,
        owner_user_id: Uuid,
        currency: Currency,
        created_at: DateTime<Utc>,
    },

    /// Available balance increased
    WalletCredited {
        wallet_id: Uuid,
        transaction_id: Uuid,
        amount: Money,
        balance_after: Money,
        occurred_at: DateTime<Utc>,
    },

    /// Available (or previously reserved) balance decreased
    WalletDebited {
        wallet_id: Uuid,
        transaction_id: Uuid,
        amount: Money,
        balance_after: Money,
        occurred_at: DateTime<Utc>,
    },

    /// Funds moved from available to reserved
    FundsReserved {
        wallet_id: Uuid,
        transaction_id: Uuid,
        amount: Money,
        balance_after: Money,
        reserved_after: Money,
        occurred_at: DateTime<Utc>,
    },

    /// Funds moved from reserved back to available
    FundsReleased {
        wallet_id: Uuid,
        transaction_id: Uuid,
        amount: Money,
        balance_after: Money,
        reserved_after: Money,
        occurred_at: DateTime<Utc>,
    },

    /// Wallet lifecycle status changed
    WalletStatusChanged {
        wallet_id: Uuid,
        from: String,
        to: String,
        occurred_at: DateTime<Utc>,
    },

    /// A transaction was rejected by a business rule
    TransactionFailed {
        transaction_id: Uuid,
        reason: String,
        occurred_at: DateTime<Utc>,
    },

    /// A transaction was cancelled before completion
    TransactionCancelled {
        transaction_id: Uuid,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Get the event type as published on the bus
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::WalletCreated { .. } => "wallet.created",
            LedgerEvent::WalletCredited { .. } => "wallet.credited",
            LedgerEvent::WalletDebited { .. } => "wallet.debited",
            LedgerEvent::FundsReserved { .. } => "wallet.funds_reserved",
            LedgerEvent::FundsReleased { .. } => "wallet.funds_released",
            LedgerEvent::WalletStatusChanged { .. } => "wallet.status_changed",
            LedgerEvent::TransactionFailed { .. } => "transaction.failed",
            LedgerEvent::TransactionCancelled { .. } => "transaction.cancelled",
        }
    }

    /// Aggregate the event belongs to
    pub fn aggregate_type(&self) -> &'static str {
        match self {
            LedgerEvent::TransactionFailed { .. } | LedgerEvent::TransactionCancelled { .. } => {
                TRANSACTION_AGGREGATE
            }
            _ => WALLET_AGGREGATE,
        }
    }

    /// ID of the aggregate the event belongs to
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            LedgerEvent::WalletCreated { wallet_id, .. }
            | LedgerEvent::WalletCredited { wallet_id, .. }
            | LedgerEvent::WalletDebited { wallet_id, .. }
            | LedgerEvent::FundsReserved { wallet_id, .. }
            | LedgerEvent::FundsReleased { wallet_id, .. }
            | LedgerEvent::WalletStatusChanged { wallet_id, .. } => *wallet_id,
            LedgerEvent::TransactionFailed { transaction_id, .. }
            | LedgerEvent::TransactionCancelled { transaction_id, .. } => *transaction_id,
        }
    }

    /// Transaction that caused the event, if any
    pub fn transaction_id(&self) -> Option<Uuid> {
        match self {
            LedgerEvent::WalletCredited { transaction_id, .. }
            | LedgerEvent::WalletDebited { transaction_id, .. }
            | LedgerEvent::FundsReserved { transaction_id, .. }
            | LedgerEvent::FundsReleased { transaction_id, .. }
            | LedgerEvent::TransactionFailed { transaction_id, .. }
            | LedgerEvent::TransactionCancelled { transaction_id, .. } => Some(*transaction_id),
            LedgerEvent::WalletCreated { .. } | LedgerEvent::WalletStatusChanged { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_credited_serialization() {
        let amount = Money::parse("10.00", "USD").unwrap();
        let event = LedgerEvent::WalletCredited {
            wallet_id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            amount,
            balance_after: amount,
            occurred_at: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "WalletCredited");
        assert_eq!(json["amount"]["amount"], "10.00");
        assert_eq!(json["amount"]["currency"], "USD");

        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_routing_fields() {
        let transaction_id = Uuid::new_v4();
        let failed = LedgerEvent::TransactionFailed {
            transaction_id,
            reason: "insufficient_balance".to_string(),
            occurred_at: Utc::now(),
        };
        assert_eq!(failed.event_type(), "transaction.failed");
        assert_eq!(failed.aggregate_type(), TRANSACTION_AGGREGATE);
        assert_eq!(failed.aggregate_id(), transaction_id);
        assert_eq!(failed.transaction_id(), Some(transaction_id));

        let wallet_id = Uuid::new_v4();
        let changed = LedgerEvent::WalletStatusChanged {
            wallet_id,
            from: "ACTIVE".to_string(),
            to: "SUSPENDED".to_string(),
            occurred_at: Utc::now(),
        };
        assert_eq!(changed.aggregate_type(), WALLET_AGGREGATE);
        assert_eq!(changed.aggregate_id(), wallet_id);
        assert_eq!(changed.transaction_id(), None);
    }
}
