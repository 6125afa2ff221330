//! Command definitions
//!
//! Commands represent intentions to change the ledger. Amounts travel as
//! strings and are parsed strictly by the handlers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::TransactionType;

// =========================================================================
// Wallet commands
// =========================================================================

/// Command to open a wallet for an owner in one currency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWalletCommand {
    pub owner_user_id: Uuid,
    pub currency: String,
}

impl CreateWalletCommand {
    pub fn new(owner_user_id: Uuid, currency: impl Into<String>) -> Self {
        Self {
            owner_user_id,
            currency: currency.into(),
        }
    }
}

/// Administrative wallet status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletAction {
    Suspend,
    Lock,
    Reactivate,
    Close,
}

/// Command to change a wallet's status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeWalletStatusCommand {
    pub wallet_id: Uuid,
    pub action: WalletAction,
}

impl ChangeWalletStatusCommand {
    pub fn new(wallet_id: Uuid, action: WalletAction) -> Self {
        Self { wallet_id, action }
    }
}

// =========================================================================
// Money movement commands
// =========================================================================

/// Command to credit (DEPOSIT) or debit (WITHDRAW) a single wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletMovementCommand {
    pub wallet_id: Uuid,
    /// Amount as a decimal string
    pub amount: String,
    pub currency: String,
    pub idempotency_key: String,
    pub description: String,
}

impl WalletMovementCommand {
    pub fn new(
        wallet_id: Uuid,
        amount: impl Into<String>,
        currency: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            wallet_id,
            amount: amount.into(),
            currency: currency.into(),
            idempotency_key: idempotency_key.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Command to move money between two wallets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub source_wallet_id: Uuid,
    pub destination_wallet_id: Uuid,
    pub amount: String,
    pub currency: String,
    pub idempotency_key: String,
    pub description: String,
}

impl TransferCommand {
    pub fn new(
        source_wallet_id: Uuid,
        destination_wallet_id: Uuid,
        amount: impl Into<String>,
        currency: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            source_wallet_id,
            destination_wallet_id,
            amount: amount.into(),
            currency: currency.into(),
            idempotency_key: idempotency_key.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// =========================================================================
// Transaction commands
// =========================================================================

/// Command to record a PENDING transaction without touching balances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransactionCommand {
    pub transaction_type: TransactionType,
    pub source_wallet_id: Option<Uuid>,
    pub destination_wallet_id: Option<Uuid>,
    pub amount: String,
    pub currency: String,
    pub idempotency_key: String,
    #[serde(default)]
    pub description: String,
    pub external_reference: Option<String>,
}

/// Command to cancel a PENDING or FAILED transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelTransactionCommand {
    pub transaction_id: Uuid,
    pub reason: String,
}

impl CancelTransactionCommand {
    pub fn new(transaction_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            transaction_id,
            reason: reason.into(),
        }
    }
}

/// External confirmation result for a held PAYOUT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PayoutOutcome {
    /// Rail confirmed: consume the hold
    Confirmed,
    /// Rail rejected: release the hold back to available
    Rejected { reason: String },
}

/// Command to settle a PAYOUT held in PROCESSING
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlePayoutCommand {
    pub transaction_id: Uuid,
    pub outcome: PayoutOutcome,
}

impl SettlePayoutCommand {
    pub fn confirmed(transaction_id: Uuid) -> Self {
        Self {
            transaction_id,
            outcome: PayoutOutcome::Confirmed,
        }
    }

    pub fn rejected(transaction_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            transaction_id,
            outcome: PayoutOutcome::Rejected {
                reason: reason.into(),
            },
        }
    }
}
