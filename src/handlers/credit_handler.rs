//! Credit / Debit Handlers
//!
//! Single-wallet money movements. A credit is recorded as a DEPOSIT and a
//! debit as a WITHDRAW, both applied immediately.

use std::sync::Arc;

use crate::aggregate::{NewTransaction, Transaction, TransactionType};
use crate::domain::{Money, OperationContext};
use crate::store::LedgerStore;

use super::pipeline::submit;
use super::{LedgerError, WalletMovementCommand};

/// Handler for crediting a wallet
pub struct CreditWalletHandler {
    store: Arc<dyn LedgerStore>,
}

impl CreditWalletHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn execute(
        &self,
        command: WalletMovementCommand,
        context: &OperationContext,
    ) -> Result<Transaction, LedgerError> {
        let amount = Money::parse(&command.amount, &command.currency)?;

        tracing::debug!(
            wallet_id = %command.wallet_id,
            idempotency_key = %command.idempotency_key,
            %amount,
            "Credit requested"
        );

        let request = NewTransaction {
            transaction_type: TransactionType::Deposit,
            source_wallet_id: None,
            destination_wallet_id: Some(command.wallet_id),
            amount,
            idempotency_key: command.idempotency_key,
            description: command.description,
            external_reference: None,
        };

        submit(self.store.as_ref(), request, context).await
    }
}

/// Handler for debiting a wallet
pub struct DebitWalletHandler {
    store: Arc<dyn LedgerStore>,
}

impl DebitWalletHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Insufficient balance is recorded as a FAILED transaction and returned
    /// as [`LedgerError::Rejected`]
    pub async fn execute(
        &self,
        command: WalletMovementCommand,
        context: &OperationContext,
    ) -> Result<Transaction, LedgerError> {
        let amount = Money::parse(&command.amount, &command.currency)?;

        tracing::debug!(
            wallet_id = %command.wallet_id,
            idempotency_key = %command.idempotency_key,
            %amount,
            "Debit requested"
        );

        let request = NewTransaction {
            transaction_type: TransactionType::Withdraw,
            source_wallet_id: Some(command.wallet_id),
            destination_wallet_id: None,
            amount,
            idempotency_key: command.idempotency_key,
            description: command.description,
            external_reference: None,
        };

        submit(self.store.as_ref(), request, context).await
    }
}
