//! Transfer Handler
//!
//! Moves money between two wallets of the same currency. Debit and credit
//! happen inside one unit of work, so a half-done transfer is never visible.

use std::sync::Arc;

use crate::aggregate::{NewTransaction, Transaction, TransactionType};
use crate::domain::{Money, OperationContext};
use crate::store::LedgerStore;

use super::pipeline::submit;
use super::{LedgerError, TransferCommand};

/// Handler for wallet-to-wallet transfers
pub struct TransferHandler {
    store: Arc<dyn LedgerStore>,
}

impl TransferHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Execute the transfer command
    pub async fn execute(
        &self,
        command: TransferCommand,
        context: &OperationContext,
    ) -> Result<Transaction, LedgerError> {
        let amount = Money::parse(&command.amount, &command.currency)?;

        tracing::debug!(
            source_wallet_id = %command.source_wallet_id,
            destination_wallet_id = %command.destination_wallet_id,
            idempotency_key = %command.idempotency_key,
            %amount,
            correlation_id = ?context.correlation_id,
            "Transfer requested"
        );

        // Same-wallet transfers are rejected by the request shape check
        let request = NewTransaction {
            transaction_type: TransactionType::Transfer,
            source_wallet_id: Some(command.source_wallet_id),
            destination_wallet_id: Some(command.destination_wallet_id),
            amount,
            idempotency_key: command.idempotency_key,
            description: command.description,
            external_reference: None,
        };

        submit(self.store.as_ref(), request, context).await
    }
}
