//! Payout Handlers
//!
//! A PAYOUT is two-phase. Submitting it moves the amount from available to
//! reserved and leaves the transaction PROCESSING; settlement either consumes
//! the hold (COMPLETED) or releases it (FAILED).

use std::sync::Arc;

use crate::aggregate::{Aggregate, NewTransaction, Transaction, TransactionStatus, TransactionType};
use crate::domain::{DomainError, Money, OperationContext};
use crate::store::LedgerStore;

use super::pipeline::{load_wallet, submit, with_deadline, Staged};
use super::{LedgerError, PayoutOutcome, SettlePayoutCommand, WalletMovementCommand};

/// Handler for placing a payout hold
pub struct PayoutHandler {
    store: Arc<dyn LedgerStore>,
}

impl PayoutHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn execute(
        &self,
        command: WalletMovementCommand,
        context: &OperationContext,
    ) -> Result<Transaction, LedgerError> {
        let request = NewTransaction {
            transaction_type: TransactionType::Payout,
            source_wallet_id: Some(command.wallet_id),
            destination_wallet_id: None,
            amount: Money::parse(&command.amount, &command.currency)?,
            idempotency_key: command.idempotency_key,
            description: command.description,
            external_reference: None,
        };

        submit(self.store.as_ref(), request, context).await
    }
}

/// Handler for the external confirmation of a held payout
pub struct SettlePayoutHandler {
    store: Arc<dyn LedgerStore>,
}

impl SettlePayoutHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn execute(
        &self,
        command: SettlePayoutCommand,
        context: &OperationContext,
    ) -> Result<Transaction, LedgerError> {
        let transaction_id = command.transaction_id;

        let mut transaction = with_deadline(context, async {
            let mut tx = self.store.begin().await?;
            let mut transaction = tx
                .find_transaction(transaction_id)
                .await?
                .ok_or(LedgerError::TransactionNotFound(transaction_id))?;

            if transaction.transaction_type() != TransactionType::Payout {
                return Err(LedgerError::InvalidRequest(format!(
                    "transaction {} is a {}, not a PAYOUT",
                    transaction_id,
                    transaction.transaction_type()
                )));
            }
            if transaction.status() != TransactionStatus::Processing {
                return Err(
                    DomainError::invalid_transaction_state(transaction.status(), "settle").into(),
                );
            }

            let wallet_id = transaction.source_wallet_id().ok_or_else(|| {
                LedgerError::InvalidRequest(format!("payout {transaction_id} has no source wallet"))
            })?;
            let mut wallet = load_wallet(tx.as_mut(), wallet_id).await?;
            let amount = *transaction.amount();

            let mut events = Vec::with_capacity(2);
            match &command.outcome {
                PayoutOutcome::Confirmed => {
                    events.push(wallet.settle_reserved(&amount, transaction_id)?);
                    transaction.mark_completed()?;
                }
                PayoutOutcome::Rejected { reason } => {
                    events.push(wallet.release(&amount, transaction_id)?);
                    events.push(transaction.mark_failed(format!("payout_rejected: {reason}"))?);
                }
            }

            tx.save_wallet(&wallet).await?;
            tx.save_transaction(&transaction).await?;
            for event in &events {
                tx.publish(event).await?;
            }
            Ok::<_, LedgerError>(Staged::Commit(tx, transaction))
        })
        .await?;
        transaction.mark_persisted();

        tracing::info!(
            transaction_id = %transaction.id(),
            status = %transaction.status(),
            amount = %transaction.amount(),
            correlation_id = ?context.correlation_id,
            "Payout settled"
        );

        Ok(transaction)
    }
}
