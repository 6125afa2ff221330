//! Transaction Handlers
//!
//! Creating PENDING transactions and moving existing ones through the state
//! machine: process, retry, cancel.

use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Aggregate, CancelReason, NewTransaction, Transaction};
use crate::domain::{Money, OperationContext};
use crate::store::{LedgerStore, StoreError};

use super::pipeline::{redrive, replay, replay_winner, with_deadline, Redrive, Staged};
use super::{CancelTransactionCommand, CreateTransactionCommand, LedgerError};

/// Handler for recording a transaction without applying it
pub struct CreateTransactionHandler {
    store: Arc<dyn LedgerStore>,
}

impl CreateTransactionHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Persist a PENDING transaction, idempotent by key
    pub async fn execute(
        &self,
        command: CreateTransactionCommand,
        context: &OperationContext,
    ) -> Result<Transaction, LedgerError> {
        let request = NewTransaction {
            transaction_type: command.transaction_type,
            source_wallet_id: command.source_wallet_id,
            destination_wallet_id: command.destination_wallet_id,
            amount: Money::parse(&command.amount, &command.currency)?,
            idempotency_key: command.idempotency_key,
            description: command.description,
            external_reference: command.external_reference,
        };
        let transaction = Transaction::create(request.clone())?;

        if let Some(existing) = self
            .store
            .get_transaction_by_key(&request.idempotency_key)
            .await?
        {
            return replay(existing, &request);
        }

        let result = with_deadline(context, async {
            let mut tx = self.store.begin().await?;
            if let Some(existing) = tx.find_transaction_by_key(&request.idempotency_key).await? {
                return Ok(Staged::Skip(Some(existing)));
            }
            tx.save_transaction(&transaction).await?;
            Ok::<_, LedgerError>(Staged::Commit(tx, None))
        })
        .await;

        match result {
            Ok(Some(existing)) => replay(existing, &request),
            Ok(None) => {
                tracing::info!(
                    transaction_id = %transaction.id(),
                    transaction_type = %transaction.transaction_type(),
                    idempotency_key = %transaction.idempotency_key(),
                    correlation_id = ?context.correlation_id,
                    "Transaction recorded"
                );
                let mut transaction = transaction;
                transaction.mark_persisted();
                Ok(transaction)
            }
            Err(LedgerError::Store(StoreError::IdempotencyKeyExists(_))) => {
                replay_winner(self.store.as_ref(), &request).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Handler for processing PENDING and retrying FAILED transactions
pub struct ProcessTransactionHandler {
    store: Arc<dyn LedgerStore>,
}

impl ProcessTransactionHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// PENDING -> apply the wallet mutation
    pub async fn process(
        &self,
        transaction_id: Uuid,
        context: &OperationContext,
    ) -> Result<Transaction, LedgerError> {
        redrive(self.store.as_ref(), transaction_id, Redrive::Process, context).await
    }

    /// FAILED -> apply the wallet mutation again
    pub async fn retry(
        &self,
        transaction_id: Uuid,
        context: &OperationContext,
    ) -> Result<Transaction, LedgerError> {
        tracing::info!(%transaction_id, "Retrying transaction");
        redrive(self.store.as_ref(), transaction_id, Redrive::Retry, context).await
    }
}

/// Handler for cancelling transactions before completion
pub struct CancelTransactionHandler {
    store: Arc<dyn LedgerStore>,
}

impl CancelTransactionHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Cancel a PENDING or FAILED transaction. Completed work is never
    /// reversed here; that takes a new REFUND or ADJUSTMENT.
    pub async fn execute(
        &self,
        command: CancelTransactionCommand,
        context: &OperationContext,
    ) -> Result<Transaction, LedgerError> {
        let reason = CancelReason::new(command.reason)?;
        let transaction_id = command.transaction_id;

        let mut transaction = with_deadline(context, async {
            let mut tx = self.store.begin().await?;
            let mut transaction = tx
                .find_transaction(transaction_id)
                .await?
                .ok_or(LedgerError::TransactionNotFound(transaction_id))?;

            let event = transaction.cancel(&reason)?;
            tx.save_transaction(&transaction).await?;
            tx.publish(&event).await?;
            Ok::<_, LedgerError>(Staged::Commit(tx, transaction))
        })
        .await?;
        transaction.mark_persisted();

        tracing::info!(
            %transaction_id,
            reason = reason.as_str(),
            correlation_id = ?context.correlation_id,
            "Transaction cancelled"
        );

        Ok(transaction)
    }
}
