//! Mutation pipeline
//!
//! The path every money-moving use case goes through: idempotency check,
//! one unit of work under the caller's deadline, wallet mutation, outbox
//! append, compare-and-swap saves, commit.

use std::future::Future;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Movement, NewTransaction, Transaction, TransactionStatus, Wallet};
use crate::domain::{DomainError, LedgerEvent, Money, OperationContext};
use crate::store::{LedgerStore, LedgerTx, StoreError};

use super::LedgerError;

/// What a unit of work leaves for [`with_deadline`] to finish
pub(crate) enum Staged<T> {
    /// Writes pending on an open unit of work
    Commit(Box<dyn LedgerTx>, T),
    /// Nothing to write; the unit of work, if any, is dropped
    Skip(T),
}

/// Stage a unit of work under the context deadline, then commit it.
///
/// The deadline bounds everything up to the commit call. When it passes first
/// the work future is dropped, and with it the open unit of work, so nothing is
/// committed. A commit that has started is not cut short, so
/// `DeadlineExceeded` always means no write landed.
pub(crate) async fn with_deadline<T, F>(context: &OperationContext, work: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<Staged<T>, LedgerError>>,
{
    let staged = match context.deadline {
        None => work.await?,
        Some(deadline) => match tokio::time::timeout_at(deadline, work).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    correlation_id = ?context.correlation_id,
                    "Deadline exceeded, unit of work rolled back"
                );
                return Err(LedgerError::DeadlineExceeded);
            }
        },
    };

    match staged {
        Staged::Commit(tx, value) => {
            tx.commit().await?;
            Ok(value)
        }
        Staged::Skip(value) => Ok(value),
    }
}

/// Return the stored transaction for a repeated key, if the request matches it
pub(crate) fn replay(existing: Transaction, request: &NewTransaction) -> Result<Transaction, LedgerError> {
    if !existing.matches_request(request) {
        return Err(LedgerError::IdempotencyKeyReused(
            request.idempotency_key.clone(),
        ));
    }

    tracing::info!(
        transaction_id = %existing.id(),
        idempotency_key = %request.idempotency_key,
        status = %existing.status(),
        "Idempotent replay"
    );
    Ok(existing)
}

/// Result of driving a transaction through its wallet mutation
#[derive(Debug)]
pub(crate) enum MovementOutcome {
    Completed,
    /// PAYOUT funds reserved, waiting for settlement
    Held,
    /// Business rule rejected the mutation; transaction marked FAILED
    Failed(DomainError),
}

/// Load a wallet inside the unit of work (locking it)
pub(crate) async fn load_wallet(tx: &mut dyn LedgerTx, wallet_id: Uuid) -> Result<Wallet, LedgerError> {
    tx.find_wallet(wallet_id)
        .await?
        .ok_or(LedgerError::WalletNotFound(wallet_id))
}

/// Load both sides of a transfer, always locking the lower id first
async fn load_pair(
    tx: &mut dyn LedgerTx,
    source: Uuid,
    destination: Uuid,
) -> Result<(Wallet, Wallet), LedgerError> {
    if source < destination {
        let source = load_wallet(tx, source).await?;
        let destination = load_wallet(tx, destination).await?;
        Ok((source, destination))
    } else {
        let destination = load_wallet(tx, destination).await?;
        let source = load_wallet(tx, source).await?;
        Ok((source, destination))
    }
}

fn transfer(
    source: &mut Wallet,
    destination: &mut Wallet,
    amount: &Money,
    transaction_id: Uuid,
) -> Result<Vec<LedgerEvent>, DomainError> {
    if source.currency() != destination.currency() {
        return Err(DomainError::CurrencyMismatch {
            expected: source.currency(),
            found: destination.currency(),
        });
    }

    let debited = source.debit(amount, transaction_id)?;
    let credited = destination.credit(amount, transaction_id)?;
    Ok(vec![debited, credited])
}

/// Drive a PROCESSING transaction through its wallet mutation.
///
/// On success the wallets and their events are staged and the transaction is
/// completed (or left PROCESSING for a held PAYOUT). On a business rule
/// failure no wallet is staged and the transaction is marked FAILED. The
/// caller still has to save the transaction and commit.
pub(crate) async fn apply_movement(
    tx: &mut dyn LedgerTx,
    transaction: &mut Transaction,
) -> Result<MovementOutcome, LedgerError> {
    let movement = transaction.movement()?;
    let amount = *transaction.amount();
    let transaction_id = transaction.id();

    let (wallets, result) = match movement {
        Movement::Credit { wallet_id } => {
            let mut wallet = load_wallet(tx, wallet_id).await?;
            let result = wallet.credit(&amount, transaction_id).map(|e| vec![e]);
            (vec![wallet], result)
        }
        Movement::Debit { wallet_id } => {
            let mut wallet = load_wallet(tx, wallet_id).await?;
            let result = wallet.debit(&amount, transaction_id).map(|e| vec![e]);
            (vec![wallet], result)
        }
        Movement::Hold { wallet_id } => {
            let mut wallet = load_wallet(tx, wallet_id).await?;
            let result = wallet.reserve(&amount, transaction_id).map(|e| vec![e]);
            (vec![wallet], result)
        }
        Movement::Transfer {
            source,
            destination,
        } => {
            let (mut source, mut destination) = load_pair(tx, source, destination).await?;
            let result = transfer(&mut source, &mut destination, &amount, transaction_id);
            (vec![source, destination], result)
        }
    };

    match result {
        Ok(events) => {
            for wallet in &wallets {
                tx.save_wallet(wallet).await?;
            }
            for event in &events {
                tx.publish(event).await?;
            }

            if let Movement::Hold { .. } = movement {
                return Ok(MovementOutcome::Held);
            }
            transaction.mark_completed()?;
            Ok(MovementOutcome::Completed)
        }
        Err(reason) => {
            let event = transaction.mark_failed(reason.failure_reason())?;
            tx.publish(&event).await?;
            Ok(MovementOutcome::Failed(reason))
        }
    }
}

/// Turn a committed outcome into the use case result
pub(crate) fn conclude(
    transaction: Transaction,
    outcome: MovementOutcome,
) -> Result<Transaction, LedgerError> {
    match outcome {
        MovementOutcome::Completed | MovementOutcome::Held => {
            tracing::info!(
                transaction_id = %transaction.id(),
                transaction_type = %transaction.transaction_type(),
                status = %transaction.status(),
                amount = %transaction.amount(),
                "Transaction applied"
            );
            Ok(transaction)
        }
        MovementOutcome::Failed(reason) => {
            tracing::warn!(
                transaction_id = %transaction.id(),
                transaction_type = %transaction.transaction_type(),
                reason = %reason,
                "Transaction failed"
            );
            Err(LedgerError::Rejected {
                transaction: Box::new(transaction),
                reason,
            })
        }
    }
}

/// Create a transaction and apply it in one unit of work, idempotent by key
pub(crate) async fn submit(
    store: &dyn LedgerStore,
    request: NewTransaction,
    context: &OperationContext,
) -> Result<Transaction, LedgerError> {
    // Malformed input never opens a unit of work
    request.movement()?;

    if let Some(existing) = store.get_transaction_by_key(&request.idempotency_key).await? {
        return replay(existing, &request);
    }

    let result = with_deadline(context, async {
        let mut tx = store.begin().await?;

        // Re-check under the unit of work; another request may have committed
        if let Some(existing) = tx.find_transaction_by_key(&request.idempotency_key).await? {
            return Ok(Staged::Skip((existing, None)));
        }

        let mut transaction = Transaction::create(request.clone())?;
        transaction.start_processing()?;
        let outcome = apply_movement(tx.as_mut(), &mut transaction).await?;

        tx.save_transaction(&transaction).await?;
        Ok::<_, LedgerError>(Staged::Commit(tx, (transaction, Some(outcome))))
    })
    .await;

    match result {
        Ok((mut transaction, Some(outcome))) => {
            transaction.mark_persisted();
            conclude(transaction, outcome)
        }
        Ok((existing, None)) => replay(existing, &request),
        Err(LedgerError::Store(StoreError::IdempotencyKeyExists(_))) => {
            replay_winner(store, &request).await
        }
        Err(e) => Err(e),
    }
}

/// Lost the race for a key: the committed winner is the answer
pub(crate) async fn replay_winner(
    store: &dyn LedgerStore,
    request: &NewTransaction,
) -> Result<Transaction, LedgerError> {
    let existing = store
        .get_transaction_by_key(&request.idempotency_key)
        .await?
        .ok_or_else(|| LedgerError::IdempotencyKeyNotFound(request.idempotency_key.clone()))?;
    replay(existing, request)
}

/// How an existing transaction is re-driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Redrive {
    /// PENDING -> PROCESSING
    Process,
    /// FAILED -> PROCESSING
    Retry,
}

/// Push an existing transaction through the mutation path
pub(crate) async fn redrive(
    store: &dyn LedgerStore,
    transaction_id: Uuid,
    mode: Redrive,
    context: &OperationContext,
) -> Result<Transaction, LedgerError> {
    let (mut transaction, outcome) = with_deadline(context, async {
        let mut tx = store.begin().await?;
        let mut transaction = tx
            .find_transaction(transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;

        match mode {
            Redrive::Process if transaction.status() != TransactionStatus::Pending => {
                return Err(
                    DomainError::invalid_transaction_state(transaction.status(), "process").into(),
                );
            }
            Redrive::Process => transaction.start_processing()?,
            Redrive::Retry => transaction.retry()?,
        }

        let outcome = apply_movement(tx.as_mut(), &mut transaction).await?;
        tx.save_transaction(&transaction).await?;
        Ok::<_, LedgerError>(Staged::Commit(tx, (transaction, outcome)))
    })
    .await?;
    transaction.mark_persisted();

    conclude(transaction, outcome)
}
