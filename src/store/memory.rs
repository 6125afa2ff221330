//! In-memory ledger store
//!
//! Same contract as the Postgres adapter: writes are staged inside the unit
//! of work and applied at commit after a compare-and-swap on every version
//! and a uniqueness check on idempotency keys and wallet owners. Used by the
//! test suite and for running the service without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Transaction, Wallet};
use crate::domain::LedgerEvent;
use crate::outbox::OutboxEvent;

use super::{
    EventPublisher, LedgerReader, LedgerTx, OutboxStore, StoreError, TransactionRepository,
    UnitOfWork, WalletRepository,
};

/// Failure to inject into the next unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The nth wallet save (1-based) fails, simulating a crash mid-write
    WalletSave(usize),
    /// The next outbox append fails
    Publish,
    /// Commit fails before anything is applied
    Commit,
    /// Commit stalls for the given time before applying
    SlowCommit(Duration),
    /// Every wallet save stalls for the given time
    SlowWrite(Duration),
}

#[derive(Debug, Default)]
struct MemoryState {
    wallets: HashMap<Uuid, Wallet>,
    transactions: HashMap<Uuid, Transaction>,
    outbox: Vec<OutboxEvent>,
}

/// Shared in-memory ledger; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<MemoryState>>,
    fault: Arc<Mutex<Option<Fault>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a fault for the next unit of work that begins
    pub async fn inject_fault(&self, fault: Fault) {
        *self.fault.lock().await = Some(fault);
    }

    /// All outbox rows, published or not, in insertion order
    pub async fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.state.lock().await.outbox.clone()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

#[async_trait]
impl UnitOfWork for InMemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let fault = self.fault.lock().await.take();
        Ok(Box::new(MemoryTx {
            ledger: self.clone(),
            fault,
            wallet_saves: 0,
            wallets: HashMap::new(),
            transactions: HashMap::new(),
            outbox: Vec::new(),
        }))
    }
}

#[async_trait]
impl LedgerReader for InMemoryLedger {
    async fn get_wallet(&self, id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.state.lock().await.wallets.get(&id).cloned())
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        Ok(self.state.lock().await.transactions.get(&id).cloned())
    }

    async fn get_transaction_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .find(|t| t.idempotency_key() == idempotency_key)
            .cloned())
    }
}

#[async_trait]
impl OutboxStore for InMemoryLedger {
    async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxEvent>, StoreError> {
        let state = self.state.lock().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state
            .outbox
            .iter()
            .filter(|e| !e.is_published())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut marked = 0;
        for event in state.outbox.iter_mut() {
            if event.published_at.is_none() && ids.contains(&event.id) {
                event.published_at = Some(at);
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn purge_published(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.outbox.len();
        state
            .outbox
            .retain(|e| !matches!(e.published_at, Some(at) if at <= older_than));
        Ok((before - state.outbox.len()) as u64)
    }
}

// =========================================================================
// Unit of work
// =========================================================================

struct MemoryTx {
    ledger: InMemoryLedger,
    fault: Option<Fault>,
    wallet_saves: usize,
    wallets: HashMap<Uuid, Wallet>,
    transactions: HashMap<Uuid, Transaction>,
    outbox: Vec<OutboxEvent>,
}

impl MemoryTx {
    fn injected(what: &str) -> StoreError {
        StoreError::Unavailable(format!("injected fault: {}", what))
    }

    /// Check every staged write against committed state
    fn validate(&self, state: &MemoryState) -> Result<(), StoreError> {
        // Key uniqueness first: a lost idempotency race must surface as such
        for transaction in self.transactions.values() {
            match state.transactions.get(&transaction.id()) {
                None if transaction.is_new() => {
                    let duplicate = state
                        .transactions
                        .values()
                        .any(|t| t.idempotency_key() == transaction.idempotency_key());
                    if duplicate {
                        return Err(StoreError::IdempotencyKeyExists(
                            transaction.idempotency_key().to_string(),
                        ));
                    }
                }
                Some(current)
                    if !transaction.is_new()
                        && current.version() == transaction.persisted_version() => {}
                _ => {
                    return Err(StoreError::Conflict {
                        aggregate_type: Transaction::aggregate_type(),
                        aggregate_id: transaction.id(),
                        expected: transaction.persisted_version(),
                    })
                }
            }
        }

        for wallet in self.wallets.values() {
            match state.wallets.get(&wallet.id()) {
                None if wallet.is_new() => {
                    let duplicate = state.wallets.values().any(|w| {
                        w.owner_user_id() == wallet.owner_user_id()
                            && w.currency() == wallet.currency()
                    });
                    if duplicate {
                        return Err(StoreError::WalletAlreadyExists {
                            owner_user_id: wallet.owner_user_id(),
                            currency: wallet.currency().to_string(),
                        });
                    }
                }
                Some(current) if !wallet.is_new() && current.version() == wallet.persisted_version() => {}
                _ => {
                    return Err(StoreError::Conflict {
                        aggregate_type: Wallet::aggregate_type(),
                        aggregate_id: wallet.id(),
                        expected: wallet.persisted_version(),
                    })
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl WalletRepository for MemoryTx {
    async fn find_wallet(&mut self, id: Uuid) -> Result<Option<Wallet>, StoreError> {
        if let Some(staged) = self.wallets.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.ledger.state.lock().await.wallets.get(&id).cloned())
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError> {
        self.wallet_saves += 1;
        match self.fault {
            Some(Fault::WalletSave(n)) if n == self.wallet_saves => {
                return Err(Self::injected("wallet save"));
            }
            Some(Fault::SlowWrite(delay)) => tokio::time::sleep(delay).await,
            _ => {}
        }
        self.wallets.insert(wallet.id(), wallet.clone());
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for MemoryTx {
    async fn find_transaction(&mut self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        if let Some(staged) = self.transactions.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.ledger.state.lock().await.transactions.get(&id).cloned())
    }

    async fn find_transaction_by_key(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        if let Some(staged) = self
            .transactions
            .values()
            .find(|t| t.idempotency_key() == idempotency_key)
        {
            return Ok(Some(staged.clone()));
        }
        self.ledger.get_transaction_by_key(idempotency_key).await
    }

    async fn save_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        self.transactions
            .insert(transaction.id(), transaction.clone());
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for MemoryTx {
    async fn publish(&mut self, event: &LedgerEvent) -> Result<(), StoreError> {
        if self.fault == Some(Fault::Publish) {
            return Err(Self::injected("outbox append"));
        }
        self.outbox.push(OutboxEvent::from_event(event)?);
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        // Let concurrent units of work interleave between read and commit
        tokio::task::yield_now().await;

        match self.fault {
            Some(Fault::Commit) => return Err(Self::injected("commit")),
            Some(Fault::SlowCommit(delay)) => tokio::time::sleep(delay).await,
            _ => {}
        }

        let shared = Arc::clone(&self.ledger.state);
        let mut state = shared.lock().await;
        self.validate(&state)?;

        let this = *self;
        for (id, mut wallet) in this.wallets {
            wallet.mark_persisted();
            state.wallets.insert(id, wallet);
        }
        for (id, mut transaction) in this.transactions {
            transaction.mark_persisted();
            state.transactions.insert(id, transaction);
        }
        state.outbox.extend(this.outbox);

        Ok(())
    }
}
