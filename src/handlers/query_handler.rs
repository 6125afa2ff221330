//! Read-side queries over committed state

use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Transaction, Wallet};
use crate::store::LedgerStore;

use super::LedgerError;

pub struct LedgerQueryHandler {
    store: Arc<dyn LedgerStore>,
}

impl LedgerQueryHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn get_wallet(&self, wallet_id: Uuid) -> Result<Wallet, LedgerError> {
        self.store
            .get_wallet(wallet_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(wallet_id))
    }

    pub async fn get_transaction(&self, transaction_id: Uuid) -> Result<Transaction, LedgerError> {
        self.store
            .get_transaction(transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(transaction_id))
    }

    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Transaction, LedgerError> {
        self.store
            .get_transaction_by_key(key)
            .await?
            .ok_or_else(|| LedgerError::IdempotencyKeyNotFound(key.to_string()))
    }
}
