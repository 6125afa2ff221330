//! PostgreSQL ledger store
//!
//! One database transaction per unit of work. Locking reads use
//! `SELECT ... FOR UPDATE`; saves are explicit compare-and-swap updates on
//! the `version` column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::aggregate::{Aggregate, Transaction, Wallet};
use crate::domain::{Currency, LedgerEvent, Money};
use crate::outbox::OutboxEvent;

use super::{
    EventPublisher, LedgerReader, LedgerTx, OutboxStore, StoreError, TransactionRepository,
    UnitOfWork, WalletRepository,
};

const IDEMPOTENCY_KEY_CONSTRAINT: &str = "transactions_idempotency_key_key";
const WALLET_OWNER_CONSTRAINT: &str = "wallets_owner_user_id_currency_key";

/// Postgres-backed ledger
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Create a new store with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =========================================================================
// Rows
// =========================================================================

#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    owner_user_id: Uuid,
    currency: String,
    available_balance: Decimal,
    reserved_balance: Decimal,
    status: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WalletRow {
    fn into_domain(self) -> Result<Wallet, StoreError> {
        let currency = Currency::parse(&self.currency).map_err(invalid)?;
        let status = self.status.parse().map_err(StoreError::InvalidData)?;
        Wallet::from_db_state(
            self.id,
            self.owner_user_id,
            currency,
            self.available_balance,
            self.reserved_balance,
            status,
            self.version,
            self.created_at,
            self.updated_at,
        )
        .map_err(invalid)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    transaction_type: String,
    status: String,
    source_wallet_id: Option<Uuid>,
    destination_wallet_id: Option<Uuid>,
    amount: Decimal,
    currency: String,
    idempotency_key: String,
    description: String,
    external_reference: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TransactionRow {
    fn into_domain(self) -> Result<Transaction, StoreError> {
        let currency = Currency::parse(&self.currency).map_err(invalid)?;
        let amount = Money::new(self.amount, currency).map_err(invalid)?;
        Ok(Transaction::from_db_state(
            self.id,
            self.transaction_type.parse().map_err(StoreError::InvalidData)?,
            self.status.parse().map_err(StoreError::InvalidData)?,
            self.source_wallet_id,
            self.destination_wallet_id,
            amount,
            self.idempotency_key,
            self.description,
            self.external_reference,
            self.failure_reason,
            self.created_at,
            self.completed_at,
            self.version,
        ))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    aggregate_type: String,
    aggregate_id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
}

impl From<OutboxRow> for OutboxEvent {
    fn from(row: OutboxRow) -> Self {
        OutboxEvent {
            id: row.id,
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            payload: row.payload,
            created_at: row.created_at,
            published_at: row.published_at,
        }
    }
}

fn invalid(e: impl std::fmt::Display) -> StoreError {
    StoreError::InvalidData(e.to_string())
}

/// Name of the unique constraint an error violated, if any
fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => db.constraint(),
        _ => None,
    }
}

// =========================================================================
// Unit of work
// =========================================================================

#[async_trait]
impl UnitOfWork for PgLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

/// An open database transaction; dropping it rolls back
pub struct PgLedgerTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl WalletRepository for PgLedgerTx {
    async fn find_wallet(&mut self, id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            SELECT id, owner_user_id, currency, available_balance, reserved_balance,
                   status, version, created_at, updated_at
            FROM wallets
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(WalletRow::into_domain).transpose()
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError> {
        if wallet.is_new() {
            sqlx::query(
                r#"
                INSERT INTO wallets (
                    id, owner_user_id, currency, available_balance, reserved_balance,
                    status, version, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(wallet.id())
            .bind(wallet.owner_user_id())
            .bind(wallet.currency().as_str())
            .bind(wallet.available_balance().amount())
            .bind(wallet.reserved_balance().amount())
            .bind(wallet.status().as_str())
            .bind(wallet.version())
            .bind(wallet.created_at())
            .bind(wallet.updated_at())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if violated_constraint(&e) == Some(WALLET_OWNER_CONSTRAINT) {
                    StoreError::WalletAlreadyExists {
                        owner_user_id: wallet.owner_user_id(),
                        currency: wallet.currency().to_string(),
                    }
                } else {
                    StoreError::Database(e)
                }
            })?;
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET available_balance = $3,
                reserved_balance = $4,
                status = $5,
                version = $6,
                updated_at = $7
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(wallet.id())
        .bind(wallet.persisted_version())
        .bind(wallet.available_balance().amount())
        .bind(wallet.reserved_balance().amount())
        .bind(wallet.status().as_str())
        .bind(wallet.version())
        .bind(wallet.updated_at())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                aggregate_type: Wallet::aggregate_type(),
                aggregate_id: wallet.id(),
                expected: wallet.persisted_version(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for PgLedgerTx {
    async fn find_transaction(&mut self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, transaction_type, status, source_wallet_id, destination_wallet_id,
                   amount, currency, idempotency_key, description, external_reference,
                   failure_reason, created_at, completed_at, version
            FROM transactions
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_transaction_by_key(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, transaction_type, status, source_wallet_id, destination_wallet_id,
                   amount, currency, idempotency_key, description, external_reference,
                   failure_reason, created_at, completed_at, version
            FROM transactions
            WHERE idempotency_key = $1
            FOR UPDATE
            "#,
        )
        .bind(idempotency_key)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn save_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        if transaction.is_new() {
            sqlx::query(
                r#"
                INSERT INTO transactions (
                    id, transaction_type, status, source_wallet_id, destination_wallet_id,
                    amount, currency, idempotency_key, description, external_reference,
                    failure_reason, created_at, completed_at, version
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(transaction.id())
            .bind(transaction.transaction_type().as_str())
            .bind(transaction.status().as_str())
            .bind(transaction.source_wallet_id())
            .bind(transaction.destination_wallet_id())
            .bind(transaction.amount().amount())
            .bind(transaction.amount().currency().as_str())
            .bind(transaction.idempotency_key())
            .bind(transaction.description())
            .bind(transaction.external_reference())
            .bind(transaction.failure_reason())
            .bind(transaction.created_at())
            .bind(transaction.completed_at())
            .bind(transaction.version())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if violated_constraint(&e) == Some(IDEMPOTENCY_KEY_CONSTRAINT) {
                    StoreError::IdempotencyKeyExists(transaction.idempotency_key().to_string())
                } else {
                    StoreError::Database(e)
                }
            })?;
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $3,
                failure_reason = $4,
                completed_at = $5,
                version = $6
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(transaction.id())
        .bind(transaction.persisted_version())
        .bind(transaction.status().as_str())
        .bind(transaction.failure_reason())
        .bind(transaction.completed_at())
        .bind(transaction.version())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                aggregate_type: Transaction::aggregate_type(),
                aggregate_id: transaction.id(),
                expected: transaction.persisted_version(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for PgLedgerTx {
    async fn publish(&mut self, event: &LedgerEvent) -> Result<(), StoreError> {
        let row = OutboxEvent::from_event(event)?;

        sqlx::query(
            r#"
            INSERT INTO outbox (id, aggregate_type, aggregate_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(row.id)
        .bind(&row.aggregate_type)
        .bind(row.aggregate_id)
        .bind(&row.event_type)
        .bind(&row.payload)
        .bind(row.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

// =========================================================================
// Reads and outbox access
// =========================================================================

#[async_trait]
impl LedgerReader for PgLedger {
    async fn get_wallet(&self, id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            SELECT id, owner_user_id, currency, available_balance, reserved_balance,
                   status, version, created_at, updated_at
            FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WalletRow::into_domain).transpose()
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, transaction_type, status, source_wallet_id, destination_wallet_id,
                   amount, currency, idempotency_key, description, external_reference,
                   failure_reason, created_at, completed_at, version
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn get_transaction_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, transaction_type, status, source_wallet_id, destination_wallet_id,
                   amount, currency, idempotency_key, description, external_reference,
                   failure_reason, created_at, completed_at, version
            FROM transactions
            WHERE idempotency_key = $1
            "#,
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }
}

#[async_trait]
impl OutboxStore for PgLedger {
    async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxEvent>, StoreError> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, aggregate_type, aggregate_id, event_type, payload, created_at, published_at
            FROM outbox
            WHERE published_at IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OutboxEvent::from).collect())
    }

    async fn mark_published(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET published_at = $2
            WHERE id = ANY($1) AND published_at IS NULL
            "#,
        )
        .bind(ids)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge_published(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM outbox
            WHERE published_at IS NOT NULL AND published_at <= $1
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
