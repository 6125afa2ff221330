//! Wallet Handlers
//!
//! Opening wallets and administrative status changes.

use std::sync::Arc;

use crate::aggregate::{Aggregate, Wallet};
use crate::domain::{Currency, OperationContext};
use crate::store::LedgerStore;

use super::pipeline::{load_wallet, with_deadline, Staged};
use super::{ChangeWalletStatusCommand, CreateWalletCommand, LedgerError, WalletAction};

/// Handler for opening wallets
pub struct CreateWalletHandler {
    store: Arc<dyn LedgerStore>,
}

impl CreateWalletHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Open an ACTIVE, empty wallet; one per owner per currency
    pub async fn execute(
        &self,
        command: CreateWalletCommand,
        context: &OperationContext,
    ) -> Result<Wallet, LedgerError> {
        let currency = Currency::parse(&command.currency)?;

        let mut wallet = with_deadline(context, async {
            let (wallet, event) = Wallet::open(command.owner_user_id, currency);

            let mut tx = self.store.begin().await?;
            tx.save_wallet(&wallet).await?;
            tx.publish(&event).await?;
            Ok::<_, LedgerError>(Staged::Commit(tx, wallet))
        })
        .await?;
        wallet.mark_persisted();

        tracing::info!(
            wallet_id = %wallet.id(),
            owner_user_id = %command.owner_user_id,
            currency = %currency,
            correlation_id = ?context.correlation_id,
            "Wallet created"
        );

        Ok(wallet)
    }
}

/// Handler for suspend / lock / reactivate / close
pub struct ChangeWalletStatusHandler {
    store: Arc<dyn LedgerStore>,
}

impl ChangeWalletStatusHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn execute(
        &self,
        command: ChangeWalletStatusCommand,
        context: &OperationContext,
    ) -> Result<Wallet, LedgerError> {
        let mut wallet = with_deadline(context, async {
            let mut tx = self.store.begin().await?;
            let mut wallet = load_wallet(tx.as_mut(), command.wallet_id).await?;

            let event = match command.action {
                WalletAction::Suspend => wallet.suspend()?,
                WalletAction::Lock => wallet.lock()?,
                WalletAction::Reactivate => wallet.reactivate()?,
                WalletAction::Close => wallet.close()?,
            };

            tx.save_wallet(&wallet).await?;
            tx.publish(&event).await?;
            Ok::<_, LedgerError>(Staged::Commit(tx, wallet))
        })
        .await?;
        wallet.mark_persisted();

        tracing::info!(
            wallet_id = %wallet.id(),
            status = %wallet.status(),
            version = wallet.version(),
            correlation_id = ?context.correlation_id,
            "Wallet status changed"
        );

        Ok(wallet)
    }
}
