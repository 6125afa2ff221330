//! Wallet Aggregate
//!
//! Wallet owns an available and a reserved balance in a single currency and a
//! lifecycle status. Every mutation validates first, then changes state, bumps
//! the version and returns the event to be written to the outbox.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{AmountError, Currency, DomainError, LedgerEvent, Money, WALLET_AGGREGATE};

use super::Aggregate;

/// Wallet status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStatus {
    Active,
    Suspended,
    Locked,
    Closed,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Active => "ACTIVE",
            WalletStatus::Suspended => "SUSPENDED",
            WalletStatus::Locked => "LOCKED",
            WalletStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(WalletStatus::Active),
            "SUSPENDED" => Ok(WalletStatus::Suspended),
            "LOCKED" => Ok(WalletStatus::Locked),
            "CLOSED" => Ok(WalletStatus::Closed),
            other => Err(format!("unknown wallet status: {}", other)),
        }
    }
}

/// Wallet Aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    id: Uuid,
    owner_user_id: Uuid,
    currency: Currency,
    available_balance: Money,
    reserved_balance: Money,
    status: WalletStatus,
    version: i64,
    persisted_version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Wallet {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Open a new ACTIVE wallet with zero balances and the creation event
    pub fn open(owner_user_id: Uuid, currency: Currency) -> (Self, LedgerEvent) {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let event = LedgerEvent::WalletCreated {
            wallet_id: id,
            owner_user_id,
            currency,
            created_at: now,
        };

        let wallet = Self {
            id,
            owner_user_id,
            currency,
            available_balance: Money::zero(currency),
            reserved_balance: Money::zero(currency),
            status: WalletStatus::Active,
            version: 1,
            persisted_version: 0,
            created_at: now,
            updated_at: now,
        };

        (wallet, event)
    }

    /// Rebuild a wallet from its stored row
    #[allow(clippy::too_many_arguments)]
    pub fn from_db_state(
        id: Uuid,
        owner_user_id: Uuid,
        currency: Currency,
        available_balance: Decimal,
        reserved_balance: Decimal,
        status: WalletStatus,
        version: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, AmountError> {
        Ok(Self {
            id,
            owner_user_id,
            currency,
            available_balance: Money::new(available_balance, currency)?,
            reserved_balance: Money::new(reserved_balance, currency)?,
            status,
            version,
            persisted_version: version,
            created_at,
            updated_at,
        })
    }

    // =========================================================================
    // Balance operations
    // =========================================================================

    /// Credit money to the available balance
    pub fn credit(&mut self, amount: &Money, transaction_id: Uuid) -> Result<LedgerEvent, DomainError> {
        self.ensure_active()?;
        let available = self.available_balance.checked_add(amount)?;

        self.available_balance = available;
        self.touch();

        Ok(LedgerEvent::WalletCredited {
            wallet_id: self.id,
            transaction_id,
            amount: *amount,
            balance_after: self.available_balance,
            occurred_at: self.updated_at,
        })
    }

    /// Debit money from the available balance
    pub fn debit(&mut self, amount: &Money, transaction_id: Uuid) -> Result<LedgerEvent, DomainError> {
        self.ensure_active()?;
        self.ensure_covered(&self.available_balance, amount)?;
        let available = self.available_balance.checked_sub(amount)?;

        self.available_balance = available;
        self.touch();

        Ok(LedgerEvent::WalletDebited {
            wallet_id: self.id,
            transaction_id,
            amount: *amount,
            balance_after: self.available_balance,
            occurred_at: self.updated_at,
        })
    }

    /// Hold funds: move from available to reserved
    pub fn reserve(&mut self, amount: &Money, transaction_id: Uuid) -> Result<LedgerEvent, DomainError> {
        self.ensure_active()?;
        self.ensure_covered(&self.available_balance, amount)?;
        let available = self.available_balance.checked_sub(amount)?;
        let reserved = self.reserved_balance.checked_add(amount)?;

        self.available_balance = available;
        self.reserved_balance = reserved;
        self.touch();

        Ok(LedgerEvent::FundsReserved {
            wallet_id: self.id,
            transaction_id,
            amount: *amount,
            balance_after: self.available_balance,
            reserved_after: self.reserved_balance,
            occurred_at: self.updated_at,
        })
    }

    /// Drop a hold: move from reserved back to available
    pub fn release(&mut self, amount: &Money, transaction_id: Uuid) -> Result<LedgerEvent, DomainError> {
        self.ensure_active()?;
        self.ensure_covered(&self.reserved_balance, amount)?;
        let reserved = self.reserved_balance.checked_sub(amount)?;
        let available = self.available_balance.checked_add(amount)?;

        self.available_balance = available;
        self.reserved_balance = reserved;
        self.touch();

        Ok(LedgerEvent::FundsReleased {
            wallet_id: self.id,
            transaction_id,
            amount: *amount,
            balance_after: self.available_balance,
            reserved_after: self.reserved_balance,
            occurred_at: self.updated_at,
        })
    }

    /// Consume held funds (the money leaves the wallet)
    pub fn settle_reserved(
        &mut self,
        amount: &Money,
        transaction_id: Uuid,
    ) -> Result<LedgerEvent, DomainError> {
        self.ensure_active()?;
        self.ensure_covered(&self.reserved_balance, amount)?;
        let reserved = self.reserved_balance.checked_sub(amount)?;

        self.reserved_balance = reserved;
        self.touch();

        Ok(LedgerEvent::WalletDebited {
            wallet_id: self.id,
            transaction_id,
            amount: *amount,
            balance_after: self.available_balance,
            occurred_at: self.updated_at,
        })
    }

    // =========================================================================
    // Status transitions
    // =========================================================================

    pub fn suspend(&mut self) -> Result<LedgerEvent, DomainError> {
        match self.status {
            WalletStatus::Active => self.transition(WalletStatus::Suspended),
            current => Err(DomainError::invalid_wallet_state(current, "suspend")),
        }
    }

    pub fn lock(&mut self) -> Result<LedgerEvent, DomainError> {
        match self.status {
            WalletStatus::Active | WalletStatus::Suspended => self.transition(WalletStatus::Locked),
            current => Err(DomainError::invalid_wallet_state(current, "lock")),
        }
    }

    pub fn reactivate(&mut self) -> Result<LedgerEvent, DomainError> {
        match self.status {
            WalletStatus::Suspended | WalletStatus::Locked => self.transition(WalletStatus::Active),
            current => Err(DomainError::invalid_wallet_state(current, "reactivate")),
        }
    }

    /// Close the wallet; only allowed once both balances are zero
    pub fn close(&mut self) -> Result<LedgerEvent, DomainError> {
        if self.status == WalletStatus::Closed {
            return Err(DomainError::invalid_wallet_state(self.status, "close"));
        }
        if !self.available_balance.is_zero() || !self.reserved_balance.is_zero() {
            return Err(DomainError::WalletNotEmpty {
                available: self.available_balance.amount(),
                reserved: self.reserved_balance.amount(),
            });
        }
        self.transition(WalletStatus::Closed)
    }

    fn transition(&mut self, to: WalletStatus) -> Result<LedgerEvent, DomainError> {
        let from = self.status;
        self.status = to;
        self.touch();

        Ok(LedgerEvent::WalletStatusChanged {
            wallet_id: self.id,
            from: from.to_string(),
            to: to.to_string(),
            occurred_at: self.updated_at,
        })
    }

    // =========================================================================
    // Guards
    // =========================================================================

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.status != WalletStatus::Active {
            return Err(DomainError::WalletNotActive {
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_covered(&self, balance: &Money, amount: &Money) -> Result<(), DomainError> {
        if !balance.is_sufficient_for(amount)? {
            return Err(DomainError::insufficient_balance(
                amount.amount(),
                balance.amount(),
            ));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn owner_user_id(&self) -> Uuid {
        self.owner_user_id
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn available_balance(&self) -> &Money {
        &self.available_balance
    }

    pub fn reserved_balance(&self) -> &Money {
        &self.reserved_balance
    }

    pub fn status(&self) -> WalletStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == WalletStatus::Active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Record that the current state has been written to storage
    pub fn mark_persisted(&mut self) {
        self.persisted_version = self.version;
    }
}

impl Aggregate for Wallet {
    fn aggregate_type() -> &'static str {
        WALLET_AGGREGATE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn persisted_version(&self) -> i64 {
        self.persisted_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd(amount: &str) -> Money {
        Money::parse(amount, "USD").unwrap()
    }

    fn new_wallet() -> Wallet {
        let (wallet, _) = Wallet::open(Uuid::new_v4(), Currency::parse("USD").unwrap());
        wallet
    }

    fn funded_wallet(amount: &str) -> Wallet {
        let mut wallet = new_wallet();
        wallet.credit(&usd(amount), Uuid::new_v4()).unwrap();
        wallet
    }

    #[test]
    fn test_wallet_open() {
        let owner = Uuid::new_v4();
        let (wallet, event) = Wallet::open(owner, Currency::parse("EUR").unwrap());

        assert_eq!(wallet.owner_user_id(), owner);
        assert_eq!(wallet.currency().as_str(), "EUR");
        assert!(wallet.available_balance().is_zero());
        assert!(wallet.reserved_balance().is_zero());
        assert_eq!(wallet.status(), WalletStatus::Active);
        assert_eq!(wallet.version(), 1);
        assert!(wallet.is_new());
        assert!(matches!(event, LedgerEvent::WalletCreated { .. }));
    }

    #[test]
    fn test_credit_bumps_version() {
        let mut wallet = new_wallet();
        let transaction_id = Uuid::new_v4();

        let event = wallet.credit(&usd("100.00"), transaction_id).unwrap();

        assert_eq!(wallet.available_balance().amount(), dec!(100));
        assert_eq!(wallet.version(), 2);
        match event {
            LedgerEvent::WalletCredited {
                transaction_id: id,
                balance_after,
                ..
            } => {
                assert_eq!(id, transaction_id);
                assert_eq!(balance_after.amount(), dec!(100));
            }
            other => panic!("Expected WalletCredited, got: {:?}", other),
        }
    }

    #[test]
    fn test_debit() {
        let mut wallet = funded_wallet("100");
        wallet.debit(&usd("30"), Uuid::new_v4()).unwrap();

        assert_eq!(wallet.available_balance().amount(), dec!(70));
        assert_eq!(wallet.version(), 3);
    }

    #[test]
    fn test_debit_exact_balance() {
        let mut wallet = funded_wallet("100.00");
        assert!(wallet.debit(&usd("100.00"), Uuid::new_v4()).is_ok());
        assert!(wallet.available_balance().is_zero());
    }

    #[test]
    fn test_debit_insufficient_balance_leaves_state_untouched() {
        let mut wallet = funded_wallet("50");
        let before = wallet.clone();

        let result = wallet.debit(&usd("100"), Uuid::new_v4());

        assert!(matches!(result, Err(DomainError::InsufficientBalance { .. })));
        assert_eq!(wallet, before);
    }

    #[test]
    fn test_credit_up_to_balance_ceiling() {
        let mut wallet = funded_wallet("999999999999");
        wallet.credit(&usd("0.99999999"), Uuid::new_v4()).unwrap();
        assert_eq!(
            wallet.available_balance().amount(),
            dec!(999999999999.99999999)
        );

        let before = wallet.clone();
        let result = wallet.credit(&usd("0.00000001"), Uuid::new_v4());

        assert!(matches!(result, Err(DomainError::AmountOverflow)));
        assert_eq!(wallet, before);
    }

    #[test]
    fn test_currency_mismatch_on_credit() {
        let mut wallet = new_wallet();
        let eur = Money::parse("10", "EUR").unwrap();

        let result = wallet.credit(&eur, Uuid::new_v4());

        assert!(matches!(result, Err(DomainError::CurrencyMismatch { .. })));
        assert_eq!(wallet.version(), 1);
    }

    #[test]
    fn test_currency_mismatch_on_debit() {
        let mut wallet = funded_wallet("10");
        let eur = Money::parse("1", "EUR").unwrap();

        let result = wallet.debit(&eur, Uuid::new_v4());

        assert!(matches!(result, Err(DomainError::CurrencyMismatch { .. })));
    }

    #[test]
    fn test_reserve_and_release() {
        let mut wallet = funded_wallet("100");

        wallet.reserve(&usd("40"), Uuid::new_v4()).unwrap();
        assert_eq!(wallet.available_balance().amount(), dec!(60));
        assert_eq!(wallet.reserved_balance().amount(), dec!(40));

        wallet.release(&usd("15"), Uuid::new_v4()).unwrap();
        assert_eq!(wallet.available_balance().amount(), dec!(75));
        assert_eq!(wallet.reserved_balance().amount(), dec!(25));
    }

    #[test]
    fn test_reserve_insufficient() {
        let mut wallet = funded_wallet("10");
        let result = wallet.reserve(&usd("10.01"), Uuid::new_v4());
        assert!(matches!(result, Err(DomainError::InsufficientBalance { .. })));
    }

    #[test]
    fn test_release_more_than_reserved() {
        let mut wallet = funded_wallet("10");
        wallet.reserve(&usd("5"), Uuid::new_v4()).unwrap();
        let result = wallet.release(&usd("6"), Uuid::new_v4());
        assert!(matches!(result, Err(DomainError::InsufficientBalance { .. })));
    }

    #[test]
    fn test_settle_reserved() {
        let mut wallet = funded_wallet("100");
        wallet.reserve(&usd("40"), Uuid::new_v4()).unwrap();

        let event = wallet.settle_reserved(&usd("40"), Uuid::new_v4()).unwrap();

        assert!(matches!(event, LedgerEvent::WalletDebited { .. }));
        assert_eq!(wallet.available_balance().amount(), dec!(60));
        assert!(wallet.reserved_balance().is_zero());
    }

    #[test]
    fn test_inactive_wallet_rejects_mutations() {
        let mut wallet = funded_wallet("100");
        wallet.suspend().unwrap();

        let amount = usd("1");
        assert!(matches!(
            wallet.credit(&amount, Uuid::new_v4()),
            Err(DomainError::WalletNotActive { .. })
        ));
        assert!(matches!(
            wallet.debit(&amount, Uuid::new_v4()),
            Err(DomainError::WalletNotActive { .. })
        ));
        assert!(matches!(
            wallet.reserve(&amount, Uuid::new_v4()),
            Err(DomainError::WalletNotActive { .. })
        ));
    }

    #[test]
    fn test_status_transitions() {
        let mut wallet = new_wallet();

        wallet.suspend().unwrap();
        assert_eq!(wallet.status(), WalletStatus::Suspended);
        assert!(matches!(
            wallet.suspend(),
            Err(DomainError::InvalidWalletState { .. })
        ));

        wallet.lock().unwrap();
        assert_eq!(wallet.status(), WalletStatus::Locked);

        wallet.reactivate().unwrap();
        assert_eq!(wallet.status(), WalletStatus::Active);
        assert!(matches!(
            wallet.reactivate(),
            Err(DomainError::InvalidWalletState { .. })
        ));
    }

    #[test]
    fn test_close_requires_empty_wallet() {
        let mut wallet = funded_wallet("1");
        assert!(matches!(
            wallet.close(),
            Err(DomainError::WalletNotEmpty { .. })
        ));

        wallet.reserve(&usd("1"), Uuid::new_v4()).unwrap();
        assert!(matches!(
            wallet.close(),
            Err(DomainError::WalletNotEmpty { .. })
        ));

        wallet.settle_reserved(&usd("1"), Uuid::new_v4()).unwrap();
        let event = wallet.close().unwrap();
        assert!(matches!(event, LedgerEvent::WalletStatusChanged { .. }));
        assert_eq!(wallet.status(), WalletStatus::Closed);
    }

    #[test]
    fn test_closed_wallet_is_terminal() {
        let mut wallet = new_wallet();
        wallet.close().unwrap();

        assert!(wallet.reactivate().is_err());
        assert!(wallet.close().is_err());
        assert!(matches!(
            wallet.credit(&usd("1"), Uuid::new_v4()),
            Err(DomainError::WalletNotActive { .. })
        ));
    }

    #[test]
    fn test_persisted_version_tracking() {
        let now = Utc::now();
        let mut wallet = Wallet::from_db_state(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Currency::parse("USD").unwrap(),
            dec!(10.00),
            Decimal::ZERO,
            WalletStatus::Active,
            7,
            now,
            now,
        )
        .unwrap();

        assert!(!wallet.is_new());
        assert!(!wallet.is_dirty());
        assert_eq!(wallet.available_balance().format(), "10.00");

        wallet.credit(&usd("1"), Uuid::new_v4()).unwrap();
        wallet.debit(&usd("2"), Uuid::new_v4()).unwrap();
        assert_eq!(wallet.version(), 9);
        assert_eq!(wallet.persisted_version(), 7);
        assert!(wallet.is_dirty());

        wallet.mark_persisted();
        assert!(!wallet.is_dirty());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            WalletStatus::Active,
            WalletStatus::Suspended,
            WalletStatus::Locked,
            WalletStatus::Closed,
        ] {
            assert_eq!(status.as_str().parse::<WalletStatus>().unwrap(), status);
        }
        assert!("FROZEN".parse::<WalletStatus>().is_err());
    }
}
