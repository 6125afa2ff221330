//! Transaction Aggregate
//!
//! Records the intent and outcome of one financial operation against one or
//! two wallets. Wallets are referenced by id only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{AmountError, DomainError, LedgerEvent, Money, TRANSACTION_AGGREGATE};

use super::Aggregate;

/// Maximum idempotency key length (matches the column width)
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

// =========================================================================
// Type and status
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Payout,
    Transfer,
    Fee,
    Refund,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdraw => "WITHDRAW",
            TransactionType::Payout => "PAYOUT",
            TransactionType::Transfer => "TRANSFER",
            TransactionType::Fee => "FEE",
            TransactionType::Refund => "REFUND",
            TransactionType::Adjustment => "ADJUSTMENT",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(TransactionType::Deposit),
            "WITHDRAW" => Ok(TransactionType::Withdraw),
            "PAYOUT" => Ok(TransactionType::Payout),
            "TRANSFER" => Ok(TransactionType::Transfer),
            "FEE" => Ok(TransactionType::Fee),
            "REFUND" => Ok(TransactionType::Refund),
            "ADJUSTMENT" => Ok(TransactionType::Adjustment),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Cancelled
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "PROCESSING" => Ok(TransactionStatus::Processing),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            "CANCELLED" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

// =========================================================================
// Validation
// =========================================================================

/// Malformed transaction requests
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionValidationError {
    #[error("{transaction_type} transaction {reason}")]
    InvalidShape {
        transaction_type: TransactionType,
        reason: &'static str,
    },

    #[error("Source and destination wallet must differ")]
    SameWallet,

    #[error("Idempotency key must be 1..={MAX_IDEMPOTENCY_KEY_LEN} characters (got {0})")]
    InvalidIdempotencyKey(usize),

    #[error("Cancellation requires a non-empty reason")]
    MissingReason,

    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// Check an idempotency key without building a transaction
pub fn validate_idempotency_key(key: &str) -> Result<(), TransactionValidationError> {
    let len = key.chars().count();
    if len == 0 || len > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(TransactionValidationError::InvalidIdempotencyKey(len));
    }
    Ok(())
}

/// A cancellation reason; never empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason(String);

impl CancelReason {
    pub fn new(reason: impl Into<String>) -> Result<Self, TransactionValidationError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(TransactionValidationError::MissingReason);
        }
        Ok(Self(reason))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What a transaction does to wallet balances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Credit { wallet_id: Uuid },
    Debit { wallet_id: Uuid },
    /// Two-phase: reserve on processing, settle or release later
    Hold { wallet_id: Uuid },
    Transfer { source: Uuid, destination: Uuid },
}

/// Request to create a transaction
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub transaction_type: TransactionType,
    pub source_wallet_id: Option<Uuid>,
    pub destination_wallet_id: Option<Uuid>,
    pub amount: Money,
    pub idempotency_key: String,
    pub description: String,
    pub external_reference: Option<String>,
}

impl NewTransaction {
    /// Validate sides, amount and key, and derive the balance movement
    pub fn movement(&self) -> Result<Movement, TransactionValidationError> {
        use TransactionType::*;

        self.amount.ensure_positive()?;
        validate_idempotency_key(&self.idempotency_key)?;

        let shape = |reason| TransactionValidationError::InvalidShape {
            transaction_type: self.transaction_type,
            reason,
        };

        match (
            self.transaction_type,
            self.source_wallet_id,
            self.destination_wallet_id,
        ) {
            (Deposit | Refund, None, Some(wallet_id)) => Ok(Movement::Credit { wallet_id }),
            (Deposit | Refund, _, _) => Err(shape("requires a destination wallet only")),

            (Withdraw | Fee, Some(wallet_id), None) => Ok(Movement::Debit { wallet_id }),
            (Payout, Some(wallet_id), None) => Ok(Movement::Hold { wallet_id }),
            (Withdraw | Fee | Payout, _, _) => Err(shape("requires a source wallet only")),

            (Adjustment, None, Some(wallet_id)) => Ok(Movement::Credit { wallet_id }),
            (Adjustment, Some(wallet_id), None) => Ok(Movement::Debit { wallet_id }),
            (Adjustment, _, _) => Err(shape("requires exactly one wallet")),

            (Transfer, Some(source), Some(destination)) => {
                if source == destination {
                    return Err(TransactionValidationError::SameWallet);
                }
                Ok(Movement::Transfer {
                    source,
                    destination,
                })
            }
            (Transfer, _, _) => Err(shape("requires source and destination wallets")),
        }
    }
}

// =========================================================================
// Aggregate
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    id: Uuid,
    transaction_type: TransactionType,
    status: TransactionStatus,
    source_wallet_id: Option<Uuid>,
    destination_wallet_id: Option<Uuid>,
    amount: Money,
    idempotency_key: String,
    description: String,
    external_reference: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    version: i64,
    persisted_version: i64,
}

impl Transaction {
    /// Create a PENDING transaction after validating its shape
    pub fn create(new: NewTransaction) -> Result<Self, TransactionValidationError> {
        new.movement()?;

        Ok(Self {
            id: Uuid::new_v4(),
            transaction_type: new.transaction_type,
            status: TransactionStatus::Pending,
            source_wallet_id: new.source_wallet_id,
            destination_wallet_id: new.destination_wallet_id,
            amount: new.amount,
            idempotency_key: new.idempotency_key,
            description: new.description,
            external_reference: new.external_reference,
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
            version: 1,
            persisted_version: 0,
        })
    }

    /// Rebuild a transaction from its stored row
    #[allow(clippy::too_many_arguments)]
    pub fn from_db_state(
        id: Uuid,
        transaction_type: TransactionType,
        status: TransactionStatus,
        source_wallet_id: Option<Uuid>,
        destination_wallet_id: Option<Uuid>,
        amount: Money,
        idempotency_key: String,
        description: String,
        external_reference: Option<String>,
        failure_reason: Option<String>,
        created_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        version: i64,
    ) -> Self {
        Self {
            id,
            transaction_type,
            status,
            source_wallet_id,
            destination_wallet_id,
            amount,
            idempotency_key,
            description,
            external_reference,
            failure_reason,
            created_at,
            completed_at,
            version,
            persisted_version: version,
        }
    }

    /// Balance movement this transaction performs
    pub fn movement(&self) -> Result<Movement, TransactionValidationError> {
        self.as_request().movement()
    }

    /// Whether a replayed request describes the same operation
    pub fn matches_request(&self, request: &NewTransaction) -> bool {
        self.transaction_type == request.transaction_type
            && self.source_wallet_id == request.source_wallet_id
            && self.destination_wallet_id == request.destination_wallet_id
            && self.amount == request.amount
    }

    fn as_request(&self) -> NewTransaction {
        NewTransaction {
            transaction_type: self.transaction_type,
            source_wallet_id: self.source_wallet_id,
            destination_wallet_id: self.destination_wallet_id,
            amount: self.amount,
            idempotency_key: self.idempotency_key.clone(),
            description: self.description.clone(),
            external_reference: self.external_reference.clone(),
        }
    }

    // =========================================================================
    // State machine
    // =========================================================================

    /// PENDING or FAILED -> PROCESSING
    pub fn start_processing(&mut self) -> Result<(), DomainError> {
        match self.status {
            TransactionStatus::Pending | TransactionStatus::Failed => {
                self.status = TransactionStatus::Processing;
                self.failure_reason = None;
                self.touch();
                Ok(())
            }
            current => Err(DomainError::invalid_transaction_state(
                current,
                "start processing",
            )),
        }
    }

    /// PROCESSING -> COMPLETED
    pub fn mark_completed(&mut self) -> Result<(), DomainError> {
        if self.status != TransactionStatus::Processing {
            return Err(DomainError::invalid_transaction_state(
                self.status,
                "complete",
            ));
        }
        self.status = TransactionStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// PROCESSING -> FAILED, recording the reason
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<LedgerEvent, DomainError> {
        if self.status != TransactionStatus::Processing {
            return Err(DomainError::invalid_transaction_state(self.status, "fail"));
        }
        let reason = reason.into();
        self.status = TransactionStatus::Failed;
        self.failure_reason = Some(reason.clone());
        self.touch();

        Ok(LedgerEvent::TransactionFailed {
            transaction_id: self.id,
            reason,
            occurred_at: Utc::now(),
        })
    }

    /// FAILED -> PROCESSING; the caller re-attempts the wallet mutation
    pub fn retry(&mut self) -> Result<(), DomainError> {
        if self.status != TransactionStatus::Failed {
            return Err(DomainError::invalid_transaction_state(self.status, "retry"));
        }
        self.start_processing()
    }

    /// PENDING or FAILED -> CANCELLED
    pub fn cancel(&mut self, reason: &CancelReason) -> Result<LedgerEvent, DomainError> {
        match self.status {
            TransactionStatus::Pending | TransactionStatus::Failed => {
                self.status = TransactionStatus::Cancelled;
                self.failure_reason = Some(reason.as_str().to_string());
                self.touch();

                Ok(LedgerEvent::TransactionCancelled {
                    transaction_id: self.id,
                    reason: reason.as_str().to_string(),
                    occurred_at: Utc::now(),
                })
            }
            current => Err(DomainError::invalid_transaction_state(current, "cancel")),
        }
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn source_wallet_id(&self) -> Option<Uuid> {
        self.source_wallet_id
    }

    pub fn destination_wallet_id(&self) -> Option<Uuid> {
        self.destination_wallet_id
    }

    pub fn amount(&self) -> &Money {
        &self.amount
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn external_reference(&self) -> Option<&str> {
        self.external_reference.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn mark_persisted(&mut self) {
        self.persisted_version = self.version;
    }
}

impl Aggregate for Transaction {
    fn aggregate_type() -> &'static str {
        TRANSACTION_AGGREGATE
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

    fn usd(amount: &str) -> Money {
        Money::parse(amount, "USD").unwrap()
    }

    fn deposit(key: &str) -> NewTransaction {
        NewTransaction {
            transaction_type: TransactionType::Deposit,
            source_wallet_id: None,
            destination_wallet_id: Some(Uuid::new_v4()),
            amount: usd("100.00"),
            idempotency_key: key.to_string(),
            description: "top up".to_string(),
            external_reference: None,
        }
    }

    fn completed() -> Transaction {
        let mut tx = Transaction::create(deposit("k1")).unwrap();
        tx.start_processing().unwrap();
        tx.mark_completed().unwrap();
        tx
    }

    fn failed() -> Transaction {
        let mut tx = Transaction::create(deposit("k1")).unwrap();
        tx.start_processing().unwrap();
        tx.mark_failed("insufficient_balance").unwrap();
        tx
    }

    #[test]
    fn test_create_pending() {
        let tx = Transaction::create(deposit("k1")).unwrap();
        assert_eq!(tx.status(), TransactionStatus::Pending);
        assert_eq!(tx.version(), 1);
        assert!(tx.is_new());
        assert!(tx.completed_at().is_none());
    }

    #[test]
    fn test_happy_path() {
        let tx = completed();
        assert_eq!(tx.status(), TransactionStatus::Completed);
        assert!(tx.completed_at().is_some());
        assert_eq!(tx.version(), 3);
    }

    #[test]
    fn test_mark_failed_records_reason() {
        let tx = failed();
        assert_eq!(tx.status(), TransactionStatus::Failed);
        assert_eq!(tx.failure_reason(), Some("insufficient_balance"));
    }

    #[test]
    fn test_retry_from_failed() {
        let mut tx = failed();
        tx.retry().unwrap();
        assert_eq!(tx.status(), TransactionStatus::Processing);
        assert!(tx.failure_reason().is_none());
        tx.mark_completed().unwrap();
    }

    #[test]
    fn test_retry_from_pending_fails() {
        let mut tx = Transaction::create(deposit("k1")).unwrap();
        assert!(matches!(
            tx.retry(),
            Err(DomainError::InvalidTransactionState { .. })
        ));
        assert_eq!(tx.status(), TransactionStatus::Pending);
    }

    #[test]
    fn test_cancel_completed_fails() {
        let mut tx = completed();
        let reason = CancelReason::new("customer request").unwrap();
        assert!(matches!(
            tx.cancel(&reason),
            Err(DomainError::InvalidTransactionState { .. })
        ));
        assert_eq!(tx.status(), TransactionStatus::Completed);
    }

    #[test]
    fn test_cancel_pending_and_failed() {
        let reason = CancelReason::new("customer request").unwrap();

        let mut pending = Transaction::create(deposit("k1")).unwrap();
        let event = pending.cancel(&reason).unwrap();
        assert_eq!(pending.status(), TransactionStatus::Cancelled);
        assert!(matches!(event, LedgerEvent::TransactionCancelled { .. }));

        let mut failed = failed();
        failed.cancel(&reason).unwrap();
        assert_eq!(failed.status(), TransactionStatus::Cancelled);
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let mut tx = Transaction::create(deposit("k1")).unwrap();
        tx.cancel(&CancelReason::new("dup").unwrap()).unwrap();

        assert!(tx.status().is_terminal());
        assert!(tx.start_processing().is_err());
        assert!(tx.retry().is_err());
    }

    #[test]
    fn test_completed_cannot_reenter_processing() {
        let mut tx = completed();
        assert!(tx.start_processing().is_err());
        assert!(tx.mark_completed().is_err());
    }

    #[test]
    fn test_cancel_reason_required() {
        assert_eq!(
            CancelReason::new("   "),
            Err(TransactionValidationError::MissingReason)
        );
    }

    #[test]
    fn test_idempotency_key_bounds() {
        assert!(validate_idempotency_key("k").is_ok());
        assert!(validate_idempotency_key(&"k".repeat(255)).is_ok());
        assert_eq!(
            validate_idempotency_key(""),
            Err(TransactionValidationError::InvalidIdempotencyKey(0))
        );
        assert!(validate_idempotency_key(&"k".repeat(256)).is_err());
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut request = deposit("k1");
        request.amount = usd("0");
        assert!(matches!(
            Transaction::create(request),
            Err(TransactionValidationError::Amount(AmountError::NotPositive(_)))
        ));
    }

    #[test]
    fn test_shape_validation() {
        let wallet = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut request = deposit("k1");
        request.source_wallet_id = Some(wallet);
        assert!(matches!(
            request.movement(),
            Err(TransactionValidationError::InvalidShape { .. })
        ));

        request.transaction_type = TransactionType::Transfer;
        request.destination_wallet_id = Some(wallet);
        assert_eq!(
            request.movement(),
            Err(TransactionValidationError::SameWallet)
        );

        request.destination_wallet_id = Some(other);
        assert!(matches!(
            request.movement(),
            Ok(Movement::Transfer { .. })
        ));

        request.transaction_type = TransactionType::Adjustment;
        assert!(matches!(
            request.movement(),
            Err(TransactionValidationError::InvalidShape { .. })
        ));

        request.destination_wallet_id = None;
        assert_eq!(
            request.movement(),
            Ok(Movement::Debit { wallet_id: wallet })
        );

        request.transaction_type = TransactionType::Payout;
        assert_eq!(request.movement(), Ok(Movement::Hold { wallet_id: wallet }));
    }

    #[test]
    fn test_matches_request() {
        let request = deposit("k1");
        let tx = Transaction::create(request.clone()).unwrap();
        assert!(tx.matches_request(&request));

        let mut different = request;
        different.amount = usd("99.99");
        assert!(!tx.matches_request(&different));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(TransactionStatus::Processing.to_string(), "PROCESSING");
        assert_eq!(
            "ADJUSTMENT".parse::<TransactionType>().unwrap(),
            TransactionType::Adjustment
        );
        assert!("BOGUS".parse::<TransactionStatus>().is_err());
    }
}
