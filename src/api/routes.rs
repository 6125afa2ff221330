//! API Routes
//!
//! HTTP endpoint definitions. Each route builds its handler over the shared
//! store and forwards the request's [`OperationContext`].

use axum::{
    extract::{Extension, FromRequest, FromRequestParts, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Aggregate, Transaction, TransactionStatus, TransactionType, Wallet, WalletStatus};
use crate::domain::OperationContext;
use crate::error::{AppError, AppResult};
use crate::handlers::{
    CancelTransactionCommand, CancelTransactionHandler, ChangeWalletStatusCommand,
    ChangeWalletStatusHandler, CreateTransactionCommand, CreateTransactionHandler,
    CreateWalletCommand, CreateWalletHandler, CreditWalletHandler, DebitWalletHandler,
    LedgerQueryHandler, PayoutHandler, PayoutOutcome, ProcessTransactionHandler,
    SettlePayoutCommand, SettlePayoutHandler, TransferCommand, TransferHandler, WalletAction,
    WalletMovementCommand,
};

use super::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub owner_user_id: Uuid,
    pub currency: String,
}

/// Body for credit, debit and payout
#[derive(Debug, Deserialize)]
pub struct MovementRequest {
    pub amount: String,
    pub currency: String,
    pub idempotency_key: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub source_wallet_id: Uuid,
    pub destination_wallet_id: Uuid,
    pub amount: String,
    pub currency: String,
    pub idempotency_key: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub currency: String,
    pub available_balance: String,
    pub reserved_balance: String,
    pub status: WalletStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Wallet> for WalletResponse {
    fn from(wallet: &Wallet) -> Self {
        Self {
            id: wallet.id(),
            owner_user_id: wallet.owner_user_id(),
            currency: wallet.currency().to_string(),
            available_balance: wallet.available_balance().format(),
            reserved_balance: wallet.reserved_balance().format(),
            status: wallet.status(),
            version: wallet.version(),
            created_at: wallet.created_at(),
            updated_at: wallet.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub source_wallet_id: Option<Uuid>,
    pub destination_wallet_id: Option<Uuid>,
    pub amount: String,
    pub currency: String,
    pub idempotency_key: String,
    pub description: String,
    pub external_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(transaction: &Transaction) -> Self {
        Self {
            id: transaction.id(),
            transaction_type: transaction.transaction_type(),
            status: transaction.status(),
            source_wallet_id: transaction.source_wallet_id(),
            destination_wallet_id: transaction.destination_wallet_id(),
            amount: transaction.amount().format(),
            currency: transaction.amount().currency().to_string(),
            idempotency_key: transaction.idempotency_key().to_string(),
            description: transaction.description().to_string(),
            external_reference: transaction.external_reference().map(str::to_string),
            failure_reason: transaction.failure_reason().map(str::to_string),
            version: transaction.version(),
            created_at: transaction.created_at(),
            completed_at: transaction.completed_at(),
        }
    }
}

type WalletResult = AppResult<Json<WalletResponse>>;
type TransactionResult = AppResult<Json<TransactionResponse>>;

/// JSON body whose decode failures use the error envelope
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
struct JsonBody<T>(T);

/// Path parameters whose decode failures use the error envelope
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
struct Path<T>(T);

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Wallets
        .route("/wallets", post(create_wallet))
        .route("/wallets/:wallet_id", get(get_wallet))
        .route("/wallets/:wallet_id/credit", post(credit_wallet))
        .route("/wallets/:wallet_id/debit", post(debit_wallet))
        .route("/wallets/:wallet_id/payout", post(payout))
        .route("/wallets/:wallet_id/suspend", post(suspend_wallet))
        .route("/wallets/:wallet_id/lock", post(lock_wallet))
        .route("/wallets/:wallet_id/reactivate", post(reactivate_wallet))
        .route("/wallets/:wallet_id/close", post(close_wallet))
        // Transfers and payouts
        .route("/transfers", post(transfer))
        .route("/payouts/:transaction_id/settle", post(settle_payout))
        // Transactions
        .route("/transactions", post(create_transaction))
        .route("/transactions/by-key/:idempotency_key", get(get_transaction_by_key))
        .route("/transactions/:transaction_id", get(get_transaction))
        .route("/transactions/:transaction_id/process", post(process_transaction))
        .route("/transactions/:transaction_id/retry", post(retry_transaction))
        .route("/transactions/:transaction_id/cancel", post(cancel_transaction))
}

// =========================================================================
// Wallets
// =========================================================================

/// POST /wallets
async fn create_wallet(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    JsonBody(request): JsonBody<CreateWalletRequest>,
) -> AppResult<(StatusCode, Json<WalletResponse>)> {
    let handler = CreateWalletHandler::new(state.store.clone());
    let command = CreateWalletCommand::new(request.owner_user_id, request.currency);

    let wallet = handler.execute(command, &context).await?;

    Ok((StatusCode::CREATED, Json(WalletResponse::from(&wallet))))
}

/// GET /wallets/:wallet_id
async fn get_wallet(State(state): State<AppState>, Path(wallet_id): Path<Uuid>) -> WalletResult {
    let wallet = LedgerQueryHandler::new(state.store.clone())
        .get_wallet(wallet_id)
        .await?;
    Ok(Json(WalletResponse::from(&wallet)))
}

fn movement_command(wallet_id: Uuid, request: MovementRequest) -> WalletMovementCommand {
    WalletMovementCommand::new(
        wallet_id,
        request.amount,
        request.currency,
        request.idempotency_key,
    )
    .with_description(request.description)
}

/// POST /wallets/:wallet_id/credit
async fn credit_wallet(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(wallet_id): Path<Uuid>,
    JsonBody(request): JsonBody<MovementRequest>,
) -> TransactionResult {
    let transaction = CreditWalletHandler::new(state.store.clone())
        .execute(movement_command(wallet_id, request), &context)
        .await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}

/// POST /wallets/:wallet_id/debit
async fn debit_wallet(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(wallet_id): Path<Uuid>,
    JsonBody(request): JsonBody<MovementRequest>,
) -> TransactionResult {
    let transaction = DebitWalletHandler::new(state.store.clone())
        .execute(movement_command(wallet_id, request), &context)
        .await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}

/// POST /wallets/:wallet_id/payout
async fn payout(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(wallet_id): Path<Uuid>,
    JsonBody(request): JsonBody<MovementRequest>,
) -> TransactionResult {
    let transaction = PayoutHandler::new(state.store.clone())
        .execute(movement_command(wallet_id, request), &context)
        .await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}

async fn change_status(
    state: AppState,
    context: OperationContext,
    wallet_id: Uuid,
    action: WalletAction,
) -> WalletResult {
    let wallet = ChangeWalletStatusHandler::new(state.store.clone())
        .execute(ChangeWalletStatusCommand::new(wallet_id, action), &context)
        .await?;
    Ok(Json(WalletResponse::from(&wallet)))
}

/// POST /wallets/:wallet_id/suspend
async fn suspend_wallet(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(wallet_id): Path<Uuid>,
) -> WalletResult {
    change_status(state, context, wallet_id, WalletAction::Suspend).await
}

/// POST /wallets/:wallet_id/lock
async fn lock_wallet(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(wallet_id): Path<Uuid>,
) -> WalletResult {
    change_status(state, context, wallet_id, WalletAction::Lock).await
}

/// POST /wallets/:wallet_id/reactivate
async fn reactivate_wallet(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(wallet_id): Path<Uuid>,
) -> WalletResult {
    change_status(state, context, wallet_id, WalletAction::Reactivate).await
}

/// POST /wallets/:wallet_id/close
async fn close_wallet(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(wallet_id): Path<Uuid>,
) -> WalletResult {
    change_status(state, context, wallet_id, WalletAction::Close).await
}

// =========================================================================
// Transfers and payouts
// =========================================================================

/// POST /transfers
async fn transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    JsonBody(request): JsonBody<TransferRequest>,
) -> TransactionResult {
    let command = TransferCommand::new(
        request.source_wallet_id,
        request.destination_wallet_id,
        request.amount,
        request.currency,
        request.idempotency_key,
    )
    .with_description(request.description);

    let transaction = TransferHandler::new(state.store.clone())
        .execute(command, &context)
        .await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}

/// POST /payouts/:transaction_id/settle
async fn settle_payout(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transaction_id): Path<Uuid>,
    JsonBody(outcome): JsonBody<PayoutOutcome>,
) -> TransactionResult {
    let command = SettlePayoutCommand {
        transaction_id,
        outcome,
    };
    let transaction = SettlePayoutHandler::new(state.store.clone())
        .execute(command, &context)
        .await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}

// =========================================================================
// Transactions
// =========================================================================

/// POST /transactions
async fn create_transaction(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    JsonBody(command): JsonBody<CreateTransactionCommand>,
) -> AppResult<(StatusCode, Json<TransactionResponse>)> {
    let transaction = CreateTransactionHandler::new(state.store.clone())
        .execute(command, &context)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse::from(&transaction)),
    ))
}

/// GET /transactions/:transaction_id
async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> TransactionResult {
    let transaction = LedgerQueryHandler::new(state.store.clone())
        .get_transaction(transaction_id)
        .await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}

/// GET /transactions/by-key/:idempotency_key
async fn get_transaction_by_key(
    State(state): State<AppState>,
    Path(idempotency_key): Path<String>,
) -> TransactionResult {
    let transaction = LedgerQueryHandler::new(state.store.clone())
        .find_by_idempotency_key(&idempotency_key)
        .await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}

/// POST /transactions/:transaction_id/process
async fn process_transaction(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transaction_id): Path<Uuid>,
) -> TransactionResult {
    let transaction = ProcessTransactionHandler::new(state.store.clone())
        .process(transaction_id, &context)
        .await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}

/// POST /transactions/:transaction_id/retry
async fn retry_transaction(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transaction_id): Path<Uuid>,
) -> TransactionResult {
    let transaction = ProcessTransactionHandler::new(state.store.clone())
        .retry(transaction_id, &context)
        .await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}

/// POST /transactions/:transaction_id/cancel
async fn cancel_transaction(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transaction_id): Path<Uuid>,
    JsonBody(request): JsonBody<CancelRequest>,
) -> TransactionResult {
    let transaction = CancelTransactionHandler::new(state.store.clone())
        .execute(
            CancelTransactionCommand::new(transaction_id, request.reason),
            &context,
        )
        .await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}
