//! Wallet ledger endpoints.
//!
//! Every mutation is keyed by the `Idempotency-Key` header; a repeated key
//! answers with the original entry and `replayed: true`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{AggregateId, OwnerId};
use domain::{
    LedgerEntry, LedgerReceipt, Money, PayoutDetails, Posting, SettleWithdrawal, Withdraw,
    WithdrawalOutcome,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::error::ApiError;
use crate::extract::{Body, Caller, IdempotencyKey};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PostingRequest {
    pub amount_cents: i64,
    pub reason: String,
    pub order_id: Option<String>,
}

#[derive(Deserialize)]
pub struct WithdrawRequest {
    pub amount_cents: i64,
    pub payout: PayoutDetails,
}

#[derive(Deserialize)]
pub struct SettleWithdrawalRequest {
    pub outcome: WithdrawalOutcome,
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct EntryResponse {
    pub key: String,
    pub direction: String,
    pub amount_cents: i64,
    pub reason: String,
    pub order_id: Option<String>,
    pub state: String,
    pub created_at: String,
    pub settled_at: Option<String>,
    pub payout: Option<PayoutDetails>,
}

impl From<&LedgerEntry> for EntryResponse {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            key: entry.key.clone(),
            direction: entry.direction.as_str().to_string(),
            amount_cents: entry.amount.cents(),
            reason: entry.reason.clone(),
            order_id: entry.related_order_id.map(|id| id.to_string()),
            state: entry.state.as_str().to_string(),
            created_at: entry.created_at.to_rfc3339(),
            settled_at: entry.settled_at.map(|at| at.to_rfc3339()),
            payout: entry.payout.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct ReceiptResponse {
    pub entry: EntryResponse,
    pub balance_cents: i64,
    pub replayed: bool,
}

impl From<LedgerReceipt> for ReceiptResponse {
    fn from(receipt: LedgerReceipt) -> Self {
        Self {
            entry: EntryResponse::from(&receipt.entry),
            balance_cents: receipt.balance.cents(),
            replayed: receipt.replayed,
        }
    }
}

#[derive(Serialize)]
pub struct WalletResponse {
    pub owner_id: String,
    pub balance_cents: i64,
    pub entries: Vec<EntryResponse>,
}

fn posting(owner: &str, key: String, req: PostingRequest) -> Result<Posting, ApiError> {
    let owner_id = parse_id::<OwnerId>("owner id", owner)?;
    let mut posting = Posting::new(owner_id, Money::from_cents(req.amount_cents), req.reason, key);
    if let Some(raw) = &req.order_id {
        posting = posting.for_order(parse_id::<AggregateId>("order_id", raw)?);
    }
    Ok(posting)
}

/// POST /wallets/{owner}/credit
#[tracing::instrument(skip(state, req), fields(actor = %caller.0))]
pub async fn credit<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    IdempotencyKey(key): IdempotencyKey,
    Path(owner): Path<String>,
    Body(req): Body<PostingRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let posting = posting(&owner, key, req)?;
    let receipt = state.wallets().credit(posting, &caller.0).await?;
    Ok(Json(receipt.into()))
}

/// POST /wallets/{owner}/debit
#[tracing::instrument(skip(state, req), fields(actor = %caller.0))]
pub async fn debit<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    IdempotencyKey(key): IdempotencyKey,
    Path(owner): Path<String>,
    Body(req): Body<PostingRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let posting = posting(&owner, key, req)?;
    let receipt = state.wallets().debit(posting, &caller.0).await?;
    Ok(Json(receipt.into()))
}

/// POST /wallets/{owner}/withdraw: reserve funds for a payout. The entry
/// stays pending until the payout processor settles it.
#[tracing::instrument(skip(state, req), fields(actor = %caller.0))]
pub async fn withdraw<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    IdempotencyKey(key): IdempotencyKey,
    Path(owner): Path<String>,
    Body(req): Body<WithdrawRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let owner_id = parse_id::<OwnerId>("owner id", &owner)?;
    let cmd = Withdraw::new(owner_id, Money::from_cents(req.amount_cents), key, req.payout);
    let receipt = state.wallets().withdraw(cmd, &caller.0).await?;
    Ok(Json(receipt.into()))
}

/// POST /wallets/{owner}/withdrawals/{key}/settle: payout processor callback.
#[tracing::instrument(skip(state, req), fields(actor = %caller.0))]
pub async fn settle_withdrawal<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path((owner, key)): Path<(String, String)>,
    Body(req): Body<SettleWithdrawalRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let owner_id = parse_id::<OwnerId>("owner id", &owner)?;
    let cmd = SettleWithdrawal {
        owner_id,
        idempotency_key: key,
        outcome: req.outcome,
        reason: req.reason,
    };
    let receipt = state.wallets().settle_withdrawal(cmd, &caller.0).await?;
    Ok(Json(receipt.into()))
}

/// GET /wallets/{owner}: balance and full ledger. A wallet with no entries
/// yet reads as empty.
#[tracing::instrument(skip(state), fields(actor = %caller.0))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(owner): Path<String>,
) -> Result<Json<WalletResponse>, ApiError> {
    let owner_id = parse_id::<OwnerId>("owner id", &owner)?;
    let wallet = state.wallets().wallet_for(owner_id, &caller.0).await?;

    let (balance_cents, entries) = match &wallet {
        Some(wallet) => (
            wallet.balance().cents(),
            wallet.entries().iter().map(EntryResponse::from).collect(),
        ),
        None => (0, Vec::new()),
    };

    Ok(Json(WalletResponse {
        owner_id: owner_id.to_string(),
        balance_cents,
        entries,
    }))
}
