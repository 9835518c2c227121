//! Agent commission endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::AggregateId;
use domain::CommissionEntry;
use event_store::EventStore;
use serde::Serialize;

use super::parse_id;
use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CommissionResponse {
    pub order_id: String,
    pub agent_id: String,
    pub rate_bps: Option<u32>,
    pub amount_cents: i64,
    pub state: String,
    pub ledger_key: Option<String>,
    pub failure_reason: Option<String>,
    pub recorded_at: Option<String>,
    pub paid_at: Option<String>,
}

impl From<&CommissionEntry> for CommissionResponse {
    fn from(entry: &CommissionEntry) -> Self {
        Self {
            order_id: entry.order_id().map(|id| id.to_string()).unwrap_or_default(),
            agent_id: entry.agent_id().map(|id| id.to_string()).unwrap_or_default(),
            rate_bps: entry.rate().map(|rate| rate.as_bps()),
            amount_cents: entry.amount().cents(),
            state: entry.state().to_string(),
            ledger_key: entry.ledger_key().map(String::from),
            failure_reason: entry.failure_reason().map(String::from),
            recorded_at: entry.recorded_at().map(|at| at.to_rfc3339()),
            paid_at: entry.paid_at().map(|at| at.to_rfc3339()),
        }
    }
}

/// POST /orders/{id}/commission: settle the agent's commission for a
/// delivered order. Settling twice yields the same entry.
#[tracing::instrument(skip(state), fields(actor = %caller.0))]
pub async fn settle<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<CommissionResponse>, ApiError> {
    let order_id = parse_id::<AggregateId>("order id", &id)?;
    if !caller.0.is_privileged() {
        let order = state.coordinator.orders().require_order(order_id).await?;
        if !order.is_vendor(&caller.0) {
            return Err(ApiError::Forbidden(format!(
                "{} may not settle commission for order {id}",
                caller.0
            )));
        }
    }

    let entry = state.coordinator.settle_commission(order_id).await?;
    Ok(Json(CommissionResponse::from(&entry)))
}

/// GET /orders/{id}/commission
#[tracing::instrument(skip(state), fields(actor = %caller.0))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<CommissionResponse>, ApiError> {
    let order_id = parse_id::<AggregateId>("order id", &id)?;
    let order = state.coordinator.orders().require_order(order_id).await?;
    if !order.is_visible_to(&caller.0) {
        return Err(ApiError::Forbidden(format!(
            "{} may not view commission for order {id}",
            caller.0
        )));
    }

    let entry = state
        .coordinator
        .commissions()
        .get_commission(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no commission recorded for order {id}")))?;
    Ok(Json(CommissionResponse::from(&entry)))
}
