//! Order placement, lifecycle and return endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Actor, AgentId, AggregateId, BuyerId, VendorId};
use domain::{
    Aggregate, DeliveryAddress, FulfillmentState, LineItem, Money, Order, PaymentMethod,
    PlaceOrder, ProcessReturn, RequestReturn, ReturnDecision, TransitionOrder,
};
use event_store::EventStore;
use projections::OrderSummary;
use serde::{Deserialize, Serialize};
use settlement::PaymentOutcome;

use super::parse_id;
use crate::error::ApiError;
use crate::extract::{Body, Caller};
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    /// Defaults to the calling buyer.
    pub buyer_id: Option<String>,
    pub vendor_id: String,
    pub line_items: Vec<LineItemRequest>,
    pub address: DeliveryAddress,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

#[derive(Deserialize)]
pub struct LineItemRequest {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
pub struct ListOrdersParams {
    pub state: Option<FulfillmentState>,
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub target: FulfillmentState,
    pub agent_id: Option<String>,
    pub reason: Option<String>,
}

/// Payment gateway callback.
#[derive(Deserialize)]
pub struct PaymentCallback {
    pub transaction_id: String,
    #[serde(flatten)]
    pub outcome: PaymentOutcome,
}

#[derive(Deserialize)]
pub struct ReturnRequestBody {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ReturnDecisionRequest {
    pub decision: ReturnDecision,
    pub refund_cents: Option<i64>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub buyer_id: String,
    pub vendor_id: String,
    pub agent_id: Option<String>,
    pub fulfillment_state: String,
    pub payment_state: String,
    pub payment_method: PaymentMethod,
    pub payment_transaction_id: Option<String>,
    pub line_items: Vec<LineItemResponse>,
    pub address: DeliveryAddress,
    pub coupon_code: Option<String>,
    pub total_cents: i64,
    pub discount_cents: i64,
    pub final_cents: i64,
    pub return_request: Option<ReturnResponse>,
    pub status_history: Vec<StatusChangeResponse>,
    pub placed_at: Option<String>,
}

#[derive(Serialize)]
pub struct LineItemResponse {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct ReturnResponse {
    pub reason: String,
    pub state: String,
    pub requested_at: String,
    pub decision: Option<String>,
    pub refund_cents: Option<i64>,
}

#[derive(Serialize)]
pub struct StatusChangeResponse {
    pub state: String,
    pub at: String,
    pub actor: String,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().map(|id| id.to_string()).unwrap_or_default(),
            buyer_id: order.buyer_id().map(|id| id.to_string()).unwrap_or_default(),
            vendor_id: order.vendor_id().map(|id| id.to_string()).unwrap_or_default(),
            agent_id: order.agent_id().map(|id| id.to_string()),
            fulfillment_state: order.fulfillment_state().to_string(),
            payment_state: order.payment_state().to_string(),
            payment_method: order.payment_method(),
            payment_transaction_id: order.payment_transaction_id().map(String::from),
            line_items: order
                .line_items()
                .iter()
                .map(|item| LineItemResponse {
                    product_id: item.product_id.as_str().to_string(),
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                })
                .collect(),
            address: order.address().clone(),
            coupon_code: order.coupon_code().map(String::from),
            total_cents: order.total_amount().cents(),
            discount_cents: order.discount_amount().cents(),
            final_cents: order.final_amount().cents(),
            return_request: order.return_request().map(|r| ReturnResponse {
                reason: r.reason.clone(),
                state: r.state.to_string(),
                requested_at: r.requested_at.to_rfc3339(),
                decision: r.decision.map(|d| d.to_string()),
                refund_cents: r.refund_amount.map(|amount| amount.cents()),
            }),
            status_history: order
                .status_history()
                .iter()
                .map(|change| StatusChangeResponse {
                    state: change.state.to_string(),
                    at: change.at.to_rfc3339(),
                    actor: change.actor.to_string(),
                })
                .collect(),
            placed_at: order.placed_at().map(|at| at.to_rfc3339()),
        }
    }
}

// -- Handlers --

/// POST /orders: place an order for the calling buyer.
#[tracing::instrument(skip(state, req), fields(actor = %caller.0))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Body(req): Body<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let actor = caller.0;
    let buyer_id = match (&req.buyer_id, &actor) {
        (Some(raw), _) => parse_id::<BuyerId>("buyer_id", raw)?,
        (None, Actor::Buyer(id)) => *id,
        (None, _) => return Err(ApiError::BadRequest("buyer_id is required".into())),
    };
    let vendor_id = parse_id::<VendorId>("vendor_id", &req.vendor_id)?;

    let line_items = req
        .line_items
        .into_iter()
        .map(|item| {
            LineItem::new(
                item.product_id,
                item.name,
                Money::from_cents(item.unit_price_cents),
                item.quantity,
            )
        })
        .collect();

    let order_id = AggregateId::new();
    let mut cmd = PlaceOrder::new(order_id, buyer_id, vendor_id, line_items, req.address)
        .with_payment_method(req.payment_method);
    if let Some(code) = req.coupon_code.filter(|c| !c.trim().is_empty()) {
        cmd = cmd.with_coupon(code);
    }

    let order = state.coordinator.place_order(cmd, &actor).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders: orders the caller may see, from the order board.
#[tracing::instrument(skip(state, params), fields(actor = %caller.0))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<Vec<OrderSummary>>, ApiError> {
    state.refresh_views().await;

    let mut orders = state.board.visible_to(&caller.0).await;
    if let Some(wanted) = params.state {
        orders.retain(|o| o.fulfillment_state == wanted);
    }
    Ok(Json(orders))
}

/// GET /orders/{id}: load an order the caller is party to.
#[tracing::instrument(skip(state), fields(actor = %caller.0))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id::<AggregateId>("order id", &id)?;
    let order = state.coordinator.orders().require_order(order_id).await?;
    if !order.is_visible_to(&caller.0) {
        return Err(ApiError::Forbidden(format!("{} may not view order {id}", caller.0)));
    }
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/transition: move the order's fulfillment state.
#[tracing::instrument(skip(state, req), fields(actor = %caller.0))]
pub async fn transition<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Body(req): Body<TransitionRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id::<AggregateId>("order id", &id)?;

    let mut cmd = TransitionOrder::new(order_id, req.target, caller.0);
    if let Some(raw) = &req.agent_id {
        cmd = cmd.with_agent(parse_id::<AgentId>("agent_id", raw)?);
    }
    if let Some(reason) = req.reason {
        cmd = cmd.with_reason(reason);
    }

    let order = state.coordinator.transition_order(cmd).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/payment: payment gateway callback.
#[tracing::instrument(skip(state, req), fields(actor = %caller.0))]
pub async fn payment<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Body(req): Body<PaymentCallback>,
) -> Result<Json<OrderResponse>, ApiError> {
    if !caller.0.is_privileged() {
        return Err(ApiError::Forbidden(format!(
            "{} may not report payment outcomes",
            caller.0
        )));
    }
    let order_id = parse_id::<AggregateId>("order id", &id)?;
    if req.transaction_id.trim().is_empty() {
        return Err(ApiError::BadRequest("transaction_id is required".into()));
    }

    let order = state
        .coordinator
        .confirm_payment(order_id, &req.transaction_id, req.outcome)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/return: the buyer asks to return a delivered order.
#[tracing::instrument(skip(state, req), fields(actor = %caller.0))]
pub async fn request_return<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Body(req): Body<ReturnRequestBody>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id::<AggregateId>("order id", &id)?;
    let order = state
        .coordinator
        .request_return(RequestReturn::new(order_id, req.reason, caller.0))
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/return/decision: the vendor approves or rejects a
/// return. Approval refunds the buyer's wallet.
#[tracing::instrument(skip(state, req), fields(actor = %caller.0))]
pub async fn decide_return<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Body(req): Body<ReturnDecisionRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id::<AggregateId>("order id", &id)?;
    let cmd = match req.decision {
        ReturnDecision::Approved => {
            let cents = req.refund_cents.ok_or_else(|| {
                ApiError::BadRequest("refund_cents is required to approve a return".into())
            })?;
            ProcessReturn::approve(order_id, Money::from_cents(cents), caller.0)
        }
        ReturnDecision::Rejected => ProcessReturn::reject(order_id, caller.0),
    };

    let order = state.coordinator.process_return(cmd).await?;
    Ok(Json(OrderResponse::from(&order)))
}
