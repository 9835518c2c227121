//! Delivery assignment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{AgentId, AggregateId};
use domain::{AssignmentState, DeliveryAssignment, DeliveryEstimate};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::commissions::CommissionResponse;
use super::orders::OrderResponse;
use super::parse_id;
use crate::error::ApiError;
use crate::extract::{Body, Caller};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AssignRequest {
    pub agent_id: String,
    pub distance_meters: Option<u32>,
    pub eta_minutes: Option<u32>,
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    pub target: AssignmentState,
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct AssignmentResponse {
    pub id: String,
    pub order_id: String,
    pub agent_id: String,
    pub state: String,
    pub distance_meters: Option<u32>,
    pub eta_minutes: Option<u32>,
    pub assigned_at: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub cancel_reason: Option<String>,
}

#[derive(Serialize)]
pub struct AdvanceResponse {
    pub assignment: AssignmentResponse,
    pub order: OrderResponse,
    pub commission: Option<CommissionResponse>,
}

impl From<&DeliveryAssignment> for AssignmentResponse {
    fn from(assignment: &DeliveryAssignment) -> Self {
        let estimate = assignment.estimate();
        let order_id = assignment.order_id();
        Self {
            id: order_id
                .map(|id| DeliveryAssignment::id_for(id).to_string())
                .unwrap_or_default(),
            order_id: order_id.map(|id| id.to_string()).unwrap_or_default(),
            agent_id: assignment
                .agent_id()
                .map(|id| id.to_string())
                .unwrap_or_default(),
            state: assignment.state().to_string(),
            distance_meters: estimate.distance_meters,
            eta_minutes: estimate.eta_minutes,
            assigned_at: assignment.assigned_at().map(|at| at.to_rfc3339()),
            started_at: assignment.started_at().map(|at| at.to_rfc3339()),
            completed_at: assignment.completed_at().map(|at| at.to_rfc3339()),
            cancelled_at: assignment.cancelled_at().map(|at| at.to_rfc3339()),
            cancel_reason: assignment.cancel_reason().map(String::from),
        }
    }
}

/// POST /orders/{id}/delivery: assign an agent to an in-progress order.
#[tracing::instrument(skip(state, req), fields(actor = %caller.0))]
pub async fn assign<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Body(req): Body<AssignRequest>,
) -> Result<(StatusCode, Json<AssignmentResponse>), ApiError> {
    let order_id = parse_id::<AggregateId>("order id", &id)?;
    let agent_id = parse_id::<AgentId>("agent_id", &req.agent_id)?;
    let estimate = DeliveryEstimate {
        distance_meters: req.distance_meters,
        eta_minutes: req.eta_minutes,
    };

    let assignment = state
        .coordinator
        .assign_delivery(order_id, agent_id, estimate, &caller.0)
        .await?;
    Ok((StatusCode::CREATED, Json(AssignmentResponse::from(&assignment))))
}

/// POST /deliveries/{id}/advance: move an assignment. Completing it
/// delivers the order and settles the agent's commission.
#[tracing::instrument(skip(state, req), fields(actor = %caller.0))]
pub async fn advance<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Body(req): Body<AdvanceRequest>,
) -> Result<Json<AdvanceResponse>, ApiError> {
    let assignment_id = parse_id::<AggregateId>("assignment id", &id)?;
    let advanced = state
        .coordinator
        .advance_assignment(assignment_id, req.target, &caller.0, req.reason)
        .await?;

    Ok(Json(AdvanceResponse {
        assignment: AssignmentResponse::from(&advanced.assignment),
        order: OrderResponse::from(&advanced.order),
        commission: advanced.commission.as_ref().map(CommissionResponse::from),
    }))
}

/// GET /deliveries/{id}
#[tracing::instrument(skip(state), fields(actor = %caller.0))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let assignment_id = parse_id::<AggregateId>("assignment id", &id)?;
    let assignment = state
        .coordinator
        .deliveries()
        .require_assignment(assignment_id)
        .await?;

    if !assignment.is_assigned_to(&caller.0) {
        let order_id = assignment
            .order_id()
            .ok_or_else(|| ApiError::NotFound(format!("assignment {id} not found")))?;
        let order = state.coordinator.orders().require_order(order_id).await?;
        if !order.is_visible_to(&caller.0) {
            return Err(ApiError::Forbidden(format!(
                "{} may not view assignment {id}",
                caller.0
            )));
        }
    }

    Ok(Json(AssignmentResponse::from(&assignment)))
}
