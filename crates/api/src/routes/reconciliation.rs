//! Operator endpoints for the reconciliation queue.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_store::EventStore;
use serde::Serialize;
use domain::Aggregate;
use settlement::{ReconciliationAction, ReconciliationReport, ReconciliationTask};

use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::AppState;

#[derive(Serialize)]
pub struct TaskResponse {
    pub id: String,
    pub order_id: String,
    pub action: Option<ReconciliationAction>,
    pub state: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: Option<String>,
}

impl From<&ReconciliationTask> for TaskResponse {
    fn from(task: &ReconciliationTask) -> Self {
        Self {
            id: task.id().map(|id| id.to_string()).unwrap_or_default(),
            order_id: task.order_id().map(|id| id.to_string()).unwrap_or_default(),
            action: task.action().cloned(),
            state: task.state().as_str().to_string(),
            attempts: task.attempts(),
            last_error: task.last_error().map(String::from),
            enqueued_at: task.enqueued_at().map(|at| at.to_rfc3339()),
        }
    }
}

fn require_operator(caller: &Caller) -> Result<(), ApiError> {
    if caller.0.is_privileged() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "{} may not operate the reconciliation queue",
            caller.0
        )))
    }
}

/// GET /reconciliation: tasks still waiting to be re-run.
#[tracing::instrument(skip(state), fields(actor = %caller.0))]
pub async fn pending<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    require_operator(&caller)?;
    let tasks = state.coordinator.pending().await?;
    Ok(Json(tasks.iter().map(TaskResponse::from).collect()))
}

/// POST /reconciliation/run: re-run every pending task once.
#[tracing::instrument(skip(state), fields(actor = %caller.0))]
pub async fn run<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<ReconciliationReport>, ApiError> {
    require_operator(&caller)?;
    let report = state.coordinator.reconcile().await?;
    tracing::info!(
        attempted = report.attempted,
        resolved = report.resolved,
        still_pending = report.still_pending,
        "reconciliation run finished"
    );
    Ok(Json(report))
}
