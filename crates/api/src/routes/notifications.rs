//! The caller's notification feed.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use event_store::EventStore;
use projections::Notification;
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FeedParams {
    /// Only notifications after this sequence number.
    pub since: Option<u64>,
}

/// GET /notifications
#[tracing::instrument(skip(state, params), fields(actor = %caller.0))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    state.refresh_views().await;

    let feed = match params.since {
        Some(sequence) => state.feed.since(&caller.0, sequence).await,
        None => state.feed.for_recipient(&caller.0).await,
    };
    Ok(Json(feed))
}
