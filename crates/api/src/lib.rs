//! HTTP API for marketplace order settlement.
//!
//! Every handler takes the caller from the identity headers (see
//! [`extract::Caller`]) and delegates to the settlement coordinator, the
//! wallet service or the read models.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use settlement::SettlementConfig;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::ApiError;
pub use state::{AppState, Coordinator};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/transition", post(routes::orders::transition::<S>))
        .route("/orders/{id}/payment", post(routes::orders::payment::<S>))
        .route("/orders/{id}/return", post(routes::orders::request_return::<S>))
        .route(
            "/orders/{id}/return/decision",
            post(routes::orders::decide_return::<S>),
        )
        .route("/orders/{id}/delivery", post(routes::deliveries::assign::<S>))
        .route(
            "/orders/{id}/commission",
            post(routes::commissions::settle::<S>).get(routes::commissions::get::<S>),
        )
        .route("/deliveries/{id}", get(routes::deliveries::get::<S>))
        .route("/deliveries/{id}/advance", post(routes::deliveries::advance::<S>))
        .route("/wallets/{owner}", get(routes::wallets::get::<S>))
        .route("/wallets/{owner}/credit", post(routes::wallets::credit::<S>))
        .route("/wallets/{owner}/debit", post(routes::wallets::debit::<S>))
        .route("/wallets/{owner}/withdraw", post(routes::wallets::withdraw::<S>))
        .route(
            "/wallets/{owner}/withdrawals/{key}/settle",
            post(routes::wallets::settle_withdrawal::<S>),
        )
        .route("/reconciliation", get(routes::reconciliation::pending::<S>))
        .route("/reconciliation/run", post(routes::reconciliation::run::<S>))
        .route("/notifications", get(routes::notifications::list::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state with in-process collaborators.
pub fn create_default_state<S: EventStore + Clone + 'static>(
    event_store: S,
    settlement: SettlementConfig,
) -> Arc<AppState<S>> {
    Arc::new(AppState::new(event_store, settlement))
}
