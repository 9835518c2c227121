//! API server entry point.

use std::error::Error;
use std::sync::Arc;

use api::{Config, LogFormat};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DB_MAX_CONNECTIONS: u32 = 10;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve<S: EventStore + Clone + 'static>(
    event_store: S,
    config: Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), Box<dyn Error>> {
    let state = api::create_default_state(event_store, config.settlement());

    // Replay whatever the store already holds before taking traffic.
    let replayed = state.projection_processor.run_catch_up().await?;
    tracing::info!(events = replayed, "read models caught up");

    let worker = Arc::clone(&state.projection_processor).spawn(config.projection_interval);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(
        %addr,
        commission = %config.commission_rate,
        max_attempts = config.retry.max_attempts,
        "starting marketplace API"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.shutdown().await;
    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresEventStore::connect(&url, DB_MAX_CONNECTIONS).await?;
            tracing::info!("using PostgreSQL event store");
            serve(store, config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, events are kept in memory");
            serve(InMemoryEventStore::new(), config, metrics_handle).await
        }
    }
}
