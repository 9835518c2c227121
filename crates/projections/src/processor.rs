//! Feeds stored events to registered projections.

use std::sync::Arc;
use std::time::Duration;

use event_store::{EventEnvelope, EventStore};
use futures_util::StreamExt;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::projection::Projection;
use crate::{ProjectionError, Result};

/// Delivers events from an event store to projections.
///
/// - Catch-up: offers every event the projection has not seen yet
/// - Single event delivery: offers one event to every projection
/// - Rebuild: resets all projections and replays from scratch
/// - Background: [`ProjectionProcessor::spawn`] repeats catch-up on an interval
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    catch_up: Mutex<()>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            catch_up: Mutex::new(()),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams the whole log and hands each projection the events past its
    /// position. Concurrent calls are serialized so no event is applied twice.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let _guard = self.catch_up.lock().await;
        let mut stream = self.store.stream_all_events().await?;
        let mut event_index: u64 = 0;
        let mut delivered: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            event_index += 1;

            for projection in &self.projections {
                if projection.position().await.is_behind(event_index) {
                    deliver(projection.as_ref(), &event).await?;
                    delivered += 1;
                    metrics::counter!("projections_events_processed").increment(1);
                }
            }
        }

        if delivered > 0 {
            tracing::debug!(events = event_index, delivered, "catch-up complete");
        }
        Ok(delivered)
    }

    /// Offers a single event to every registered projection.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            deliver(projection.as_ref(), event).await?;
        }
        Ok(())
    }

    /// Resets all projections and replays the log.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<()> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.run_catch_up().await.map(|_| ())
    }
}

impl<S: EventStore + 'static> ProjectionProcessor<S> {
    /// Runs catch-up every `every` until the returned worker is shut down.
    ///
    /// Failures are logged and retried on the next tick; they never reach
    /// the write side.
    pub fn spawn(self: Arc<Self>, every: Duration) -> ProjectionWorker {
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = self.run_catch_up().await {
                            metrics::counter!("projection_failures_total").increment(1);
                            tracing::warn!(error = %err, "projection catch-up failed");
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            tracing::info!("projection worker stopped");
        });

        ProjectionWorker { stop, handle }
    }
}

async fn deliver(projection: &dyn Projection, event: &EventEnvelope) -> Result<()> {
    projection
        .handle(event)
        .await
        .map_err(|err| ProjectionError::Projection {
            projection: projection.name(),
            message: err.to_string(),
        })
}

/// Handle to a background catch-up loop.
pub struct ProjectionWorker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ProjectionWorker {
    /// Stops the loop after its current pass and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "projection worker panicked");
        }
    }
}
