//! Shared application state.

use std::sync::Arc;

use domain::WalletService;
use event_store::EventStore;
use projections::{
    InProcessSessions, NotificationFeedView, OrderBoardView, Projection, ProjectionProcessor,
};
use settlement::{
    InMemoryCouponCatalog, InMemoryLogistics, LocalLedger, SettlementConfig,
    SettlementCoordinator,
};

/// The coordinator as wired in this service: coupons and logistics are
/// in-process stand-ins, the ledger is the local wallet service.
pub type Coordinator<S> =
    SettlementCoordinator<S, InMemoryCouponCatalog, InMemoryLogistics, LocalLedger<S>>;

pub struct AppState<S: EventStore> {
    pub coordinator: Coordinator<S>,
    pub board: OrderBoardView,
    pub feed: NotificationFeedView,
    pub sessions: InProcessSessions,
    pub projection_processor: Arc<ProjectionProcessor<S>>,
}

impl<S: EventStore + Clone + 'static> AppState<S> {
    pub fn new(store: S, settlement: SettlementConfig) -> Self {
        let ledger = LocalLedger::new(WalletService::new(store.clone()));
        let coordinator = SettlementCoordinator::new(
            store.clone(),
            InMemoryCouponCatalog::new(),
            InMemoryLogistics::new(),
            ledger,
            settlement,
        );

        let sessions = InProcessSessions::new();
        let board = OrderBoardView::new();
        let feed = NotificationFeedView::new(Arc::new(sessions.clone()));

        let mut processor = ProjectionProcessor::new(store);
        processor.register(Box::new(board.clone()) as Box<dyn Projection>);
        processor.register(Box::new(feed.clone()));

        Self {
            coordinator,
            board,
            feed,
            sessions,
            projection_processor: Arc::new(processor),
        }
    }

    pub fn wallets(&self) -> &WalletService<S> {
        self.coordinator.ledger().wallets()
    }

    /// Brings the read models up to date before a query. A failure only
    /// means the answer may be stale.
    pub async fn refresh_views(&self) {
        if let Err(err) = self.projection_processor.run_catch_up().await {
            tracing::warn!(error = %err, "read models may be stale");
        }
    }
}
