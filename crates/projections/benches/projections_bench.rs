use std::sync::Arc;

use chrono::Utc;
use common::{Actor, AgentId, AggregateId, BuyerId, VendorId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::order::OrderPlacedData;
use domain::{
    DeliveryAddress, DomainEvent, FulfillmentState, LineItem, Money, OrderEvent, PaymentMethod,
};
use event_store::{AppendOptions, EventEnvelope, InMemoryEventStore, Version, store::EventStore};
use projections::{
    InProcessSessions, NotificationFeedView, OrderBoardView, Projection, ProjectionProcessor,
};

fn make_envelope(aggregate_id: AggregateId, version: i64, event: &OrderEvent) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("Order")
        .event_type(event.event_type())
        .version(Version::new(version))
        .payload(event)
        .unwrap()
        .build()
        .unwrap()
}

fn placed(order_id: AggregateId, buyer: BuyerId) -> OrderEvent {
    OrderEvent::OrderPlaced(OrderPlacedData {
        order_id,
        buyer_id: buyer,
        vendor_id: VendorId::new(),
        line_items: vec![LineItem::new("SKU-001", "Widget", Money::from_cents(1000), 2)],
        address: DeliveryAddress::new("1 Bench Rd", "Accra", "GH"),
        coupon_code: None,
        payment_method: PaymentMethod::Card,
        total_amount: Money::from_cents(2000),
        discount_amount: Money::zero(),
        placed_by: Actor::Buyer(buyer),
        placed_at: Utc::now(),
    })
}

/// N orders, each placed, assigned and delivered.
async fn populate_store(store: &InMemoryEventStore, n: usize, buyer: BuyerId) {
    for _ in 0..n {
        let order_id = AggregateId::new();
        let agent = AgentId::new();
        let system = Actor::system("bench");
        let assigned = OrderEvent::fulfillment_changed(
            FulfillmentState::InProgress,
            FulfillmentState::Assigned,
            system.clone(),
            Some(agent),
            None,
            Utc::now(),
        );
        let delivered = OrderEvent::fulfillment_changed(
            FulfillmentState::Assigned,
            FulfillmentState::Delivered,
            system,
            None,
            None,
            Utc::now(),
        );

        let events = vec![
            make_envelope(order_id, 1, &placed(order_id, buyer)),
            make_envelope(order_id, 2, &assigned),
            make_envelope(order_id, 3, &delivered),
        ];
        store.append(events, AppendOptions::new()).await.unwrap();
    }
}

fn processor_for(
    store: InMemoryEventStore,
    board: &OrderBoardView,
) -> ProjectionProcessor<InMemoryEventStore> {
    let mut processor = ProjectionProcessor::new(store);
    processor.register(Box::new(board.clone()) as Box<dyn Projection>);
    processor.register(Box::new(NotificationFeedView::new(Arc::new(
        InProcessSessions::new(),
    ))));
    processor
}

fn bench_catch_up_1000_orders(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate_store(&store, 1000, BuyerId::new()));

    c.bench_function("projections/catch_up_3000_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let processor = processor_for(store.clone(), &OrderBoardView::new());
                processor.run_catch_up().await.unwrap();
            });
        });
    });
}

fn bench_process_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let board = OrderBoardView::new();

    c.bench_function("projections/order_board_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order_id = AggregateId::new();
                let envelope = make_envelope(order_id, 1, &placed(order_id, BuyerId::new()));
                board.handle(&envelope).await.unwrap();
            });
        });
    });
}

fn bench_query_for_buyer(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let board = OrderBoardView::new();
    let target = BuyerId::new();

    rt.block_on(async {
        populate_store(&store, 5, target).await;
        populate_store(&store, 95, BuyerId::new()).await;
        processor_for(store, &board).run_catch_up().await.unwrap();
    });

    c.bench_function("projections/query_for_buyer", |b| {
        b.iter(|| {
            rt.block_on(async {
                board.for_buyer(target).await;
            });
        });
    });
}

fn bench_rebuild_100_orders(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate_store(&store, 100, BuyerId::new()));
    let processor = processor_for(store, &OrderBoardView::new());

    c.bench_function("projections/rebuild_300_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                processor.rebuild_all().await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_catch_up_1000_orders,
    bench_process_single_event,
    bench_query_for_buyer,
    bench_rebuild_100_orders,
);
criterion_main!(benches);
