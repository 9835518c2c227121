use common::{Actor, AdminId, AgentId, AggregateId, BuyerId, OwnerId, VendorId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Aggregate, DeliveryAddress, DomainEvent, FulfillmentState, LineItem, Money, Order, OrderEvent,
    OrderService, PlaceOrder, Posting, WalletService,
};
use event_store::{AppendOptions, EventEnvelope, InMemoryEventStore, Version, store::EventStore};

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

fn checkout(order_id: AggregateId, buyer: BuyerId) -> PlaceOrder {
    PlaceOrder::new(
        order_id,
        buyer,
        VendorId::new(),
        vec![
            LineItem::new("SKU-001", "Widget", Money::from_cents(1000), 2),
            LineItem::new("SKU-002", "Gadget", Money::from_cents(550), 3),
        ],
        DeliveryAddress::new("1 Bench Rd", "Accra", "GH"),
    )
}

fn bench_place_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/place_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service = OrderService::new(InMemoryEventStore::new());
                let buyer = BuyerId::new();
                service
                    .place_order(
                        checkout(AggregateId::new(), buyer),
                        Money::zero(),
                        &Actor::Buyer(buyer),
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_wallet_credit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = WalletService::new(InMemoryEventStore::new());
    let owner = OwnerId::new();
    let admin = Actor::Admin(AdminId::new());
    let mut n = 0u64;

    c.bench_function("domain/wallet_credit", |b| {
        b.iter(|| {
            n += 1;
            let key = format!("bench-{n}");
            rt.block_on(async {
                service
                    .credit(Posting::new(owner, Money::from_cents(100), "bench", key), &admin)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_wallet_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = WalletService::new(InMemoryEventStore::new());
    let owner = OwnerId::new();
    let admin = Actor::Admin(AdminId::new());
    rt.block_on(async {
        service
            .credit(Posting::new(owner, Money::from_cents(100), "seed", "seed"), &admin)
            .await
            .unwrap();
    });

    c.bench_function("domain/wallet_replay", |b| {
        b.iter(|| {
            rt.block_on(async {
                service
                    .credit(Posting::new(owner, Money::from_cents(100), "seed", "seed"), &admin)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_order_reconstruction(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let order_id = AggregateId::new();
    let buyer = BuyerId::new();

    // Placement, assignment, delivery, then a run of payment retries on top.
    rt.block_on(async {
        let mut order = Order::default();
        let mut events = order
            .place(&checkout(order_id, buyer), Money::zero(), &Actor::Buyer(buyer))
            .unwrap();
        order.apply_events(events.clone());

        let system = Actor::system("bench");
        for (target, agent) in [
            (FulfillmentState::Assigned, Some(AgentId::new())),
            (FulfillmentState::Delivered, None),
        ] {
            let step = order.transition(target, &system, agent, None).unwrap();
            order.apply_events(step.clone());
            events.extend(step);
        }
        for attempt in 0..45 {
            events.push(OrderEvent::payment_declined(format!("gw-{attempt}"), "declined"));
        }

        let envelopes = events
            .iter()
            .enumerate()
            .map(|(i, e)| make_envelope(order_id, i as i64 + 1, e))
            .collect();
        store.append(envelopes, AppendOptions::new()).await.unwrap();
    });

    c.bench_function("domain/reconstruct_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = store.get_events_for_aggregate(order_id).await.unwrap();
                let mut order = Order::default();
                for envelope in &events {
                    let event: OrderEvent = envelope.decode().unwrap();
                    order.apply(event);
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_place_order,
    bench_wallet_credit,
    bench_wallet_replay,
    bench_order_reconstruction,
);
criterion_main!(benches);
