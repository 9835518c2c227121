//! Per-recipient notification feed.
//!
//! | event | recipients |
//! |---|---|
//! | order placed | vendor |
//! | fulfillment changed | buyer, vendor, assigned agent |
//! | commission paid | agent |
//! | order refunded | buyer |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Actor, AgentId, AggregateId, BuyerId, VendorId};
use domain::{
    Aggregate, CommissionEntry, CommissionEvent, FulfillmentState, Money, Order, OrderEvent,
};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::Result;
use crate::notification::{Notification, NotificationKind};
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;
use crate::session::SessionRegistry;

#[derive(Debug, Clone, Copy)]
struct Participants {
    buyer: BuyerId,
    vendor: VendorId,
    agent: Option<AgentId>,
}

#[derive(Debug, Clone, Copy)]
struct PendingCommission {
    order_id: AggregateId,
    agent: AgentId,
    amount: Money,
}

#[derive(Default)]
struct FeedState {
    participants: HashMap<AggregateId, Participants>,
    commissions: HashMap<AggregateId, PendingCommission>,
    feeds: HashMap<Actor, Vec<Notification>>,
    sequence: u64,
}

impl FeedState {
    fn push(
        &mut self,
        recipient: Actor,
        order_id: AggregateId,
        kind: NotificationKind,
        at: DateTime<Utc>,
    ) -> Notification {
        self.sequence += 1;
        let notification = Notification::new(self.sequence, recipient.clone(), order_id, kind, at);
        self.feeds
            .entry(recipient)
            .or_default()
            .push(notification.clone());
        notification
    }

    fn on_order(&mut self, order_id: AggregateId, event: OrderEvent) -> Vec<Notification> {
        match event {
            OrderEvent::OrderPlaced(data) => {
                self.participants.insert(
                    order_id,
                    Participants {
                        buyer: data.buyer_id,
                        vendor: data.vendor_id,
                        agent: None,
                    },
                );
                let kind = NotificationKind::OrderStateChanged {
                    state: FulfillmentState::InProgress,
                };
                vec![self.push(Actor::Vendor(data.vendor_id), order_id, kind, data.placed_at)]
            }
            OrderEvent::FulfillmentChanged(data) => {
                let Some(parties) = self.participants.get_mut(&order_id) else {
                    return Vec::new();
                };
                if data.agent_id.is_some() {
                    parties.agent = data.agent_id;
                }
                let parties = *parties;

                let mut recipients =
                    vec![Actor::Buyer(parties.buyer), Actor::Vendor(parties.vendor)];
                recipients.extend(parties.agent.map(Actor::Agent));
                recipients
                    .into_iter()
                    .map(|recipient| {
                        let kind = NotificationKind::OrderStateChanged { state: data.to };
                        self.push(recipient, order_id, kind, data.changed_at)
                    })
                    .collect()
            }
            OrderEvent::OrderRefunded(data) => {
                let Some(parties) = self.participants.get(&order_id).copied() else {
                    return Vec::new();
                };
                let kind = NotificationKind::RefundIssued {
                    amount: data.amount,
                };
                vec![self.push(Actor::Buyer(parties.buyer), order_id, kind, data.refunded_at)]
            }
            _ => Vec::new(),
        }
    }

    fn on_commission(
        &mut self,
        commission_id: AggregateId,
        event: CommissionEvent,
    ) -> Vec<Notification> {
        match event {
            CommissionEvent::CommissionRecorded(data) => {
                self.commissions.insert(
                    commission_id,
                    PendingCommission {
                        order_id: data.order_id,
                        agent: data.agent_id,
                        amount: data.amount,
                    },
                );
                Vec::new()
            }
            CommissionEvent::CommissionPaid { paid_at, .. } => {
                let Some(entry) = self.commissions.get(&commission_id).copied() else {
                    return Vec::new();
                };
                let kind = NotificationKind::CommissionPaid {
                    amount: entry.amount,
                };
                vec![self.push(Actor::Agent(entry.agent), entry.order_id, kind, paid_at)]
            }
            CommissionEvent::CommissionPayoutFailed { .. } => Vec::new(),
        }
    }
}

/// Feed of order state changes, commission payouts and refunds per
/// recipient. New entries are also pushed to the recipient's live sessions.
#[derive(Clone)]
pub struct NotificationFeedView {
    state: Arc<RwLock<FeedState>>,
    position: Arc<RwLock<ProjectionPosition>>,
    sessions: Arc<dyn SessionRegistry>,
}

impl NotificationFeedView {
    pub fn new(sessions: Arc<dyn SessionRegistry>) -> Self {
        Self {
            state: Arc::new(RwLock::new(FeedState::default())),
            position: Arc::new(RwLock::new(ProjectionPosition::zero())),
            sessions,
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionRegistry> {
        &self.sessions
    }

    /// Entries for `recipient`, oldest first.
    pub async fn for_recipient(&self, recipient: &Actor) -> Vec<Notification> {
        self.state
            .read()
            .await
            .feeds
            .get(recipient)
            .cloned()
            .unwrap_or_default()
    }

    /// Entries for `recipient` after `sequence`, for polling clients.
    pub async fn since(&self, recipient: &Actor, sequence: u64) -> Vec<Notification> {
        self.for_recipient(recipient)
            .await
            .into_iter()
            .filter(|n| n.sequence > sequence)
            .collect()
    }

    fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            let live = self.sessions.broadcast(&notification.recipient, &notification);
            metrics::counter!(
                "notifications_dispatched_total",
                "kind" => notification.kind.as_str()
            )
            .increment(1);
            tracing::debug!(
                recipient = %notification.recipient,
                order_id = %notification.order_id,
                kind = notification.kind.as_str(),
                live,
                "notification dispatched"
            );
        }
    }
}

#[async_trait]
impl Projection for NotificationFeedView {
    fn name(&self) -> &'static str {
        "NotificationFeedView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let fresh = if event.aggregate_type == Order::aggregate_type() {
            let order_event: OrderEvent = event.decode()?;
            self.state.write().await.on_order(event.aggregate_id, order_event)
        } else if event.aggregate_type == CommissionEntry::aggregate_type() {
            let commission_event: CommissionEvent = event.decode()?;
            self.state
                .write()
                .await
                .on_commission(event.aggregate_id, commission_event)
        } else {
            Vec::new()
        };

        self.dispatch(fresh);
        let mut pos = self.position.write().await;
        *pos = pos.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = FeedState::default();
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}

#[async_trait]
impl ReadModel for NotificationFeedView {
    fn name(&self) -> &'static str {
        "NotificationFeedView"
    }

    async fn count(&self) -> usize {
        self.state.read().await.feeds.len()
    }
}
