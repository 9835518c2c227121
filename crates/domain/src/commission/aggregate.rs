use chrono::{DateTime, Utc};
use common::{AgentId, AggregateId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::money::Money;
use crate::order::{FulfillmentState, Order};

use super::{CommissionError, CommissionRate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionState {
    #[default]
    Pending,
    Paid,
    /// Payout was refused; may still be paid by a later retry.
    Failed,
}

impl CommissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionState::Pending => "PENDING",
            CommissionState::Paid => "PAID",
            CommissionState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for CommissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CommissionEvent {
    CommissionRecorded(CommissionRecordedData),
    CommissionPaid {
        /// Key of the ledger credit to the agent's wallet.
        ledger_key: String,
        paid_at: DateTime<Utc>,
    },
    CommissionPayoutFailed {
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl DomainEvent for CommissionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CommissionEvent::CommissionRecorded(_) => "CommissionRecorded",
            CommissionEvent::CommissionPaid { .. } => "CommissionPaid",
            CommissionEvent::CommissionPayoutFailed { .. } => "CommissionPayoutFailed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionRecordedData {
    pub commission_id: AggregateId,
    pub order_id: AggregateId,
    pub agent_id: AgentId,
    pub rate: CommissionRate,
    pub order_amount: Money,
    pub amount: Money,
    pub recorded_at: DateTime<Utc>,
}

/// Agent pay for one delivered order. The id is derived from the order id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommissionEntry {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    order_id: Option<AggregateId>,
    agent_id: Option<AgentId>,
    rate: Option<CommissionRate>,
    amount: Money,
    state: CommissionState,
    ledger_key: Option<String>,
    failure_reason: Option<String>,
    recorded_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
}

impl Aggregate for CommissionEntry {
    type Event = CommissionEvent;
    type Error = CommissionError;

    fn aggregate_type() -> &'static str {
        "CommissionEntry"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            CommissionEvent::CommissionRecorded(data) => {
                self.id = Some(data.commission_id);
                self.order_id = Some(data.order_id);
                self.agent_id = Some(data.agent_id);
                self.rate = Some(data.rate);
                self.amount = data.amount;
                self.state = CommissionState::Pending;
                self.recorded_at = Some(data.recorded_at);
            }
            CommissionEvent::CommissionPaid {
                ledger_key,
                paid_at,
            } => {
                self.state = CommissionState::Paid;
                self.ledger_key = Some(ledger_key);
                self.paid_at = Some(paid_at);
                self.failure_reason = None;
            }
            CommissionEvent::CommissionPayoutFailed { reason, .. } => {
                self.state = CommissionState::Failed;
                self.failure_reason = Some(reason);
            }
        }
    }
}

impl SnapshotCapable for CommissionEntry {}

impl CommissionEntry {
    pub fn id_for(order_id: AggregateId) -> AggregateId {
        order_id.derive("commission")
    }

    /// Idempotency key of the agent wallet credit for this order.
    pub fn ledger_key_for(order_id: AggregateId) -> String {
        format!("commission:{order_id}")
    }

    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn agent_id(&self) -> Option<AgentId> {
        self.agent_id
    }

    pub fn rate(&self) -> Option<CommissionRate> {
        self.rate
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn state(&self) -> CommissionState {
        self.state
    }

    pub fn ledger_key(&self) -> Option<&str> {
        self.ledger_key.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.recorded_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    /// Records the commission for a delivered order. A second call is a no-op.
    pub fn record(
        &self,
        order: &Order,
        rate: CommissionRate,
    ) -> Result<Vec<CommissionEvent>, CommissionError> {
        if self.id.is_some() {
            return Ok(vec![]);
        }

        let order_id = order.id().ok_or(CommissionError::NotDeliverable {
            state: order.fulfillment_state(),
        })?;
        if order.fulfillment_state() != FulfillmentState::Delivered {
            return Err(CommissionError::NotDeliverable {
                state: order.fulfillment_state(),
            });
        }
        let agent_id = order.agent_id().ok_or(CommissionError::NoAgent)?;

        let order_amount = order.final_amount();
        Ok(vec![CommissionEvent::CommissionRecorded(
            CommissionRecordedData {
                commission_id: Self::id_for(order_id),
                order_id,
                agent_id,
                rate,
                order_amount,
                amount: rate.apply(order_amount),
                recorded_at: Utc::now(),
            },
        )])
    }

    pub fn mark_paid(&self, ledger_key: &str) -> Result<Vec<CommissionEvent>, CommissionError> {
        match (self.id, self.state) {
            (None, _) => Err(CommissionError::NotRecorded),
            (Some(_), CommissionState::Paid) => Ok(vec![]),
            (Some(_), _) => Ok(vec![CommissionEvent::CommissionPaid {
                ledger_key: ledger_key.to_string(),
                paid_at: Utc::now(),
            }]),
        }
    }

    pub fn mark_failed(&self, reason: &str) -> Result<Vec<CommissionEvent>, CommissionError> {
        match (self.id, self.state) {
            (None, _) => Err(CommissionError::NotRecorded),
            (Some(_), CommissionState::Paid) => Err(CommissionError::AlreadyPaid),
            (Some(_), CommissionState::Failed) => Ok(vec![]),
            (Some(_), CommissionState::Pending) => {
                Ok(vec![CommissionEvent::CommissionPayoutFailed {
                    reason: reason.to_string(),
                    failed_at: Utc::now(),
                }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{DeliveryAddress, LineItem, PlaceOrder};
    use common::{Actor, BuyerId, VendorId};

    fn order_in(target: Option<FulfillmentState>) -> Order {
        let buyer = BuyerId::new();
        let cmd = PlaceOrder::new(
            AggregateId::new(),
            buyer,
            VendorId::new(),
            vec![LineItem::new("SKU-1", "Sofa", Money::from_cents(10_000), 1)],
            DeliveryAddress::new("1 Main St", "Abuja", "NG"),
        );
        let system = Actor::system("test");
        let mut order = Order::default();
        order.apply_events(order.place(&cmd, Money::from_cents(1000), &Actor::Buyer(buyer)).unwrap());
        if let Some(FulfillmentState::Delivered) = target {
            order.apply_events(
                order
                    .transition(FulfillmentState::Assigned, &system, Some(AgentId::new()), None)
                    .unwrap(),
            );
            order.apply_events(
                order
                    .transition(FulfillmentState::Delivered, &system, None, None)
                    .unwrap(),
            );
        }
        order
    }

    fn recorded() -> CommissionEntry {
        let order = order_in(Some(FulfillmentState::Delivered));
        let mut entry = CommissionEntry::default();
        entry.apply_events(entry.record(&order, CommissionRate::default()).unwrap());
        entry
    }

    #[test]
    fn test_record_on_delivered_order() {
        let entry = recorded();
        assert_eq!(entry.amount().cents(), 900);
        assert_eq!(entry.state(), CommissionState::Pending);
        assert!(entry.agent_id().is_some());
        assert_eq!(entry.id(), Some(CommissionEntry::id_for(entry.order_id().unwrap())));
    }

    #[test]
    fn test_record_twice_is_noop() {
        let order = order_in(Some(FulfillmentState::Delivered));
        let mut entry = CommissionEntry::default();
        entry.apply_events(entry.record(&order, CommissionRate::default()).unwrap());
        assert!(entry.record(&order, CommissionRate::default()).unwrap().is_empty());
    }

    #[test]
    fn test_undelivered_order_is_rejected() {
        let order = order_in(None);
        let result = CommissionEntry::default().record(&order, CommissionRate::default());
        assert!(matches!(
            result,
            Err(CommissionError::NotDeliverable {
                state: FulfillmentState::InProgress
            })
        ));
    }

    #[test]
    fn test_payout_states() {
        let mut entry = recorded();
        entry.apply_events(entry.mark_failed("wallet unavailable").unwrap());
        assert_eq!(entry.state(), CommissionState::Failed);
        assert!(entry.mark_failed("again").unwrap().is_empty());

        entry.apply_events(entry.mark_paid("commission:x").unwrap());
        assert_eq!(entry.state(), CommissionState::Paid);
        assert!(entry.paid_at().is_some());
        assert!(entry.failure_reason().is_none());
        assert!(entry.mark_paid("commission:x").unwrap().is_empty());
        assert!(matches!(entry.mark_failed("late"), Err(CommissionError::AlreadyPaid)));
    }

    #[test]
    fn test_mark_paid_requires_record() {
        assert!(matches!(
            CommissionEntry::default().mark_paid("k"),
            Err(CommissionError::NotRecorded)
        ));
    }
}
