//! Follow-up actions the coordinator can hand to the reconciliation queue.

use common::AggregateId;
use domain::FulfillmentState;
use serde::{Deserialize, Serialize};

/// A downstream effect that must eventually happen for one order.
///
/// Every action is idempotent, so the queue may run it any number of times.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconciliationAction {
    /// Tell logistics the order reached `state`.
    PushOrderStatus { state: FulfillmentState },

    /// Bring the order to `target` after its delivery assignment moved.
    SyncOrderState { target: FulfillmentState },

    /// Record the agent commission and credit the agent wallet.
    SettleCommission,

    /// Credit the buyer for an approved return.
    IssueRefund,

    RedeemCoupon { code: String },

    /// Credit the vendor for a confirmed payment.
    CreditVendor { transaction_id: String },

    /// Debit the buyer wallet for a wallet-paid order.
    CollectWalletPayment,

    /// Cancel the delivery assignment of a canceled order.
    ReleaseAssignment,
}

impl ReconciliationAction {
    /// Step name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            ReconciliationAction::PushOrderStatus { .. } => "push_order_status",
            ReconciliationAction::SyncOrderState { .. } => "sync_order_state",
            ReconciliationAction::SettleCommission => "settle_commission",
            ReconciliationAction::IssueRefund => "issue_refund",
            ReconciliationAction::RedeemCoupon { .. } => "redeem_coupon",
            ReconciliationAction::CreditVendor { .. } => "credit_vendor",
            ReconciliationAction::CollectWalletPayment => "collect_wallet_payment",
            ReconciliationAction::ReleaseAssignment => "release_assignment",
        }
    }

    /// Distinguishes tasks of the same kind for one order.
    pub fn key(&self) -> String {
        match self {
            ReconciliationAction::PushOrderStatus { state } => {
                format!("{}:{}", self.name(), state.as_str())
            }
            ReconciliationAction::SyncOrderState { target } => {
                format!("{}:{}", self.name(), target.as_str())
            }
            _ => self.name().to_string(),
        }
    }

    /// One task per order and action key, across processes.
    pub fn task_id(&self, order_id: AggregateId) -> AggregateId {
        order_id.derive(&format!("reconciliation:{}", self.key()))
    }
}

impl std::fmt::Display for ReconciliationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}
