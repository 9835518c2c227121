//! Settlement coordinator.
//!
//! Sequences the steps of an order's life across the order, delivery,
//! commission and wallet aggregates and the remote collaborators. Local
//! writes commit first. Every downstream effect then runs as an idempotent
//! step under the retry policy, and a step that still fails is written to
//! the reconciliation queue instead of being dropped.

use common::{Actor, AgentId, AggregateId};
use domain::{
    Aggregate, AggregateLocks, AssignmentState, CommissionEntry, CommissionError,
    CommissionService, CommissionState, CouponValidation, DeliveryAssignment, DeliveryEstimate,
    DeliveryService, DomainError, ErrorKind, FulfillmentState, Money, Order, OrderError,
    OrderService, PaymentMethod, PaymentState, PlaceOrder, Posting, ProcessReturn, RequestReturn,
    ReturnState, TransitionOrder,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::action::ReconciliationAction;
use crate::aggregate::ReconciliationTask;
use crate::config::SettlementConfig;
use crate::error::{Result, SettlementError};
use crate::queue::ReconciliationQueue;
use crate::services::{CouponCatalog, LedgerClient, LogisticsNotifier};

/// The payment gateway's verdict on a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Approved,
    Declined { reason: String },
}

/// Result of moving a delivery assignment.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentAdvance {
    pub assignment: DeliveryAssignment,
    pub order: Order,
    /// Set once the order is delivered and its commission recorded.
    pub commission: Option<CommissionEntry>,
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub attempted: usize,
    pub resolved: usize,
    pub still_pending: usize,
    pub abandoned: usize,
}

/// Idempotency key of the buyer wallet debit for a wallet-paid order.
pub fn wallet_payment_key(order_id: AggregateId) -> String {
    format!("order-payment:{order_id}")
}

/// Idempotency key of the buyer wallet credit for an approved return.
pub fn refund_key(order_id: AggregateId) -> String {
    format!("refund:{order_id}")
}

pub struct SettlementCoordinator<S, C, L, W>
where
    S: EventStore,
    C: CouponCatalog,
    L: LogisticsNotifier,
    W: LedgerClient,
{
    orders: OrderService<S>,
    deliveries: DeliveryService<S>,
    commissions: CommissionService<S>,
    queue: ReconciliationQueue<S>,
    coupons: C,
    logistics: L,
    ledger: W,
    config: SettlementConfig,
    system: Actor,
}

impl<S, C, L, W> SettlementCoordinator<S, C, L, W>
where
    S: EventStore + Clone,
    C: CouponCatalog,
    L: LogisticsNotifier,
    W: LedgerClient,
{
    pub fn new(store: S, coupons: C, logistics: L, ledger: W, config: SettlementConfig) -> Self {
        let locks = AggregateLocks::new();
        Self {
            orders: OrderService::with_locks(store.clone(), locks.clone()),
            deliveries: DeliveryService::with_locks(store.clone(), locks.clone()),
            commissions: CommissionService::with_locks(
                store.clone(),
                locks.clone(),
                config.commission_rate,
            ),
            queue: ReconciliationQueue::with_locks(store, locks),
            coupons,
            logistics,
            ledger,
            config,
            system: Actor::system("settlement"),
        }
    }

    pub fn orders(&self) -> &OrderService<S> {
        &self.orders
    }

    pub fn deliveries(&self) -> &DeliveryService<S> {
        &self.deliveries
    }

    pub fn commissions(&self) -> &CommissionService<S> {
        &self.commissions
    }

    pub fn queue(&self) -> &ReconciliationQueue<S> {
        &self.queue
    }

    pub fn coupons(&self) -> &C {
        &self.coupons
    }

    pub fn logistics(&self) -> &L {
        &self.logistics
    }

    pub fn ledger(&self) -> &W {
        &self.ledger
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Places an order.
    ///
    /// A supplied coupon must validate or the whole placement is rejected.
    /// Wallet-paid orders are debited right after the order is stored.
    #[tracing::instrument(skip(self, cmd, actor), fields(order_id = %cmd.order_id, actor = %actor))]
    pub async fn place_order(&self, cmd: PlaceOrder, actor: &Actor) -> Result<Order> {
        let order_id = cmd.order_id;
        let discount = match cmd.coupon_code.as_deref() {
            Some(code) => self.discount_for(&cmd, code).await?,
            None => Money::zero(),
        };

        let placed = self.orders.place_order(cmd, discount, actor).await?;

        self.follow_up(
            order_id,
            ReconciliationAction::PushOrderStatus {
                state: FulfillmentState::InProgress,
            },
        )
        .await;

        if placed.aggregate.payment_method() == PaymentMethod::Wallet
            && self
                .follow_up(order_id, ReconciliationAction::CollectWalletPayment)
                .await
        {
            let order = self.require_order(order_id).await?;
            if order.payment_state() == PaymentState::Paid {
                self.settle_paid_order(&order).await;
            }
        }

        self.require_order(order_id).await
    }

    /// Records the gateway callback for an order's payment. Replaying the
    /// same transaction is a no-op.
    #[tracing::instrument(skip(self, outcome))]
    pub async fn confirm_payment(
        &self,
        order_id: AggregateId,
        transaction_id: &str,
        outcome: PaymentOutcome,
    ) -> Result<Order> {
        match outcome {
            PaymentOutcome::Approved => {
                let result = self.orders.confirm_payment(order_id, transaction_id).await?;
                self.settle_paid_order(&result.aggregate).await;
                Ok(result.aggregate)
            }
            PaymentOutcome::Declined { reason } => {
                let result = self
                    .orders
                    .decline_payment(order_id, transaction_id, &reason)
                    .await?;
                tracing::warn!(%reason, "payment declined");
                Ok(result.aggregate)
            }
        }
    }

    /// Assigns an agent to an order that is still in progress, then moves
    /// the order to assigned.
    ///
    /// If the order refuses the move for good, the assignment is cancelled
    /// again and the error returned.
    #[tracing::instrument(skip(self, estimate, actor), fields(actor = %actor))]
    pub async fn assign_delivery(
        &self,
        order_id: AggregateId,
        agent_id: AgentId,
        estimate: DeliveryEstimate,
        actor: &Actor,
    ) -> Result<DeliveryAssignment> {
        let order = self.require_order(order_id).await?;
        if !order.is_vendor(actor) && !actor.is_privileged() {
            return Err(SettlementError::Forbidden {
                actor: actor.to_string(),
                action: "assign delivery",
            });
        }

        let assigned = self.deliveries.assign(&order, agent_id, estimate).await?;
        let assignment_id = DeliveryAssignment::id_for(order_id);

        let target = FulfillmentState::Assigned;
        let synced = self
            .config
            .retry
            .run("sync_order_state", move || self.sync_order_state(order_id, target))
            .await;

        match synced {
            Ok(order) => self.after_fulfillment_change(&order).await,
            Err(error) if error.is_retryable() => {
                self.park(order_id, ReconciliationAction::SyncOrderState { target }, &error)
                    .await;
            }
            Err(error) => {
                tracing::warn!(%error, "order refused assignment, cancelling it");
                self.deliveries
                    .advance(
                        assignment_id,
                        AssignmentState::Cancelled,
                        &self.system,
                        Some(error.to_string()),
                    )
                    .await?;
                return Err(error);
            }
        }

        Ok(self
            .deliveries
            .get_assignment(assignment_id)
            .await?
            .unwrap_or(assigned.aggregate))
    }

    /// Moves a delivery assignment and carries the change over to the order.
    ///
    /// Completing the delivery delivers the order and settles the agent's
    /// commission; cancelling it cancels the order. An order that can no
    /// longer be delivered refuses completion, and if it was canceled its
    /// assignment is released instead. A refusal from the order that no
    /// retry can fix is returned to the caller.
    #[tracing::instrument(skip(self, actor, reason), fields(actor = %actor))]
    pub async fn advance_assignment(
        &self,
        assignment_id: AggregateId,
        target: AssignmentState,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<AssignmentAdvance> {
        let current = self.deliveries.require_assignment(assignment_id).await?;
        let order_id = current
            .order_id()
            .ok_or(SettlementError::AssignmentNotFound(assignment_id))?;

        if target == AssignmentState::Completed {
            self.ensure_deliverable(order_id).await?;
        }

        let advanced = self
            .deliveries
            .advance(assignment_id, target, actor, reason)
            .await?;
        let assignment = advanced.aggregate;

        let order_target = match target {
            AssignmentState::Completed => Some(FulfillmentState::Delivered),
            AssignmentState::Cancelled => Some(FulfillmentState::Canceled),
            AssignmentState::Assigned | AssignmentState::InProgress => None,
        };

        if let Some(order_target) = order_target {
            let synced = self
                .config
                .retry
                .run("sync_order_state", move || {
                    self.sync_order_state(order_id, order_target)
                })
                .await;
            match synced {
                Ok(order) => self.after_fulfillment_change(&order).await,
                Err(error) => {
                    let retryable = error.is_retryable();
                    self.park(
                        order_id,
                        ReconciliationAction::SyncOrderState {
                            target: order_target,
                        },
                        &error,
                    )
                    .await;
                    if !retryable {
                        return Err(error);
                    }
                }
            }
        }

        let order = self.require_order(order_id).await?;
        let commission = if order.fulfillment_state() == FulfillmentState::Delivered {
            self.commissions.get_commission(order_id).await?
        } else {
            None
        };

        Ok(AssignmentAdvance {
            assignment,
            order,
            commission,
        })
    }

    /// Moves an order on behalf of an actor and runs the follow-ups of the
    /// new state. Cancelling an order also releases its delivery agent.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, target = %cmd.target))]
    pub async fn transition_order(&self, cmd: TransitionOrder) -> Result<Order> {
        let order_id = cmd.order_id;
        let order = self.orders.transition(cmd).await?.aggregate;

        if order.fulfillment_state() == FulfillmentState::Canceled {
            self.follow_up(order_id, ReconciliationAction::ReleaseAssignment)
                .await;
        }
        self.after_fulfillment_change(&order).await;

        Ok(order)
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn request_return(&self, cmd: RequestReturn) -> Result<Order> {
        Ok(self.orders.request_return(cmd).await?.aggregate)
    }

    /// Resolves a return. An approval credits the buyer exactly once, even
    /// when the decision is replayed.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, decision = %cmd.decision))]
    pub async fn process_return(&self, cmd: ProcessReturn) -> Result<Order> {
        let order_id = cmd.order_id;
        let resolved = self.orders.process_return(cmd).await?.aggregate;

        let approved = resolved
            .return_request()
            .is_some_and(|request| request.state == ReturnState::Approved);
        if approved {
            self.follow_up(order_id, ReconciliationAction::IssueRefund)
                .await;
            return self.require_order(order_id).await;
        }
        Ok(resolved)
    }

    /// Records the commission of a delivered order and pays the agent.
    /// Calling it again returns the existing entry.
    #[tracing::instrument(skip(self))]
    pub async fn settle_commission(&self, order_id: AggregateId) -> Result<CommissionEntry> {
        let order = self.require_order(order_id).await?;
        let recorded = self.commissions.settle(&order).await?.aggregate;
        if recorded.state() == CommissionState::Paid {
            return Ok(recorded);
        }

        self.follow_up(order_id, ReconciliationAction::SettleCommission)
            .await;
        Ok(self
            .commissions
            .get_commission(order_id)
            .await?
            .unwrap_or(recorded))
    }

    /// Re-runs every pending reconciliation task once.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconciliationReport> {
        let mut report = ReconciliationReport::default();

        for task in self.queue.pending().await? {
            let (Some(task_id), Some(order_id), Some(action)) =
                (task.id(), task.order_id(), task.action().cloned())
            else {
                continue;
            };
            report.attempted += 1;

            let outcome = self
                .config
                .retry
                .attempt(action.name(), self.perform(order_id, &action))
                .await;

            match outcome {
                Ok(()) => {
                    self.queue.resolve(task_id).await?;
                    report.resolved += 1;
                    self.after_task(order_id, &action).await;
                }
                Err(error) if error.is_retryable() => {
                    self.queue.record_failure(task_id, &error).await?;
                    report.still_pending += 1;
                }
                Err(error) => {
                    self.queue.abandon(task_id, &error).await?;
                    report.abandoned += 1;
                }
            }
        }

        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                resolved = report.resolved,
                still_pending = report.still_pending,
                abandoned = report.abandoned,
                "reconciliation run finished"
            );
        }
        Ok(report)
    }

    /// Tasks waiting for the next reconciliation run.
    pub async fn pending(&self) -> Result<Vec<ReconciliationTask>> {
        self.queue.pending().await
    }
}

// Follow-ups
impl<S, C, L, W> SettlementCoordinator<S, C, L, W>
where
    S: EventStore + Clone,
    C: CouponCatalog,
    L: LogisticsNotifier,
    W: LedgerClient,
{
    /// Runs `action` under the retry policy. On failure the action is
    /// parked in the reconciliation queue and false is returned; the caller
    /// never sees the error.
    async fn follow_up(&self, order_id: AggregateId, action: ReconciliationAction) -> bool {
        let step = action.name();
        let pending = &action;
        let outcome = self
            .config
            .retry
            .run(step, move || self.perform(order_id, pending))
            .await;

        match outcome {
            Ok(()) => true,
            Err(error) => {
                self.park(order_id, action, &error).await;
                false
            }
        }
    }

    /// Writes a failed step to the queue. A step that can never succeed is
    /// abandoned right away so it stays on record without being re-run.
    async fn park(
        &self,
        order_id: AggregateId,
        action: ReconciliationAction,
        error: &SettlementError,
    ) {
        let step = action.name();
        let task = match self.queue.enqueue(order_id, action, error).await {
            Ok(task) => task,
            Err(enqueue_error) => {
                tracing::error!(
                    %order_id,
                    step,
                    %error,
                    %enqueue_error,
                    "could not enqueue failed step"
                );
                return;
            }
        };

        if error.is_retryable() {
            return;
        }
        if let Some(task_id) = task.id()
            && let Err(abandon_error) = self.queue.abandon(task_id, error).await
        {
            tracing::error!(%task_id, %abandon_error, "could not abandon task");
        }
    }

    /// Effects that depend on the order's new fulfillment state.
    async fn after_fulfillment_change(&self, order: &Order) {
        let Some(order_id) = order.id() else {
            return;
        };
        let state = order.fulfillment_state();

        self.follow_up(order_id, ReconciliationAction::PushOrderStatus { state })
            .await;

        if state != FulfillmentState::Delivered {
            return;
        }
        if order.payment_method() == PaymentMethod::CashOnDelivery
            && order.payment_state() == PaymentState::Paid
        {
            self.settle_paid_order(order).await;
        }
        if order.agent_id().is_some() {
            self.follow_up(order_id, ReconciliationAction::SettleCommission)
                .await;
        }
    }

    /// Credits the vendor and redeems the coupon of a paid order.
    async fn settle_paid_order(&self, order: &Order) {
        let (Some(order_id), Some(transaction_id)) = (order.id(), order.payment_transaction_id())
        else {
            return;
        };

        self.follow_up(
            order_id,
            ReconciliationAction::CreditVendor {
                transaction_id: transaction_id.to_string(),
            },
        )
        .await;

        if let Some(code) = order.coupon_code() {
            self.follow_up(
                order_id,
                ReconciliationAction::RedeemCoupon {
                    code: code.to_string(),
                },
            )
            .await;
        }
    }

    /// Follow-ups owed once a queued task finally went through.
    async fn after_task(&self, order_id: AggregateId, action: &ReconciliationAction) {
        let needs_order = matches!(
            action,
            ReconciliationAction::SyncOrderState { .. } | ReconciliationAction::CollectWalletPayment
        );
        if !needs_order {
            return;
        }

        let order = match self.require_order(order_id).await {
            Ok(order) => order,
            Err(error) => {
                tracing::warn!(%order_id, %error, "could not reload order after reconciliation");
                return;
            }
        };

        match action {
            ReconciliationAction::SyncOrderState { .. } => {
                self.after_fulfillment_change(&order).await;
            }
            ReconciliationAction::CollectWalletPayment
                if order.payment_state() == PaymentState::Paid =>
            {
                self.settle_paid_order(&order).await;
            }
            _ => {}
        }
    }

    /// Refuses to complete a delivery the order can no longer take. A
    /// canceled order gets its assignment released.
    async fn ensure_deliverable(&self, order_id: AggregateId) -> Result<()> {
        let order = self.require_order(order_id).await?;
        let state = order.fulfillment_state();
        if state == FulfillmentState::Delivered || state.can_deliver() {
            return Ok(());
        }

        if state == FulfillmentState::Canceled {
            self.follow_up(order_id, ReconciliationAction::ReleaseAssignment)
                .await;
        }
        Err(DomainError::from(OrderError::InvalidTransition {
            from: state,
            to: FulfillmentState::Delivered,
        })
        .into())
    }
}

// Steps. Each one is idempotent and none of them schedules follow-ups.
impl<S, C, L, W> SettlementCoordinator<S, C, L, W>
where
    S: EventStore + Clone,
    C: CouponCatalog,
    L: LogisticsNotifier,
    W: LedgerClient,
{
    async fn perform(&self, order_id: AggregateId, action: &ReconciliationAction) -> Result<()> {
        match action {
            ReconciliationAction::PushOrderStatus { state } => {
                self.logistics.push_status(order_id, *state).await
            }
            ReconciliationAction::SyncOrderState { target } => {
                self.sync_order_state(order_id, *target).await.map(|_| ())
            }
            ReconciliationAction::SettleCommission => self.pay_commission(order_id).await,
            ReconciliationAction::IssueRefund => self.issue_refund(order_id).await,
            ReconciliationAction::RedeemCoupon { code } => {
                self.coupons.redeem(code, order_id).await
            }
            ReconciliationAction::CreditVendor { transaction_id } => {
                self.credit_vendor(order_id, transaction_id).await
            }
            ReconciliationAction::CollectWalletPayment => {
                self.collect_wallet_payment(order_id).await
            }
            ReconciliationAction::ReleaseAssignment => self.release_assignment(order_id).await,
        }
    }

    /// Cancels the order's assignment. A completed assignment cannot be
    /// released, which leaves the task abandoned for an operator.
    async fn release_assignment(&self, order_id: AggregateId) -> Result<()> {
        let Some(assignment) = self.deliveries.assignment_for_order(order_id).await? else {
            return Ok(());
        };
        if assignment.state() == AssignmentState::Cancelled {
            return Ok(());
        }

        self.deliveries
            .advance(
                DeliveryAssignment::id_for(order_id),
                AssignmentState::Cancelled,
                &self.system,
                Some("order canceled".to_string()),
            )
            .await?;
        Ok(())
    }

    /// Checks a coupon under the request timeout. A failed lookup counts as
    /// an invalid coupon.
    async fn discount_for(&self, cmd: &PlaceOrder, code: &str) -> Result<Money> {
        let validation = match self
            .config
            .retry
            .attempt(
                "validate_coupon",
                self.coupons.validate(cmd.vendor_id, code, cmd.subtotal()),
            )
            .await
        {
            Ok(validation) => validation,
            Err(error) => {
                tracing::warn!(code, %error, "coupon lookup failed");
                CouponValidation::invalid()
            }
        };

        match (validation.valid, validation.discount_value) {
            (true, discount) => Ok(discount.unwrap_or_default()),
            (false, _) => Err(SettlementError::InvalidCoupon {
                code: code.to_string(),
            }),
        }
    }

    async fn sync_order_state(
        &self,
        order_id: AggregateId,
        target: FulfillmentState,
    ) -> Result<Order> {
        let agent_id = match target {
            FulfillmentState::Assigned => self
                .deliveries
                .assignment_for_order(order_id)
                .await?
                .and_then(|assignment| assignment.agent_id()),
            _ => None,
        };

        let result = self
            .orders
            .ensure_fulfillment(order_id, target, &self.system, agent_id, None)
            .await?;
        Ok(result.aggregate)
    }

    /// Debits the buyer for a wallet-paid order and records the payment.
    /// Too little balance declines the payment rather than failing the step.
    async fn collect_wallet_payment(&self, order_id: AggregateId) -> Result<()> {
        let order = self.require_order(order_id).await?;
        if order.payment_state() != PaymentState::Pending {
            return Ok(());
        }
        let buyer_id = order
            .buyer_id()
            .ok_or(SettlementError::OrderNotFound(order_id))?;
        let key = wallet_payment_key(order_id);

        let amount = order.final_amount();
        if amount.is_positive() {
            let posting = Posting::new(buyer_id, amount, "order payment", &key).for_order(order_id);
            match self.ledger.debit(posting).await {
                Ok(_) => {}
                Err(error) if error.kind() == ErrorKind::InsufficientBalance => {
                    tracing::warn!(%order_id, %error, "wallet payment declined");
                    self.orders
                        .decline_payment(order_id, &key, &error.to_string())
                        .await?;
                    return Ok(());
                }
                Err(error) => return Err(error),
            }
        }

        self.orders.confirm_payment(order_id, &key).await?;
        Ok(())
    }

    async fn credit_vendor(&self, order_id: AggregateId, transaction_id: &str) -> Result<()> {
        let order = self.require_order(order_id).await?;
        let vendor_id = order
            .vendor_id()
            .ok_or(SettlementError::OrderNotFound(order_id))?;

        let amount = order.final_amount();
        if !amount.is_positive() {
            return Ok(());
        }
        let posting =
            Posting::new(vendor_id, amount, "order payment", transaction_id).for_order(order_id);
        self.ledger.credit(posting).await?;
        Ok(())
    }

    /// Records the commission if needed and credits the agent. A payout the
    /// ledger refuses for good marks the entry failed.
    async fn pay_commission(&self, order_id: AggregateId) -> Result<()> {
        let order = self.require_order(order_id).await?;
        let entry = self.commissions.settle(&order).await?.aggregate;
        if entry.state() == CommissionState::Paid {
            return Ok(());
        }

        let key = CommissionEntry::ledger_key_for(order_id);
        let agent_id = entry
            .agent_id()
            .ok_or(DomainError::from(CommissionError::NoAgent))?;

        if entry.amount().is_positive() {
            let posting = Posting::new(agent_id, entry.amount(), "delivery commission", &key)
                .for_order(order_id);
            if let Err(error) = self.ledger.credit(posting).await {
                if !error.is_retryable() {
                    self.commissions
                        .mark_failed(order_id, &error.to_string())
                        .await?;
                }
                return Err(error);
            }
        }

        self.commissions.mark_paid(order_id, &key).await?;
        Ok(())
    }

    async fn issue_refund(&self, order_id: AggregateId) -> Result<()> {
        let order = self.require_order(order_id).await?;
        let request = order
            .return_request()
            .ok_or(DomainError::from(OrderError::NoReturnRequest))?;

        match request.state {
            ReturnState::Refunded => return Ok(()),
            ReturnState::Approved => {}
            state => return Err(DomainError::from(OrderError::ReturnNotApproved { state }).into()),
        }
        if !order.payment_state().can_refund() {
            return Err(DomainError::from(OrderError::NotRefundable {
                payment_state: order.payment_state(),
            })
            .into());
        }

        let buyer_id = order
            .buyer_id()
            .ok_or(SettlementError::OrderNotFound(order_id))?;
        let amount = request
            .refund_amount
            .ok_or(DomainError::from(OrderError::RefundAmountRequired))?;
        let key = refund_key(order_id);

        let posting = Posting::new(buyer_id, amount, "order refund", &key).for_order(order_id);
        self.ledger.credit(posting).await?;
        self.orders.mark_refunded(order_id, &key).await?;
        Ok(())
    }

    async fn require_order(&self, order_id: AggregateId) -> Result<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(order_id))
    }
}
