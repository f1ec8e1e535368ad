//! Resolution of payment notifications to orders.
//!
//! Every notification path (gateway webhooks, client polling, manual status updates, rider terminals and the
//! delayed terminal confirmation) funnels through [`OrderReconciler::reconcile`]. The reconciler finds exactly one
//! order for the notification, or gives up, and then applies the transition the notification announces.
//!
//! Resolution strategies are tried in a fixed order, and the first one that finds an order wins:
//! 1. The order reference carried in the notification's metadata.
//! 2. The gateway transaction reference, matched against references already recorded on orders.
//! 3. The customer email and amount, accepted only if exactly one order matches.
//! 4. For bank transfers only, the dedicated virtual account, accepted only if exactly one pending order uses it.
//!
//! The reconciler never returns an error. Every result, including failures, is reported as a [`ReconcileOutcome`]
//! so that webhook handlers can always acknowledge the gateway.
use std::fmt::{Debug, Display};

use log::*;
use serde::Serialize;
use serde_json::Value;

use crate::{
    db_types::{Order, OrderReference, PaymentStatus, PaymentUpdate},
    events::{EventProducers, OrderPaidEvent, PaymentUnresolvedEvent},
    mpe_api::{
        order_objects::OrderQueryFilter,
        payment_objects::{NotificationError, PaymentChannel, PaymentEvent},
    },
    traits::{OrderStore, OrderStoreError, PaymentTransition},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    OrderReference,
    PaymentReference,
    EmailAndAmount,
    DedicatedAccount,
}

impl Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionStrategy::OrderReference => write!(f, "order reference"),
            ResolutionStrategy::PaymentReference => write!(f, "payment reference"),
            ResolutionStrategy::EmailAndAmount => write!(f, "email and amount"),
            ResolutionStrategy::DedicatedAccount => write!(f, "dedicated account"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The notification was matched to an order. `changed` is false if the order already had `applied_status`.
    Resolved {
        order_reference: OrderReference,
        applied_status: PaymentStatus,
        strategy: ResolutionStrategy,
        changed: bool,
    },
    /// The notification was matched, but the transition it requests is not allowed from the order's current status.
    Rejected { order_reference: OrderReference, current: PaymentStatus, requested: PaymentStatus },
    /// No strategy identified exactly one order. Nothing was changed.
    Unresolved { reason: String },
    /// A well-formed notification of a kind the engine does not act on.
    Ignored { event: String },
    Malformed { reason: String },
    /// The notification was matched but could not be applied, e.g. because the backend failed.
    Failed { reason: String },
}

impl ReconcileOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ReconcileOutcome::Resolved { .. })
    }

    pub fn order_reference(&self) -> Option<&OrderReference> {
        match self {
            ReconcileOutcome::Resolved { order_reference, .. } | ReconcileOutcome::Rejected { order_reference, .. } => {
                Some(order_reference)
            },
            _ => None,
        }
    }
}

impl Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileOutcome::Resolved { order_reference, applied_status, strategy, changed } => {
                let verb = if *changed { "is now" } else { "was already" };
                write!(f, "Order {order_reference} (matched by {strategy}) {verb} {applied_status}")
            },
            ReconcileOutcome::Rejected { order_reference, current, requested } => {
                write!(f, "Order {order_reference} cannot move from {current} to {requested}")
            },
            ReconcileOutcome::Unresolved { reason } => write!(f, "Unresolved: {reason}"),
            ReconcileOutcome::Ignored { event } => write!(f, "Ignored {event} notification"),
            ReconcileOutcome::Malformed { reason } => write!(f, "Malformed notification: {reason}"),
            ReconcileOutcome::Failed { reason } => write!(f, "Failed: {reason}"),
        }
    }
}

pub struct OrderReconciler<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderReconciler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderReconciler")
    }
}

impl<B: Clone> Clone for OrderReconciler<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> OrderReconciler<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderReconciler<B>
where B: OrderStore
{
    /// Parses a raw gateway webhook and reconciles it.
    pub async fn reconcile_webhook(&self, payload: &Value) -> ReconcileOutcome {
        match PaymentEvent::from_webhook(payload) {
            Ok(event) => self.reconcile(event).await,
            Err(e) => rejected_notification(e),
        }
    }

    /// Reconciles the `data` object of a verify-transaction response. A transaction that has not settled yet is
    /// reported as `Ignored`.
    pub async fn reconcile_verification(&self, data: &Value) -> ReconcileOutcome {
        match PaymentEvent::from_verified_transaction(data) {
            Ok(Some(event)) => self.reconcile(event).await,
            Ok(None) => {
                let status = data.get("status").and_then(Value::as_str).unwrap_or("unknown");
                ReconcileOutcome::Ignored { event: format!("transaction still {status}") }
            },
            Err(e) => rejected_notification(e),
        }
    }

    /// Resolves the notification to exactly one order and applies the status it announces.
    pub async fn reconcile(&self, event: PaymentEvent) -> ReconcileOutcome {
        trace!("🔄️ Reconciling {} {} notification: {event:?}", event.source, event.channel);
        if event.channel == PaymentChannel::Terminal && event.order_reference.is_none() {
            warn!("🔄️ A terminal notification arrived without an order reference. Falling back to fuzzy matching.");
        }
        let (order, strategy) = match self.resolve(&event).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                let reason = unresolved_reason(&event);
                warn!("🔄️ Could not match {} {} notification to an order. {reason}", event.source, event.channel);
                self.producers.publish_payment_unresolved(PaymentUnresolvedEvent::new(event, &reason)).await;
                return ReconcileOutcome::Unresolved { reason };
            },
            Err(e) => {
                error!("🔄️ Order lookup failed while reconciling a {} notification. {e}", event.source);
                return ReconcileOutcome::Failed { reason: e.to_string() };
            },
        };
        self.check_consistency(&order, &event);
        let reference = order.order_reference.clone();
        let mut update = PaymentUpdate::new(event.status);
        if !event.raw.is_null() {
            update = update.with_details(event.raw.clone());
        }
        if let Some(gateway_ref) = &event.gateway_reference {
            update = update.with_payment_reference(gateway_ref);
        }
        match self.db.transition_payment(&reference, update).await {
            Ok(PaymentTransition::Applied(order)) => {
                info!(
                    "🔄️ Order {reference} is now {} (matched by {strategy}, via {})",
                    order.payment_status, event.source
                );
                if order.payment_status == PaymentStatus::Paid {
                    self.producers.publish_order_paid(OrderPaidEvent::new(order.clone())).await;
                }
                ReconcileOutcome::Resolved {
                    order_reference: reference,
                    applied_status: order.payment_status,
                    strategy,
                    changed: true,
                }
            },
            Ok(PaymentTransition::Unchanged(order)) => {
                debug!(
                    "🔄️ Duplicate {} notification for order {reference}. It is already {}",
                    event.source, order.payment_status
                );
                ReconcileOutcome::Resolved {
                    order_reference: reference,
                    applied_status: order.payment_status,
                    strategy,
                    changed: false,
                }
            },
            Err(OrderStoreError::InvalidTransition { reference, from, to }) => {
                warn!("🔄️ Ignoring {} notification: order {reference} cannot move from {from} to {to}", event.source);
                ReconcileOutcome::Rejected { order_reference: reference, current: from, requested: to }
            },
            Err(OrderStoreError::NotFound(r)) => {
                ReconcileOutcome::Unresolved { reason: format!("Order {r} disappeared while it was being updated") }
            },
            Err(e) => {
                error!("🔄️ Could not apply {} notification to order {reference}. {e}", event.source);
                ReconcileOutcome::Failed { reason: e.to_string() }
            },
        }
    }

    async fn resolve(&self, event: &PaymentEvent) -> Result<Option<(Order, ResolutionStrategy)>, OrderStoreError> {
        if let Some(reference) = &event.order_reference {
            match self.db.fetch_order(reference).await? {
                Some(order) => return Ok(Some((order, ResolutionStrategy::OrderReference))),
                None => debug!("🔄️ The notification names order {reference}, but there is no such order"),
            }
        }
        if let Some(gateway_ref) = &event.gateway_reference {
            if let Some(order) = self.db.fetch_order_by_payment_reference(gateway_ref).await? {
                return Ok(Some((order, ResolutionStrategy::PaymentReference)));
            }
        }
        if let (Some(email), Some(amount)) = (&event.customer_email, event.amount) {
            let query = OrderQueryFilter::default().with_customer_email(email).with_amount(amount);
            let mut candidates = self.db.search_orders(query).await?;
            candidates.retain(|o| o.customer_email == *email);
            match candidates.len() {
                1 => return Ok(candidates.into_iter().next().map(|o| (o, ResolutionStrategy::EmailAndAmount))),
                0 => trace!("🔄️ No orders for {email} with amount {amount}"),
                n => debug!("🔄️ {n} orders for {email} with amount {amount}. Refusing to guess."),
            }
        }
        if event.channel == PaymentChannel::BankTransfer {
            if let Some(account) = &event.virtual_account {
                let query =
                    OrderQueryFilter::default().with_dedicated_account(account).with_status(PaymentStatus::Pending);
                let candidates = self.db.search_orders(query).await?;
                if candidates.len() == 1 {
                    return Ok(candidates.into_iter().next().map(|o| (o, ResolutionStrategy::DedicatedAccount)));
                }
                debug!("🔄️ {} pending orders use dedicated account {account}", candidates.len());
            }
        }
        Ok(None)
    }

    /// Cross-checks the optional identifiers in the notification against the resolved order. Mismatches are logged,
    /// but never change the resolution.
    fn check_consistency(&self, order: &Order, event: &PaymentEvent) {
        if let (Some(account), Some(expected)) = (&event.virtual_account, &order.dedicated_account) {
            if account != expected {
                warn!(
                    "🔄️ Order {} uses dedicated account {expected}, but the notification came from {account}",
                    order.order_reference
                );
            }
        }
        if let Some(amount) = event.amount {
            if amount != order.amount && event.status == PaymentStatus::Paid {
                warn!(
                    "🔄️ Order {} is for {}, but the notification reports {amount}",
                    order.order_reference, order.amount
                );
            }
        }
    }
}

fn rejected_notification(e: NotificationError) -> ReconcileOutcome {
    match e {
        NotificationError::Unsupported(event) => {
            debug!("🔄️ Ignoring {event} notification");
            ReconcileOutcome::Ignored { event }
        },
        NotificationError::Malformed(reason) => {
            warn!("🔄️ Malformed payment notification. {reason}");
            ReconcileOutcome::Malformed { reason }
        },
    }
}

fn unresolved_reason(event: &PaymentEvent) -> String {
    let mut tried = Vec::new();
    if let Some(r) = &event.order_reference {
        tried.push(format!("order reference {r}"));
    }
    if let Some(r) = &event.gateway_reference {
        tried.push(format!("payment reference {r}"));
    }
    if let (Some(e), Some(a)) = (&event.customer_email, event.amount) {
        tried.push(format!("email {e} with amount {a}"));
    }
    if let Some(account) = &event.virtual_account {
        tried.push(format!("dedicated account {account}"));
    }
    if tried.is_empty() {
        "The notification carries no identifiers".to_string()
    } else {
        format!("No single order matches {}", tried.join(", "))
    }
}
