use std::time::Duration;

use cucumber::{gherkin::Step, given, then, when};
use market_payment_engine::{
    db_types::{MinorUnits, NewOrder, OrderReference, PaymentMethod, PaymentStatus},
    mpe_api::{
        payment_objects::{NotificationSource, PaymentChannel, PaymentEvent},
        reconciler::{ReconcileOutcome, ResolutionStrategy},
    },
    split::{CartLine, GatewaySplitConfig, SplitError},
    OrderStoreError,
};
use rust_decimal::Decimal;
use serde_json::json;

use crate::cucumber::MarketWorld;

fn cart_from_table(step: &Step) -> Vec<CartLine> {
    let table = step.table.as_ref().expect("A cart table is required");
    table
        .rows
        .iter()
        .skip(1)
        .map(|row| {
            let price = row[1].parse::<i64>().expect("Invalid price");
            let qty = row[2].parse::<i64>().expect("Invalid quantity");
            CartLine::new(row[0].as_str(), price, qty)
        })
        .collect()
}

fn status(s: &str) -> PaymentStatus {
    s.parse().expect("Invalid payment status")
}

//---------------------------------------------    Splitting    --------------------------------------------------------

#[when("I split a cart with lines")]
async fn split_cart(world: &mut MarketWorld, step: &Step) {
    let cart = cart_from_table(step);
    let sys = world.system_mut();
    let split = sys.splitter.calculate_split(&cart);
    sys.last_config = Some(match &split {
        Ok(split) => sys.configurator.build_gateway_split_config(split),
        Err(e) => Err(e.clone()),
    });
    sys.last_split = Some(split);
}

#[then(expr = "the order total is {int}")]
async fn order_total(world: &mut MarketWorld, total: i64) {
    assert_eq!(world.system().split().order_total, MinorUnits::from(total));
}

#[then(expr = "the total processing fee is {word}")]
async fn processing_fee(world: &mut MarketWorld, fee: String) {
    let fee = fee.parse::<Decimal>().expect("Invalid decimal");
    assert_eq!(world.system().split().total_processing_fee, fee);
}

#[then(expr = "the platform revenue is {word}")]
async fn platform_revenue(world: &mut MarketWorld, revenue: String) {
    let revenue = revenue.parse::<Decimal>().expect("Invalid decimal");
    assert_eq!(world.system().split().platform_revenue, revenue);
}

#[then("the vendor payouts are")]
async fn vendor_payouts(world: &mut MarketWorld, step: &Step) {
    let table = step.table.as_ref().expect("A payout table is required");
    let payouts = &world.system().split().vendor_payouts;
    assert_eq!(payouts.len(), table.rows.len() - 1, "Wrong number of vendor payouts");
    for (payout, row) in payouts.iter().zip(table.rows.iter().skip(1)) {
        let dec = |s: &str| s.parse::<Decimal>().expect("Invalid decimal");
        assert_eq!(payout.vendor_id.as_str(), row[0]);
        assert_eq!(payout.gross_sales, MinorUnits::from(row[1].parse::<i64>().expect("Invalid gross")));
        assert_eq!(payout.platform_fee, dec(&row[2]), "platform fee for {}", row[0]);
        assert_eq!(payout.processing_fee_share, dec(&row[3]), "processing fee share for {}", row[0]);
        assert_eq!(payout.net_payout, dec(&row[4]), "net payout for {}", row[0]);
    }
}

#[then("the gateway shares are")]
async fn gateway_shares(world: &mut MarketWorld, step: &Step) {
    let table = step.table.as_ref().expect("A share table is required");
    let config = world.system().last_config.as_ref().expect("No config").as_ref().expect("Config failed");
    let GatewaySplitConfig::MultiVendor { shares, .. } = config else {
        panic!("Expected a multi-vendor configuration, but got {config:?}");
    };
    let actual = shares.iter().map(|s| (s.subaccount_id.clone(), s.amount_minor_units.value())).collect::<Vec<_>>();
    let expected = table
        .rows
        .iter()
        .skip(1)
        .map(|row| (row[0].clone(), row[1].parse::<i64>().expect("Invalid amount")))
        .collect::<Vec<_>>();
    assert_eq!(actual, expected);
    let total: i64 = actual.iter().map(|(_, a)| a).sum();
    assert_eq!(MinorUnits::from(total), world.system().split().order_total);
}

#[then(expr = "the gateway settles to subaccount {word} with a platform fee of {int}")]
async fn single_vendor_config(world: &mut MarketWorld, subaccount: String, fee: i64) {
    let config = world.system().last_config.as_ref().expect("No config").as_ref().expect("Config failed");
    assert_eq!(config, &GatewaySplitConfig::SingleVendor {
        subaccount_id: subaccount,
        platform_fee_minor_units: MinorUnits::from(fee)
    });
}

#[then(expr = "the split fails because the cart is invalid")]
async fn invalid_cart(world: &mut MarketWorld) {
    let result = world.system().last_split.as_ref().expect("No split attempted");
    assert!(matches!(result, Err(SplitError::InvalidCart(_))), "Expected InvalidCart, got {result:?}");
}

#[then(expr = "the split fails because vendor {word} is unknown")]
async fn unknown_vendor(world: &mut MarketWorld, vendor: String) {
    let result = world.system().last_split.as_ref().expect("No split attempted");
    assert_eq!(result, &Err(SplitError::UnknownVendor(vendor.into())));
}

//---------------------------------------------     Orders      --------------------------------------------------------

#[given(expr = "customer {word} places order {word} for {int} paying by {word}")]
#[when(expr = "customer {word} places order {word} for {int} paying by {word}")]
async fn place_order(world: &mut MarketWorld, email: String, reference: String, amount: i64, method: String) {
    let method = method.parse::<PaymentMethod>().expect("Invalid payment method");
    let order = NewOrder::new(&email, "Customer", MinorUnits::from(amount), method).with_reference(reference);
    world.system().api.create_order(order).await.expect("Error creating order");
}

#[when(expr = "customer {word} places order {word} for {int} with dedicated account {word}")]
async fn place_transfer_order(world: &mut MarketWorld, email: String, reference: String, amount: i64, account: String) {
    let order = NewOrder::new(&email, "Customer", MinorUnits::from(amount), PaymentMethod::BankTransferOnDelivery)
        .with_reference(reference)
        .with_dedicated_account(&account);
    world.system().api.create_order(order).await.expect("Error creating order");
}

#[when(expr = "customer {word} places the split order {word} paying by {word}")]
async fn place_split_order(world: &mut MarketWorld, email: String, reference: String, method: String) {
    let method = method.parse::<PaymentMethod>().expect("Invalid payment method");
    let sys = world.system();
    let order = NewOrder::new(&email, "Customer", MinorUnits::from(0), method).with_reference(reference);
    sys.api.create_order_for_split(order, sys.split()).await.expect("Error creating order");
}

#[when(expr = "someone tries to place order {word} again")]
async fn duplicate_order(world: &mut MarketWorld, reference: String) {
    let order = NewOrder::new("dup@example.com", "Dup", MinorUnits::from(1), PaymentMethod::Prepay)
        .with_reference(reference);
    let err = world.system().api.create_order(order).await.err();
    world.system_mut().last_error = err;
}

//---------------------------------------------    Payments     --------------------------------------------------------

async fn reconcile(world: &mut MarketWorld, event: PaymentEvent) {
    let outcome = world.system().reconciler.reconcile(event).await;
    world.system_mut().last_outcome = Some(outcome);
}

#[when(expr = "a card payment webhook for order {word} arrives with gateway reference {word}")]
async fn card_webhook(world: &mut MarketWorld, reference: String, gateway_ref: String) {
    let payload = json!({
        "event": "charge.success",
        "data": { "reference": gateway_ref, "channel": "card", "metadata": { "order_reference": reference } }
    });
    let outcome = world.system().reconciler.reconcile_webhook(&payload).await;
    world.system_mut().last_outcome = Some(outcome);
}

#[when(expr = "a {word} notification with gateway reference {word} arrives")]
async fn gateway_ref_notification(world: &mut MarketWorld, status_str: String, gateway_ref: String) {
    let event = PaymentEvent::new(NotificationSource::Webhook, PaymentChannel::Card, status(&status_str))
        .with_gateway_reference(&gateway_ref);
    reconcile(world, event).await;
}

#[when(expr = "a paid notification from {word} for {int} arrives without references")]
async fn email_amount_notification(world: &mut MarketWorld, email: String, amount: i64) {
    let event = PaymentEvent::new(NotificationSource::Webhook, PaymentChannel::Card, PaymentStatus::Paid)
        .with_customer(&email, MinorUnits::from(amount));
    reconcile(world, event).await;
}

#[when(expr = "a bank transfer into account {word} arrives with gateway reference {word}")]
async fn transfer_notification(world: &mut MarketWorld, account: String, gateway_ref: String) {
    let event = PaymentEvent::new(NotificationSource::Webhook, PaymentChannel::BankTransfer, PaymentStatus::Paid)
        .with_gateway_reference(&gateway_ref)
        .with_virtual_account(&account);
    reconcile(world, event).await;
}

#[when(expr = "a manual update marks order {word} as {word}")]
async fn manual_update(world: &mut MarketWorld, reference: String, status_str: String) {
    let event = PaymentEvent::new(NotificationSource::Manual, PaymentChannel::Card, status(&status_str))
        .with_order_reference(reference);
    reconcile(world, event).await;
}

#[when(expr = "I note when order {word} was paid")]
async fn note_paid_at(world: &mut MarketWorld, reference: String) {
    let reference = OrderReference::from(reference);
    let order = world.system().api.get_order(&reference).await.expect("Order not found");
    world.system_mut().paid_at.insert(reference, order.paid_at);
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut MarketWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[then(expr = "the notification is resolved to order {word} by {word} reference")]
async fn resolved_by_reference(world: &mut MarketWorld, reference: String, kind: String) {
    let expected = match kind.as_str() {
        "order" => ResolutionStrategy::OrderReference,
        "payment" => ResolutionStrategy::PaymentReference,
        other => panic!("Unknown reference kind {other}"),
    };
    assert_resolved(world, &reference, expected);
}

#[then(expr = "the notification is resolved to order {word} by email and amount")]
async fn resolved_by_email(world: &mut MarketWorld, reference: String) {
    assert_resolved(world, &reference, ResolutionStrategy::EmailAndAmount);
}

#[then(expr = "the notification is resolved to order {word} by dedicated account")]
async fn resolved_by_account(world: &mut MarketWorld, reference: String) {
    assert_resolved(world, &reference, ResolutionStrategy::DedicatedAccount);
}

fn assert_resolved(world: &MarketWorld, reference: &str, expected: ResolutionStrategy) {
    match world.system().last_outcome.as_ref().expect("No notification was reconciled") {
        ReconcileOutcome::Resolved { order_reference, strategy, .. } => {
            assert_eq!(order_reference.as_str(), reference);
            assert_eq!(*strategy, expected);
        },
        other => panic!("Expected the notification to resolve, but got {other}"),
    }
}

#[then("the notification is unresolved")]
async fn unresolved(world: &mut MarketWorld) {
    let outcome = world.system().last_outcome.as_ref().expect("No notification was reconciled");
    assert!(matches!(outcome, ReconcileOutcome::Unresolved { .. }), "Expected Unresolved, got {outcome}");
}

#[then("the notification changed nothing")]
async fn unchanged(world: &mut MarketWorld) {
    let outcome = world.system().last_outcome.as_ref().expect("No notification was reconciled");
    assert!(matches!(outcome, ReconcileOutcome::Resolved { changed: false, .. }), "Got {outcome}");
}

#[then(expr = "the notification is rejected because order {word} is {word}")]
async fn rejected(world: &mut MarketWorld, reference: String, current_status: String) {
    match world.system().last_outcome.as_ref().expect("No notification was reconciled") {
        ReconcileOutcome::Rejected { order_reference, current, .. } => {
            assert_eq!(order_reference.as_str(), reference);
            assert_eq!(*current, status(&current_status));
        },
        other => panic!("Expected the notification to be rejected, but got {other}"),
    }
}

#[then(expr = "order {word} is {word}")]
async fn order_status(world: &mut MarketWorld, reference: String, status_str: String) {
    let order = world.system().api.get_order(&reference.into()).await.expect("Order not found");
    assert_eq!(order.payment_status, status(&status_str));
}

#[then(expr = "order {word} has payment reference {word}")]
async fn payment_reference(world: &mut MarketWorld, reference: String, gateway_ref: String) {
    let order = world.system().api.get_order(&reference.into()).await.expect("Order not found");
    assert_eq!(order.payment_reference.as_deref(), Some(gateway_ref.as_str()));
}

#[then(expr = "order {word} was paid only once")]
async fn paid_once(world: &mut MarketWorld, reference: String) {
    let reference = OrderReference::from(reference);
    let order = world.system().api.get_order(&reference).await.expect("Order not found");
    let noted = world.system().paid_at.get(&reference).expect("paid_at was never noted");
    assert!(noted.is_some());
    assert_eq!(&order.paid_at, noted);
}

#[then(expr = "order {word} has {int} vendor payouts")]
async fn payout_snapshot(world: &mut MarketWorld, reference: String, count: usize) {
    let order = world.system().api.get_order(&reference.into()).await.expect("Order not found");
    assert_eq!(order.vendor_payouts.map(|p| p.len()), Some(count));
}

#[then(expr = "there are {int} orders")]
async fn order_count(world: &mut MarketWorld, count: usize) {
    let orders = world.system().api.list_orders(None).await.expect("Error listing orders");
    assert_eq!(orders.len(), count);
}

//---------------------------------------------    Delivery     --------------------------------------------------------

#[when(expr = "rider {word} is dispatched with order {word}")]
async fn dispatch(world: &mut MarketWorld, rider: String, reference: String) {
    let result = world.system().api.assign_rider(&reference.into(), &rider, None).await;
    world.system_mut().last_error = result.err();
}

#[when(expr = "order {word} is delivered")]
async fn deliver(world: &mut MarketWorld, reference: String) {
    let result = world.system().api.complete_delivery(&reference.into()).await;
    world.system_mut().last_error = result.err();
}

#[then(expr = "order {word} is assigned to rider {word}")]
async fn assigned(world: &mut MarketWorld, reference: String, rider: String) {
    let order = world.system().api.get_order(&reference.into()).await.expect("Order not found");
    assert_eq!(order.rider_id.as_deref(), Some(rider.as_str()));
}

#[then(expr = "order {word} has a delivery time")]
async fn delivered_at(world: &mut MarketWorld, reference: String) {
    let order = world.system().api.get_order(&reference.into()).await.expect("Order not found");
    assert!(order.delivered_at.is_some());
}

#[then(expr = "the request fails with {word}")]
async fn request_fails(world: &mut MarketWorld, kind: String) {
    let err = world.system().last_error.as_ref().expect("Expected the last request to fail");
    let matched = match kind.as_str() {
        "AlreadyAssigned" => matches!(err, OrderStoreError::AlreadyAssigned { .. }),
        "AssignmentForbidden" => matches!(err, OrderStoreError::AssignmentForbidden(..)),
        "InvalidTransition" => matches!(err, OrderStoreError::InvalidTransition { .. }),
        "DuplicateReference" => matches!(err, OrderStoreError::DuplicateReference(_)),
        "NotFound" => matches!(err, OrderStoreError::NotFound(_)),
        other => panic!("Unknown error kind {other}"),
    };
    assert!(matched, "Expected {kind}, got {err}");
}

#[then("the request succeeds")]
async fn request_succeeds(world: &mut MarketWorld) {
    if let Some(e) = &world.system().last_error {
        panic!("Expected success, but got {e}");
    }
}
