//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two live in helper functions below
//! the route, or in a separate module.
//!
//! A note about performance:
//! Each worker thread processes its requests sequentially, so a handler that blocks the current thread stops that
//! worker from processing new requests. Every I/O-bound operation (database, gateway calls) is therefore expressed as a
//! future, and handlers never sleep or block.
use actix_web::{get, post, web, HttpResponse, Responder};
use log::*;
use market_payment_engine::{
    db_types::{NewOrder, OrderReference, PaymentMethod, PaymentStatus},
    mpe_api::{
        order_objects::OrderQueryFilter,
        payment_objects::{NotificationSource, PaymentChannel, PaymentEvent},
    },
    split::{PayoutSplitter, SplitPaymentConfigurator},
    OrderFlowApi,
    OrderReconciler,
    OrderStore,
    ReconcileOutcome,
};
use mpg_common::helpers::split_list;
use serde_json::Value;

use crate::{
    auto_confirm_worker::ConfirmationScheduler,
    data_objects::{
        CollectRequest,
        CollectionResponse,
        DispatchRequest,
        JsonResponse,
        OrderListQuery,
        OrderRefRequest,
        PlaceOrderRequest,
        PlaceOrderResponse,
        SplitPreview,
        SplitPreviewRequest,
        StatusUpdateRequest,
        VendorPayoutResult,
        VerificationResult,
    },
    errors::ServerError,
    integrations::gateway::{payout_transfer, PaymentGateway},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Gateway webhook  ---------------------------------------------------
route!(gateway_webhook => Post "/webhook" impl OrderStore);
/// Route handler for gateway webhooks.
///
/// The gateway retries any call that does not receive a 2xx response, so this handler always returns `200 OK`. The
/// reconciliation outcome is returned in the body and logged; unmatched payments are also published to the
/// `on_payment_unresolved` hook for manual follow-up.
///
/// Signature and source address checks are applied by middleware before the request reaches this handler.
pub async fn gateway_webhook<B: OrderStore>(
    body: web::Bytes,
    reconciler: web::Data<OrderReconciler<B>>,
    scheduler: web::Data<ConfirmationScheduler>,
) -> HttpResponse {
    trace!("💻️ Received gateway webhook: {}", String::from_utf8_lossy(&body));
    let outcome = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => reconciler.reconcile_webhook(&payload).await,
        Err(e) => {
            warn!("💻️ Gateway webhook body is not valid JSON. {e}");
            ReconcileOutcome::Malformed { reason: format!("The body is not valid JSON. {e}") }
        },
    };
    if let ReconcileOutcome::Resolved { order_reference, .. } = &outcome {
        // The gateway has spoken for this order, so a simulated terminal confirmation is moot
        scheduler.cancel(order_reference);
    }
    info!("💻️ Gateway webhook handled. {outcome}");
    HttpResponse::Ok().json(outcome)
}

//----------------------------------------------   Split preview  ----------------------------------------------------
/// Route handler for the split preview endpoint
///
/// Calculates the payout breakdown for a cart, and the split configuration that would be handed to the gateway, without
/// creating an order.
#[post("/split")]
pub async fn split_preview(
    body: web::Json<SplitPreviewRequest>,
    splitter: web::Data<PayoutSplitter>,
    configurator: web::Data<SplitPaymentConfigurator>,
) -> Result<HttpResponse, ServerError> {
    let cart = body.into_inner().cart;
    debug!("💻️ POST split preview for {} cart lines", cart.len());
    let split = splitter.calculate_split(&cart)?;
    let gateway_split = configurator.build_gateway_split_config(&split)?;
    Ok(HttpResponse::Ok().json(SplitPreview { split, gateway_split }))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(place_order => Post "/orders" impl OrderStore, PaymentGateway);
/// Route handler for placing an order
///
/// The cart is split across its vendors, and the order is stored with the resulting amount and payout snapshot.
/// Then, depending on the payment method:
/// * `prepay`: a gateway checkout is initialized with the split configuration, and its authorization URL is returned.
/// * `bank_transfer_on_delivery`: a dedicated virtual account is issued to the customer *before* the order is stored,
///   so that incoming transfers can be matched to the order by account number.
/// * `terminal_on_delivery`: nothing further. The rider collects the payment.
pub async fn place_order<B: OrderStore, G: PaymentGateway>(
    body: web::Json<PlaceOrderRequest>,
    api: web::Data<OrderFlowApi<B>>,
    splitter: web::Data<PayoutSplitter>,
    configurator: web::Data<SplitPaymentConfigurator>,
    gateway: web::Data<G>,
) -> Result<HttpResponse, ServerError> {
    let req = body.into_inner();
    debug!("💻️ POST new {} order for {}", req.payment_method, req.customer_email);
    let split = splitter.calculate_split(&req.cart)?;
    let gateway_split = configurator.build_gateway_split_config(&split)?;
    let items = serde_json::to_value(&req.cart).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    let mut order = NewOrder::new(&req.customer_email, &req.customer_name, split.order_total, req.payment_method)
        .with_items(items);
    if let Some(address) = &req.delivery_address {
        order = order.with_delivery_address(address);
    }
    if let Some(reference) = req.order_reference {
        order = order.with_reference(reference);
    }
    let dedicated_account = match req.payment_method {
        PaymentMethod::BankTransferOnDelivery => {
            let account = gateway.issue_dedicated_account(&req.customer_email, &req.customer_name).await?;
            debug!("💻️ Issued dedicated account {} to {}", account.account_number, req.customer_email);
            order = order.with_dedicated_account(&account.account_number);
            Some(account)
        },
        _ => None,
    };
    let order = api.create_order_for_split(order, &split).await?;
    let checkout = match order.payment_method {
        PaymentMethod::Prepay => {
            let checkout = gateway.initialize_checkout(&order, &gateway_split).await.map_err(|e| {
                warn!("💻️ Order {} was created, but the checkout could not be initialized. {e}", order.order_reference);
                ServerError::from(e)
            })?;
            Some(checkout)
        },
        _ => None,
    };
    info!("💻️ Order {} placed for {}", order.order_reference, order.amount);
    Ok(HttpResponse::Created().json(PlaceOrderResponse { order, checkout, dedicated_account }))
}

route!(orders => Get "/orders" impl OrderStore);
/// Route handler for listing orders
///
/// Optional query parameters: `status` (comma-separated list), `payment_method`, and `email`.
pub async fn orders<B: OrderStore>(
    query: web::Query<OrderListQuery>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let filter = order_filter(query.into_inner())?;
    debug!("💻️ GET orders matching {filter:?}");
    let orders = api.list_orders(Some(filter)).await?;
    Ok(HttpResponse::Ok().json(orders))
}

pub fn order_filter(query: OrderListQuery) -> Result<OrderQueryFilter, ServerError> {
    let mut filter = OrderQueryFilter::default();
    for status in query.status.as_deref().map(split_list).unwrap_or_default() {
        let status = status.parse::<PaymentStatus>().map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
        filter = filter.with_status(status);
    }
    if let Some(method) = query.payment_method {
        let method = method.parse::<PaymentMethod>().map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
        filter = filter.with_payment_method(method);
    }
    if let Some(email) = query.email.as_deref().filter(|e| !e.trim().is_empty()) {
        filter = filter.with_customer_email(email);
    }
    Ok(filter)
}

route!(order_by_reference => Get "/orders/{reference}" impl OrderStore);
pub async fn order_by_reference<B: OrderStore>(
    path: web::Path<OrderReference>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let reference = path.into_inner();
    debug!("💻️ GET order {reference}");
    let order = api.get_order(&reference).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(update_order_status => Post "/orders/{reference}/status" impl OrderStore);
/// Route handler for manual (or simulated) payment status updates.
///
/// The update is treated as one more payment notification, so it obeys exactly the same transition rules as gateway
/// webhooks. A rejected transition is a `409 Conflict`.
pub async fn update_order_status<B: OrderStore>(
    path: web::Path<OrderReference>,
    body: web::Json<StatusUpdateRequest>,
    api: web::Data<OrderFlowApi<B>>,
    reconciler: web::Data<OrderReconciler<B>>,
) -> Result<HttpResponse, ServerError> {
    let reference = path.into_inner();
    let update = body.into_inner();
    debug!("💻️ POST status update for {reference}: {}", update.status);
    let order = api.get_order(&reference).await?;
    let raw = serde_json::to_value(&update).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    let mut event = PaymentEvent::new(NotificationSource::Manual, channel_for(order.payment_method), update.status)
        .with_order_reference(reference)
        .with_raw(raw);
    if let Some(payment_reference) = &update.payment_reference {
        event = event.with_gateway_reference(payment_reference);
    }
    let outcome = reconciler.reconcile(event).await;
    outcome_response(outcome)
}

fn channel_for(method: PaymentMethod) -> PaymentChannel {
    match method {
        PaymentMethod::Prepay => PaymentChannel::Card,
        PaymentMethod::BankTransferOnDelivery => PaymentChannel::BankTransfer,
        PaymentMethod::TerminalOnDelivery => PaymentChannel::Terminal,
    }
}

fn outcome_response(outcome: ReconcileOutcome) -> Result<HttpResponse, ServerError> {
    match &outcome {
        ReconcileOutcome::Resolved { .. } => Ok(HttpResponse::Ok().json(&outcome)),
        ReconcileOutcome::Rejected { .. } => Err(ServerError::Conflict(outcome.to_string())),
        ReconcileOutcome::Unresolved { reason } => Err(ServerError::NoRecordFound(reason.clone())),
        ReconcileOutcome::Failed { reason } => Err(ServerError::BackendError(reason.clone())),
        ReconcileOutcome::Ignored { .. } | ReconcileOutcome::Malformed { .. } => {
            Err(ServerError::InvalidRequestBody(outcome.to_string()))
        },
    }
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(verify_payment => Get "/payments/verify/{reference}" impl OrderStore, PaymentGateway);
/// Route handler for client-side payment polling.
///
/// Asks the gateway for the transaction's status and reconciles the answer, exactly as if it had arrived by webhook.
/// Transactions that have not settled yet leave the order untouched.
pub async fn verify_payment<B: OrderStore, G: PaymentGateway>(
    path: web::Path<String>,
    reconciler: web::Data<OrderReconciler<B>>,
    gateway: web::Data<G>,
) -> Result<HttpResponse, ServerError> {
    let reference = path.into_inner();
    debug!("💻️ GET verify payment {reference}");
    let data = gateway.verify_payment(&reference).await?;
    let outcome = reconciler.reconcile_verification(&data).await;
    if let ReconcileOutcome::Failed { reason } = &outcome {
        return Err(ServerError::BackendError(reason.clone()));
    }
    let order = match outcome.order_reference() {
        Some(order_reference) => reconciler.db().fetch_order(order_reference).await?,
        None => None,
    };
    Ok(HttpResponse::Ok().json(VerificationResult { outcome, order }))
}

//----------------------------------------------   Riders  ----------------------------------------------------
route!(dispatch_rider => Post "/rider/dispatch" impl OrderStore);
/// Assigns a rider to an order. The first rider to claim an order keeps it.
pub async fn dispatch_rider<B: OrderStore>(
    body: web::Json<DispatchRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let DispatchRequest { order_reference, rider_id, terminal_id } = body.into_inner();
    debug!("💻️ POST dispatch rider {rider_id} with {order_reference}");
    let order = api.assign_rider(&order_reference, &rider_id, terminal_id.as_deref()).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(collect_payment => Post "/rider/collect" impl OrderStore);
/// Route handler for collecting payment on delivery.
///
/// For terminal payments, a confirmation is scheduled and `202 Accepted` is returned. For bank transfers, the
/// customer's dedicated account is returned; the order is confirmed when the transfer notification arrives.
pub async fn collect_payment<B: OrderStore + 'static>(
    body: web::Json<CollectRequest>,
    api: web::Data<OrderFlowApi<B>>,
    reconciler: web::Data<OrderReconciler<B>>,
    scheduler: web::Data<ConfirmationScheduler>,
) -> Result<HttpResponse, ServerError> {
    let CollectRequest { order_reference, rider_id } = body.into_inner();
    debug!("💻️ POST collect payment for {order_reference} by rider {rider_id}");
    let order = api.get_order(&order_reference).await?;
    if order.rider_id.as_deref() != Some(rider_id.as_str()) {
        return Err(ServerError::Forbidden(format!("Order {order_reference} is not assigned to rider {rider_id}")));
    }
    if order.payment_status != PaymentStatus::Pending {
        return Err(ServerError::Conflict(format!(
            "Order {order_reference} is {}, so there is no payment to collect",
            order.payment_status
        )));
    }
    match order.payment_method {
        PaymentMethod::TerminalOnDelivery => {
            let reconciler = reconciler.get_ref().clone();
            let scheduled = scheduler.schedule(reconciler, order_reference.clone(), order.terminal_id.clone());
            Ok(HttpResponse::Accepted().json(CollectionResponse::AwaitingTerminal {
                order_reference,
                confirm_in_ms: scheduler.delay().as_millis(),
                already_scheduled: !scheduled,
            }))
        },
        PaymentMethod::BankTransferOnDelivery => {
            let account_number = order.dedicated_account.clone().ok_or_else(|| {
                ServerError::Conflict(format!("Order {order_reference} has no dedicated account to pay into"))
            })?;
            Ok(HttpResponse::Ok().json(CollectionResponse::BankTransfer {
                order_reference,
                account_number,
                amount: order.amount,
            }))
        },
        PaymentMethod::Prepay => {
            Err(ServerError::Conflict(format!("Order {order_reference} is prepaid and is settled at checkout")))
        },
    }
}

/// Cancels a terminal confirmation that has not fired yet, e.g. because the customer's card was declined.
#[post("/rider/cancel_collection")]
pub async fn cancel_collection(
    body: web::Json<OrderRefRequest>,
    scheduler: web::Data<ConfirmationScheduler>,
) -> Result<HttpResponse, ServerError> {
    let reference = body.into_inner().order_reference;
    debug!("💻️ POST cancel collection for {reference}");
    if scheduler.cancel(&reference) {
        Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Collection for {reference} cancelled"))))
    } else {
        Err(ServerError::NoRecordFound(format!("There is no pending collection for {reference}")))
    }
}

route!(complete_delivery => Post "/rider/complete" impl OrderStore);
pub async fn complete_delivery<B: OrderStore>(
    body: web::Json<OrderRefRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let reference = body.into_inner().order_reference;
    debug!("💻️ POST complete delivery of {reference}");
    let order = api.complete_delivery(&reference).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Payouts  ----------------------------------------------------
route!(pay_vendors => Post "/payouts/{reference}" impl OrderStore, PaymentGateway);
/// Route handler for paying vendors their share of an order that was paid on delivery.
///
/// Prepaid orders are settled by the gateway's split at checkout and are rejected here. Each vendor's net payout is
/// transferred to the vendor's transfer recipient. A failed transfer is reported in its vendor's entry and does not
/// stop the others. Transfer references are derived from the order and vendor, so calling this again cannot pay a
/// vendor twice.
pub async fn pay_vendors<B: OrderStore, G: PaymentGateway>(
    path: web::Path<OrderReference>,
    api: web::Data<OrderFlowApi<B>>,
    splitter: web::Data<PayoutSplitter>,
    gateway: web::Data<G>,
) -> Result<HttpResponse, ServerError> {
    let reference = path.into_inner();
    debug!("💻️ POST vendor payouts for {reference}");
    let order = api.get_order(&reference).await?;
    if !order.payment_method.is_on_delivery() {
        return Err(ServerError::Conflict(format!("Order {reference} was settled by the gateway split at checkout")));
    }
    if !matches!(order.payment_status, PaymentStatus::Paid | PaymentStatus::Delivered) {
        return Err(ServerError::Conflict(format!("Order {reference} is {}", order.payment_status)));
    }
    let payouts = order.vendor_payouts.as_deref().unwrap_or_default();
    if payouts.is_empty() {
        return Err(ServerError::Conflict(format!("Order {reference} has no vendor payouts")));
    }
    let mut results = Vec::with_capacity(payouts.len());
    for payout in payouts {
        let amount = payout.net_payout_minor_units()?;
        let vendor_id = payout.vendor_id.clone();
        let recipient =
            splitter.registry().get(&payout.vendor_id).and_then(|v| v.bank_details.recipient_code.as_deref());
        let result = match recipient {
            None => VendorPayoutResult::failed(vendor_id, amount, "The vendor has no transfer recipient"),
            Some(recipient) => match gateway.pay_vendor(payout_transfer(&order, payout, recipient, amount)).await {
                Ok(receipt) => VendorPayoutResult::paid(vendor_id, amount, receipt),
                Err(e) => {
                    warn!("💻️ Payout of {amount} to {vendor_id} for {reference} failed. {e}");
                    VendorPayoutResult::failed(vendor_id, amount, e)
                },
            },
        };
        results.push(result);
    }
    let paid = results.iter().filter(|r| r.is_paid()).count();
    info!("💻️ {paid} of {} vendor payouts for {reference} transferred", results.len());
    Ok(HttpResponse::Ok().json(results))
}
