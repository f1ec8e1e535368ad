//! Event hooks registered by the server.
//!
//! For now the server only records engine events in the log. Paid orders are where fulfilment starts, and unresolved
//! payments need a human to look at them, so those get `info` and `warn` lines respectively.
use futures::future::BoxFuture;
use log::*;
use market_payment_engine::events::{
    EventHandlers,
    EventHooks,
    OrderDeliveredEvent,
    OrderPaidEvent,
    PaymentUnresolvedEvent,
};

pub const EVENT_BUFFER_SIZE: usize = 25;

pub fn create_logging_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev| {
        let OrderPaidEvent { order } = ev;
        info!(
            "📬️ Order {} ({}) has been paid by {}. Reference: {}",
            order.order_reference,
            order.amount,
            order.customer_email,
            order.payment_reference.as_deref().unwrap_or("none")
        );
        no_op()
    });
    hooks.on_order_delivered(|ev| {
        let OrderDeliveredEvent { order } = ev;
        info!("📬️ Order {} has been delivered by rider {}", order.order_reference, order.rider_id.unwrap_or_default());
        no_op()
    });
    hooks.on_payment_unresolved(|ev| {
        let PaymentUnresolvedEvent { event, reason } = ev;
        warn!(
            "📬️ A {} payment notification ({}) could not be matched to an order. {reason}",
            event.channel,
            event.gateway_reference.as_deref().unwrap_or("no gateway reference")
        );
        debug!("📬️ Unmatched notification: {}", event.raw);
        no_op()
    });
    EventHandlers::new(EVENT_BUFFER_SIZE, hooks)
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}
