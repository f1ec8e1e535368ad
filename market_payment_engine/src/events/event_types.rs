use serde::{Deserialize, Serialize};

use crate::{db_types::Order, mpe_api::payment_objects::PaymentEvent};

/// Emitted once, when an order first moves to `paid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDeliveredEvent {
    pub order: Order,
}

impl OrderDeliveredEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted when a payment notification could not be matched to exactly one order. Someone should look at these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentUnresolvedEvent {
    pub event: PaymentEvent,
    pub reason: String,
}

impl PaymentUnresolvedEvent {
    pub fn new(event: PaymentEvent, reason: &str) -> Self {
        Self { event, reason: reason.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    OrderPaid(OrderPaidEvent),
    OrderDelivered(OrderDeliveredEvent),
    PaymentUnresolved(PaymentUnresolvedEvent),
}
