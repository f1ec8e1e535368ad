use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderReference, PaymentStatus, PaymentUpdate},
    mpe_api::order_objects::OrderQueryFilter,
};

/// The result of a payment status update that found its order.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentTransition {
    /// The status changed. Contains the updated order.
    Applied(Order),
    /// The order was already in the requested status. Contains the current order.
    Unchanged(Order),
}

impl PaymentTransition {
    pub fn order(&self) -> &Order {
        match self {
            PaymentTransition::Applied(o) | PaymentTransition::Unchanged(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            PaymentTransition::Applied(o) | PaymentTransition::Unchanged(o) => o,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, PaymentTransition::Applied(_))
    }
}

/// The authoritative registry of orders.
///
/// Lookups here are by exact key only. Fuzzy resolution of payment notifications is the job of
/// [`crate::OrderReconciler`].
#[allow(async_fn_in_trait)]
pub trait OrderStore: Clone {
    /// The URL of the backing store
    fn url(&self) -> &str;

    /// Stores a new order with status `pending`. A reference is generated if the caller did not supply one.
    ///
    /// Fails with [`OrderStoreError::DuplicateReference`] if an order with the same reference exists already.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderStoreError>;

    async fn fetch_order(&self, reference: &OrderReference) -> Result<Option<Order>, OrderStoreError>;

    /// Fetches the order whose recorded gateway transaction reference is `payment_reference`.
    async fn fetch_order_by_payment_reference(&self, payment_reference: &str)
        -> Result<Option<Order>, OrderStoreError>;

    /// Returns every order matching the filter, in creation order.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderStoreError>;

    /// Atomically applies a payment status update to the order with the given reference.
    ///
    /// * [`PaymentTransition::Unchanged`] if the order already has the requested status. Only a missing gateway
    ///   payment reference is recorded in that case.
    /// * [`OrderStoreError::InvalidTransition`] if the requested status is not a legal successor.
    /// * [`OrderStoreError::PaymentReferenceInUse`] if the update would record a gateway reference that already
    ///   belongs to another order.
    /// * [`OrderStoreError::NotFound`] if there is no such order.
    async fn transition_payment(
        &self,
        reference: &OrderReference,
        update: PaymentUpdate,
    ) -> Result<PaymentTransition, OrderStoreError>;

    /// Assigns a rider (and optionally a terminal) to an order that is `pending` or `paid`.
    ///
    /// This is a compare-and-set on the rider field: the first rider wins, a repeat by the same rider is a no-op,
    /// and any other rider receives [`OrderStoreError::AlreadyAssigned`].
    async fn assign_delivery(
        &self,
        reference: &OrderReference,
        rider_id: &str,
        terminal_id: Option<String>,
    ) -> Result<Order, OrderStoreError>;

    /// Moves a `paid` order to `delivered` and stamps `delivered_at`.
    async fn complete_delivery(&self, reference: &OrderReference) -> Result<Order, OrderStoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum OrderStoreError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} does not exist")]
    NotFound(OrderReference),
    #[error("Order {0} already exists")]
    DuplicateReference(OrderReference),
    #[error("Order {reference} cannot move from {from} to {to}")]
    InvalidTransition { reference: OrderReference, from: PaymentStatus, to: PaymentStatus },
    #[error("Order {reference} has already been assigned to rider {rider_id}")]
    AlreadyAssigned { reference: OrderReference, rider_id: String },
    #[error("Order {0} cannot be assigned to a rider while it is {1}")]
    AssignmentForbidden(OrderReference, PaymentStatus),
    #[error("Payment reference {payment_reference} is already recorded against order {owner}")]
    PaymentReferenceInUse { payment_reference: String, owner: OrderReference },
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for OrderStoreError {
    fn from(e: sqlx::Error) -> Self {
        OrderStoreError::DatabaseError(e.to_string())
    }
}
