use std::fmt::Debug;

use log::*;
use mpg_common::MinorUnits;

use crate::{
    db_types::{NewOrder, Order, OrderReference},
    events::{EventProducers, OrderDeliveredEvent},
    mpe_api::order_objects::OrderQueryFilter,
    split::OrderSplit,
    traits::{OrderStore, OrderStoreError},
};

/// `OrderFlowApi` is the primary API for placing orders and moving them through delivery.
///
/// Payment status changes do not go through this API. They arrive as notifications and are applied by
/// [`crate::OrderReconciler`].
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B> OrderFlowApi<B>
where B: OrderStore
{
    /// Stores a brand-new order. If the order carries a vendor payout snapshot, the gross sales in it must add up to
    /// the order amount.
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, OrderStoreError> {
        if let Some(payouts) = &order.vendor_payouts {
            let gross: MinorUnits = payouts.iter().map(|p| p.gross_sales).sum();
            if gross != order.amount {
                return Err(OrderStoreError::InvalidOrder(format!(
                    "The vendor payouts add up to {gross}, but the order is for {}",
                    order.amount
                )));
            }
        }
        let order = self.db.insert_order(order).await?;
        info!(
            "🔄️📦️ Order {} created for {} ({}, {})",
            order.order_reference, order.customer_email, order.amount, order.payment_method
        );
        Ok(order)
    }

    /// Stores a new order whose amount and vendor payout snapshot are taken from `split`.
    pub async fn create_order_for_split(
        &self,
        mut order: NewOrder,
        split: &OrderSplit,
    ) -> Result<Order, OrderStoreError> {
        order.amount = split.order_total;
        order.vendor_payouts = Some(split.vendor_payouts.clone());
        self.create_order(order).await
    }

    pub async fn fetch_order(&self, reference: &OrderReference) -> Result<Option<Order>, OrderStoreError> {
        self.db.fetch_order(reference).await
    }

    /// Like [`Self::fetch_order`], but a missing order is an error.
    pub async fn get_order(&self, reference: &OrderReference) -> Result<Order, OrderStoreError> {
        self.db.fetch_order(reference).await?.ok_or_else(|| OrderStoreError::NotFound(reference.clone()))
    }

    /// Returns the orders matching `filter` (or all orders), in creation order.
    pub async fn list_orders(&self, filter: Option<OrderQueryFilter>) -> Result<Vec<Order>, OrderStoreError> {
        self.db.search_orders(filter.unwrap_or_default()).await
    }

    pub async fn assign_rider(
        &self,
        reference: &OrderReference,
        rider_id: &str,
        terminal_id: Option<&str>,
    ) -> Result<Order, OrderStoreError> {
        let rider_id = rider_id.trim();
        if rider_id.is_empty() {
            return Err(OrderStoreError::InvalidOrder("A rider id is required".into()));
        }
        let order = self.db.assign_delivery(reference, rider_id, terminal_id.map(String::from)).await?;
        debug!("🔄️🛵️ Order {reference} is out for delivery with rider {rider_id}");
        Ok(order)
    }

    /// Marks a paid order as delivered and notifies the delivery hook subscribers.
    pub async fn complete_delivery(&self, reference: &OrderReference) -> Result<Order, OrderStoreError> {
        let order = self.db.complete_delivery(reference).await?;
        info!("🔄️🛵️ Order {reference} delivered");
        self.producers.publish_order_delivered(OrderDeliveredEvent::new(order.clone())).await;
        Ok(order)
    }
}
