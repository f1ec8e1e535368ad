use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
        Mutex,
        RwLock,
    },
};

use chrono::Utc;
use log::*;

use crate::{
    db_types::{NewOrder, Order, OrderReference, PaymentUpdate},
    helpers::generate_order_reference,
    mpe_api::order_objects::OrderQueryFilter,
    traits::{OrderStore, OrderStoreError, PaymentTransition},
};

const MEMORY_URL: &str = "memory://";

type OrderCell = Arc<Mutex<Order>>;

#[derive(Default)]
struct OrderArena {
    by_reference: HashMap<OrderReference, OrderCell>,
    creation_order: Vec<OrderCell>,
}

#[derive(Default)]
struct MemoryStore {
    next_id: AtomicI64,
    orders: RwLock<OrderArena>,
    payment_index: RwLock<HashMap<String, OrderReference>>,
}

/// Lock order, where more than one lock is held: an order's mutex, then the payment index. The arena lock is only
/// ever held on its own.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<MemoryStore>,
}

impl Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.inner.orders.read().map(|a| a.creation_order.len()).unwrap_or_default();
        write!(f, "MemoryDatabase ({count} orders)")
    }
}

fn poisoned<T>(_: T) -> OrderStoreError {
    OrderStoreError::DatabaseError("An order store lock was poisoned".into())
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, reference: &OrderReference) -> Result<OrderCell, OrderStoreError> {
        let arena = self.inner.orders.read().map_err(poisoned)?;
        arena.by_reference.get(reference).cloned().ok_or_else(|| OrderStoreError::NotFound(reference.clone()))
    }

    /// Runs `f` against a copy of the order while holding that order's lock, and commits the copy if `f` succeeds.
    /// `f` returns whether it changed anything. A changed gateway payment reference is added to the index in the same
    /// critical section.
    fn modify<F>(&self, reference: &OrderReference, f: F) -> Result<(Order, bool), OrderStoreError>
    where F: FnOnce(&mut Order) -> Result<bool, OrderStoreError> {
        let cell = self.cell(reference)?;
        let mut guard = cell.lock().map_err(poisoned)?;
        let mut updated = guard.clone();
        let changed = f(&mut updated)?;
        if !changed {
            return Ok((updated, false));
        }
        if let (None, Some(payment_ref)) = (&guard.payment_reference, &updated.payment_reference) {
            let mut index = self.inner.payment_index.write().map_err(poisoned)?;
            match index.get(payment_ref) {
                Some(owner) if owner != reference => {
                    return Err(OrderStoreError::PaymentReferenceInUse {
                        payment_reference: payment_ref.clone(),
                        owner: owner.clone(),
                    });
                },
                _ => {
                    index.insert(payment_ref.clone(), reference.clone());
                },
            }
        }
        *guard = updated.clone();
        Ok((updated, true))
    }
}

impl OrderStore for MemoryDatabase {
    fn url(&self) -> &str {
        MEMORY_URL
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderStoreError> {
        if order.customer_email.trim().is_empty() {
            return Err(OrderStoreError::InvalidOrder("A customer email is required".into()));
        }
        if !order.amount.value().is_positive() {
            return Err(OrderStoreError::InvalidOrder(format!(
                "The order amount must be positive, not {}",
                order.amount
            )));
        }
        let now = Utc::now();
        let mut arena = self.inner.orders.write().map_err(poisoned)?;
        let reference = match &order.order_reference {
            Some(r) if arena.by_reference.contains_key(r) => {
                return Err(OrderStoreError::DuplicateReference(r.clone()));
            },
            Some(r) => r.clone(),
            None => loop {
                let r = generate_order_reference(now);
                if !arena.by_reference.contains_key(&r) {
                    break r;
                }
            },
        };
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let order = Order::from_new_order(id, reference.clone(), order, now);
        let cell = Arc::new(Mutex::new(order.clone()));
        arena.by_reference.insert(reference, Arc::clone(&cell));
        arena.creation_order.push(cell);
        debug!("🗃️ Order {} stored with id {id}", order.order_reference);
        Ok(order)
    }

    async fn fetch_order(&self, reference: &OrderReference) -> Result<Option<Order>, OrderStoreError> {
        match self.cell(reference) {
            Ok(cell) => Ok(Some(cell.lock().map_err(poisoned)?.clone())),
            Err(OrderStoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn fetch_order_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<Order>, OrderStoreError> {
        let reference = {
            let index = self.inner.payment_index.read().map_err(poisoned)?;
            index.get(payment_reference).cloned()
        };
        match reference {
            Some(r) => self.fetch_order(&r).await,
            None => Ok(None),
        }
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderStoreError> {
        let cells = {
            let arena = self.inner.orders.read().map_err(poisoned)?;
            arena.creation_order.clone()
        };
        let mut result = Vec::new();
        for cell in cells {
            let order = cell.lock().map_err(poisoned)?;
            if query.matches(&order) {
                result.push(order.clone());
            }
        }
        trace!("🗃️ {} orders match the query. {query}", result.len());
        Ok(result)
    }

    async fn transition_payment(
        &self,
        reference: &OrderReference,
        update: PaymentUpdate,
    ) -> Result<PaymentTransition, OrderStoreError> {
        let now = Utc::now();
        let mut previous = None;
        let (order, _) = self.modify(reference, |order| {
            previous = Some(order.payment_status);
            order.apply_payment_update(&update, now)
        })?;
        if previous != Some(order.payment_status) {
            debug!("🗃️ Order {reference} is now {}", order.payment_status);
            Ok(PaymentTransition::Applied(order))
        } else {
            debug!("🗃️ Order {reference} is already {}. Nothing to do.", order.payment_status);
            Ok(PaymentTransition::Unchanged(order))
        }
    }

    async fn assign_delivery(
        &self,
        reference: &OrderReference,
        rider_id: &str,
        terminal_id: Option<String>,
    ) -> Result<Order, OrderStoreError> {
        let now = Utc::now();
        let (order, changed) = self.modify(reference, |order| order.assign_rider(rider_id, terminal_id.as_deref(), now))?;
        if changed {
            debug!("🗃️ Order {reference} assigned to rider {rider_id}");
        }
        Ok(order)
    }

    async fn complete_delivery(&self, reference: &OrderReference) -> Result<Order, OrderStoreError> {
        let now = Utc::now();
        let (order, _) = self.modify(reference, |order| order.complete_delivery(now).map(|_| true))?;
        debug!("🗃️ Order {reference} delivered");
        Ok(order)
    }
}
