//! `SqliteDatabase` is a durable implementation of [`OrderStore`].
use std::fmt::Debug;

use chrono::Utc;
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};

use super::db::{db_url, new_pool, orders};
use crate::{
    db_types::{NewOrder, Order, OrderReference, PaymentUpdate},
    helpers::generate_order_reference,
    mpe_api::order_objects::OrderQueryFilter,
    traits::{OrderStore, OrderStoreError, PaymentTransition},
};

const MAX_CAS_ATTEMPTS: usize = 16;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using `MPG_DATABASE_URL`
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Creates the database file if it does not exist yet, connects, and brings the schema up to date.
    pub async fn open(url: &str, max_connections: u32) -> Result<Self, OrderStoreError> {
        if !Sqlite::database_exists(url).await? {
            info!("🗃️ Creating Sqlite database {url}");
            Sqlite::create_database(url).await?;
        }
        let db = Self::new_with_url(url, max_connections).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<(), OrderStoreError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| OrderStoreError::DatabaseError(format!("Migration failed: {e}")))?;
        info!("🗃️ Migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&mut self) -> Result<(), sqlx::Error> {
        self.pool.close().await;
        Ok(())
    }

    /// Reads the order, applies `f` to a copy and writes it back with a compare-and-set. If another writer got there
    /// first, the whole cycle is repeated against the fresh row. Returns the row as it was read, the row as written
    /// and whether anything was written.
    async fn modify<F>(&self, reference: &OrderReference, f: F) -> Result<(Order, Order, bool), OrderStoreError>
    where F: Fn(&mut Order) -> Result<bool, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = orders::fetch_order_by_reference(reference, &mut conn)
                .await?
                .ok_or_else(|| OrderStoreError::NotFound(reference.clone()))?;
            let mut updated = current.clone();
            if !f(&mut updated)? {
                return Ok((current, updated, false));
            }
            if orders::compare_and_set(&current, &updated, &mut conn).await? {
                return Ok((current, updated, true));
            }
            debug!("🗃️ Order {reference} changed underneath us. Retrying (attempt {attempt})");
        }
        Err(OrderStoreError::DatabaseError(format!(
            "Gave up updating order {reference} after {MAX_CAS_ATTEMPTS} conflicting writes"
        )))
    }
}

impl OrderStore for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
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
        let mut conn = self.pool.acquire().await?;
        let order = match order.order_reference.clone() {
            Some(reference) => orders::insert_order(reference, order, now, &mut conn).await?,
            None => {
                let mut attempts = 0;
                loop {
                    attempts += 1;
                    let reference = generate_order_reference(now);
                    match orders::insert_order(reference, order.clone(), now, &mut conn).await {
                        Err(OrderStoreError::DuplicateReference(r)) if attempts < 3 => {
                            warn!("🗃️ Generated order reference {r} clashed with an existing order. Trying again.");
                        },
                        result => break result?,
                    }
                }
            },
        };
        debug!("🗃️ Order {} stored with id {}", order.order_reference, order.id);
        Ok(order)
    }

    async fn fetch_order(&self, reference: &OrderReference) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_reference(reference, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_payment_reference(payment_reference, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn transition_payment(
        &self,
        reference: &OrderReference,
        update: PaymentUpdate,
    ) -> Result<PaymentTransition, OrderStoreError> {
        let (previous, order, _) =
            self.modify(reference, |order| order.apply_payment_update(&update, Utc::now())).await?;
        if previous.payment_status != order.payment_status {
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
        let (_, order, changed) =
            self.modify(reference, |order| order.assign_rider(rider_id, terminal_id.as_deref(), Utc::now())).await?;
        if changed {
            debug!("🗃️ Order {reference} assigned to rider {rider_id}");
        }
        Ok(order)
    }

    async fn complete_delivery(&self, reference: &OrderReference) -> Result<Order, OrderStoreError> {
        let (_, order, _) = self.modify(reference, |order| order.complete_delivery(Utc::now()).map(|_| true)).await?;
        debug!("🗃️ Order {reference} delivered");
        Ok(order)
    }
}
