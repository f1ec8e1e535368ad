use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::{debug, trace};
use mpg_common::MinorUnits;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Row, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderReference, PaymentMethod, PaymentStatus},
    mpe_api::order_objects::OrderQueryFilter,
    traits::OrderStoreError,
};

fn decode_err<E: std::error::Error + Send + Sync + 'static>(index: &str, e: E) -> sqlx::Error {
    sqlx::Error::ColumnDecode { index: index.to_string(), source: Box::new(e) }
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.try_get(column)?;
    s.parse::<T>().map_err(|e| decode_err(column, e))
}

fn json_column<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error> {
    let s: Option<String> = row.try_get(column)?;
    s.map(|s| serde_json::from_str(&s)).transpose().map_err(|e| decode_err(column, e))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, OrderStoreError> {
    serde_json::to_string(value).map_err(|e| OrderStoreError::DatabaseError(format!("Could not serialize column: {e}")))
}

impl FromRow<'_, SqliteRow> for Order {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            order_reference: OrderReference(row.try_get("order_reference")?),
            customer_email: row.try_get("customer_email")?,
            customer_name: row.try_get("customer_name")?,
            delivery_address: row.try_get("delivery_address")?,
            amount: MinorUnits::from(row.try_get::<i64, _>("amount")?),
            items: json_column::<Value>(row, "items")?.unwrap_or(Value::Null),
            payment_method: parse_column::<PaymentMethod>(row, "payment_method")?,
            payment_status: parse_column::<PaymentStatus>(row, "payment_status")?,
            payment_reference: row.try_get("payment_reference")?,
            payment_details: json_column(row, "payment_details")?,
            vendor_payouts: json_column(row, "vendor_payouts")?,
            dedicated_account: row.try_get("dedicated_account")?,
            rider_id: row.try_get("rider_id")?,
            terminal_id: row.try_get("terminal_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            paid_at: row.try_get("paid_at")?,
            delivered_at: row.try_get("delivered_at")?,
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Inserts a new order with the given reference. A clash on the reference is reported as
/// [`OrderStoreError::DuplicateReference`].
pub async fn insert_order(
    reference: OrderReference,
    order: NewOrder,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderStoreError> {
    let items = to_json(&order.items)?;
    let payouts = order.vendor_payouts.as_ref().map(to_json).transpose()?;
    let result = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_reference,
                customer_email,
                customer_name,
                delivery_address,
                amount,
                items,
                payment_method,
                payment_status,
                vendor_payouts,
                dedicated_account,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *;
        "#,
    )
    .bind(reference.as_str())
    .bind(order.customer_email)
    .bind(order.customer_name)
    .bind(order.delivery_address)
    .bind(order.amount.value())
    .bind(items)
    .bind(order.payment_method.to_string())
    .bind(PaymentStatus::Pending.to_string())
    .bind(payouts)
    .bind(order.dedicated_account)
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => Ok(order),
        Err(e) if is_unique_violation(&e) => Err(OrderStoreError::DuplicateReference(reference)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_reference(
    reference: &OrderReference,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE order_reference = $1")
        .bind(reference.as_str())
        .fetch_optional(conn)
        .await
}

pub async fn fetch_order_by_payment_reference(
    payment_reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE payment_reference = $1")
        .bind(payment_reference)
        .fetch_optional(conn)
        .await
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`, in creation order.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(statuses) = query.status {
        if statuses.is_empty() {
            where_clause.push("1 = 0");
        } else {
            where_clause.push("payment_status IN (");
            let mut values = statuses.iter().peekable();
            while let Some(status) = values.next() {
                where_clause.push_bind_unseparated(status.to_string());
                if values.peek().is_some() {
                    where_clause.push_unseparated(", ");
                }
            }
            where_clause.push_unseparated(")");
        }
    }
    if let Some(method) = query.payment_method {
        where_clause.push("payment_method = ");
        where_clause.push_bind_unseparated(method.to_string());
    }
    if let Some(email) = query.customer_email {
        where_clause.push("customer_email = ");
        where_clause.push_bind_unseparated(email);
        where_clause.push_unseparated(" COLLATE NOCASE");
    }
    if let Some(amount) = query.amount {
        where_clause.push("amount = ");
        where_clause.push_bind_unseparated(amount.value());
    }
    if let Some(account) = query.dedicated_account {
        where_clause.push("dedicated_account = ");
        where_clause.push_bind_unseparated(account);
    }
    if let Some(rider) = query.rider_id {
        where_clause.push("rider_id = ");
        where_clause.push_bind_unseparated(rider);
    }
    builder.push(" ORDER BY id ASC");

    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {}", orders.len());
    Ok(orders)
}

/// Writes the mutable fields of `updated`, but only if the stored row still holds the values in `current`.
///
/// Returns `false` if another writer changed the order first.
pub(crate) async fn compare_and_set(
    current: &Order,
    updated: &Order,
    conn: &mut SqliteConnection,
) -> Result<bool, OrderStoreError> {
    let details = updated.payment_details.as_ref().map(to_json).transpose()?;
    let result = sqlx::query(
        r#"
            UPDATE orders SET
                payment_status = $1,
                payment_reference = $2,
                payment_details = $3,
                rider_id = $4,
                terminal_id = $5,
                updated_at = $6,
                paid_at = $7,
                delivered_at = $8
            WHERE id = $9 AND payment_status = $10 AND rider_id IS $11 AND payment_reference IS $12
        "#,
    )
    .bind(updated.payment_status.to_string())
    .bind(updated.payment_reference.as_deref())
    .bind(details)
    .bind(updated.rider_id.as_deref())
    .bind(updated.terminal_id.as_deref())
    .bind(updated.updated_at)
    .bind(updated.paid_at)
    .bind(updated.delivered_at)
    .bind(current.id)
    .bind(current.payment_status.to_string())
    .bind(current.rider_id.as_deref())
    .bind(current.payment_reference.as_deref())
    .execute(&mut *conn)
    .await;
    match result {
        Ok(r) => {
            let written = r.rows_affected() == 1;
            let result = if written { "written" } else { "lost" };
            debug!("🗃️ Compare-and-set on order {}: {result}", current.order_reference);
            Ok(written)
        },
        Err(e) if is_unique_violation(&e) => {
            let payment_reference = updated.payment_reference.clone().unwrap_or_default();
            let owner = fetch_order_by_payment_reference(&payment_reference, conn)
                .await?
                .map(|o| o.order_reference)
                .unwrap_or_else(|| OrderReference::from("unknown"));
            Err(OrderStoreError::PaymentReferenceInUse { payment_reference, owner })
        },
        Err(e) => Err(e.into()),
    }
}
