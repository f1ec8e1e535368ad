use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use mpg_common::MinorUnits;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{split::VendorPayout, traits::OrderStoreError};

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------     OrderReference    ---------------------------------------------------------
/// The externally visible correlation key of an order. Every reconciliation path eventually resolves to one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderReference(pub String);

impl FromStr for OrderReference {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            Err(ConversionError("An order reference cannot be empty".into()))
        } else {
            Ok(Self(s.to_string()))
        }
    }
}

impl From<String> for OrderReference {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderReference {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

impl OrderReference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        VendorId       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(pub String);

impl From<&str> for VendorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VendorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for VendorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl VendorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
/// The payment and delivery state of an order.
///
/// ```text
///   pending ──► paid ──► delivered
///      │          └────► refunded
///      └──────► failed
/// ```
///
/// `failed`, `delivered` and `refunded` are terminal. No transition ever moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// The order has been placed, and no payment has been confirmed yet.
    Pending,
    /// The gateway has confirmed the payment.
    Paid,
    /// The gateway reported that the payment failed.
    Failed,
    /// The order was paid for and handed over to the customer.
    Delivered,
    /// A paid order was refunded by the gateway.
    Refunded,
}

impl PaymentStatus {
    /// Returns true if `next` is a legal direct successor of this status. A status is not its own successor.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!((self, next), (Pending, Paid) | (Pending, Failed) | (Paid, Delivered) | (Paid, Refunded))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Delivered | PaymentStatus::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Delivered => "delivered",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "delivered" => Ok(Self::Delivered),
            "refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------     PaymentMethod     ---------------------------------------------------------
/// How the customer pays. Fixed when the order is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card (or any gateway checkout channel) at order placement.
    Prepay,
    /// A transfer into the customer's dedicated virtual account when the rider arrives.
    BankTransferOnDelivery,
    /// A card payment on the rider's terminal.
    TerminalOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Prepay => "prepay",
            PaymentMethod::BankTransferOnDelivery => "bank_transfer_on_delivery",
            PaymentMethod::TerminalOnDelivery => "terminal_on_delivery",
        }
    }

    pub fn is_on_delivery(&self) -> bool {
        !matches!(self, PaymentMethod::Prepay)
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prepay" => Ok(Self::Prepay),
            "bank_transfer_on_delivery" => Ok(Self::BankTransferOnDelivery),
            "terminal_on_delivery" => Ok(Self::TerminalOnDelivery),
            s => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_reference: OrderReference,
    pub customer_email: String,
    pub customer_name: String,
    pub delivery_address: Option<String>,
    /// The order total. Always equal to the `order_total` of the split the order was created from.
    pub amount: MinorUnits,
    /// Opaque cart snapshot, kept for display and audit.
    pub items: Value,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// The gateway's transaction reference. Set on the first notification that carries one, never changed afterwards.
    pub payment_reference: Option<String>,
    /// The last raw payment notification that changed this order.
    pub payment_details: Option<Value>,
    pub vendor_payouts: Option<Vec<VendorPayout>>,
    /// The virtual account number issued for bank-transfer-on-delivery orders.
    pub dedicated_account: Option<String>,
    pub rider_id: Option<String>,
    pub terminal_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Builds the stored representation of a new order. Backends supply the id and the reference (which is generated
    /// if the caller did not provide one).
    pub fn from_new_order(id: i64, order_reference: OrderReference, order: NewOrder, now: DateTime<Utc>) -> Self {
        Self {
            id,
            order_reference,
            customer_email: order.customer_email,
            customer_name: order.customer_name,
            delivery_address: order.delivery_address,
            amount: order.amount,
            items: order.items,
            payment_method: order.payment_method,
            payment_status: PaymentStatus::Pending,
            payment_reference: None,
            payment_details: None,
            vendor_payouts: order.vendor_payouts,
            dedicated_account: order.dedicated_account,
            rider_id: None,
            terminal_id: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
            delivered_at: None,
        }
    }

    /// Applies a payment status update in place.
    ///
    /// * Repeating the current status leaves the status, timestamps and `payment_details` alone. If the order has no
    ///   payment reference yet and the update carries one, it is recorded and `Ok(true)` is returned. Otherwise this
    ///   is a no-op returning `Ok(false)`.
    /// * An illegal successor returns [`OrderStoreError::InvalidTransition`] and leaves the order untouched.
    /// * Otherwise the status changes, the payment reference is recorded if none was set yet, the details are replaced,
    ///   and `paid_at`/`delivered_at` are stamped on first entry into those states. Returns `Ok(true)`.
    pub fn apply_payment_update(
        &mut self,
        update: &PaymentUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, OrderStoreError> {
        if self.payment_status == update.status {
            if self.payment_reference.is_some() || update.payment_reference.is_none() {
                return Ok(false);
            }
            self.payment_reference = update.payment_reference.clone();
            self.updated_at = now;
            return Ok(true);
        }
        if !self.payment_status.can_transition_to(update.status) {
            return Err(OrderStoreError::InvalidTransition {
                reference: self.order_reference.clone(),
                from: self.payment_status,
                to: update.status,
            });
        }
        self.payment_status = update.status;
        if self.payment_reference.is_none() {
            self.payment_reference = update.payment_reference.clone();
        }
        if update.details.is_some() {
            self.payment_details = update.details.clone();
        }
        match update.status {
            PaymentStatus::Paid if self.paid_at.is_none() => self.paid_at = Some(now),
            PaymentStatus::Delivered if self.delivered_at.is_none() => self.delivered_at = Some(now),
            _ => {},
        }
        self.updated_at = now;
        Ok(true)
    }

    /// Claims the order for a rider. Only the first rider wins; the same rider claiming again is a no-op.
    pub fn assign_rider(
        &mut self,
        rider_id: &str,
        terminal_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, OrderStoreError> {
        if !matches!(self.payment_status, PaymentStatus::Pending | PaymentStatus::Paid) {
            return Err(OrderStoreError::AssignmentForbidden(self.order_reference.clone(), self.payment_status));
        }
        match self.rider_id.as_deref() {
            Some(current) if current == rider_id => Ok(false),
            Some(current) => Err(OrderStoreError::AlreadyAssigned {
                reference: self.order_reference.clone(),
                rider_id: current.to_string(),
            }),
            None => {
                self.rider_id = Some(rider_id.to_string());
                self.terminal_id = terminal_id.map(String::from);
                self.updated_at = now;
                Ok(true)
            },
        }
    }

    /// Marks a paid order as delivered.
    pub fn complete_delivery(&mut self, now: DateTime<Utc>) -> Result<(), OrderStoreError> {
        let update = PaymentUpdate::new(PaymentStatus::Delivered);
        match self.apply_payment_update(&update, now)? {
            true => Ok(()),
            false => Err(OrderStoreError::InvalidTransition {
                reference: self.order_reference.clone(),
                from: self.payment_status,
                to: PaymentStatus::Delivered,
            }),
        }
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    /// The caller-supplied reference. A fresh one is generated at creation if this is `None`.
    pub order_reference: Option<OrderReference>,
    pub customer_email: String,
    pub customer_name: String,
    pub delivery_address: Option<String>,
    pub amount: MinorUnits,
    pub items: Value,
    pub payment_method: PaymentMethod,
    pub vendor_payouts: Option<Vec<VendorPayout>>,
    pub dedicated_account: Option<String>,
}

impl NewOrder {
    pub fn new(customer_email: &str, customer_name: &str, amount: MinorUnits, payment_method: PaymentMethod) -> Self {
        Self {
            order_reference: None,
            customer_email: customer_email.to_string(),
            customer_name: customer_name.to_string(),
            delivery_address: None,
            amount,
            items: Value::Array(Vec::new()),
            payment_method,
            vendor_payouts: None,
            dedicated_account: None,
        }
    }

    pub fn with_reference<R: Into<OrderReference>>(mut self, reference: R) -> Self {
        self.order_reference = Some(reference.into());
        self
    }

    pub fn with_delivery_address(mut self, address: &str) -> Self {
        self.delivery_address = Some(address.to_string());
        self
    }

    pub fn with_items(mut self, items: Value) -> Self {
        self.items = items;
        self
    }

    pub fn with_vendor_payouts(mut self, payouts: Vec<VendorPayout>) -> Self {
        self.vendor_payouts = Some(payouts);
        self
    }

    pub fn with_dedicated_account(mut self, account: &str) -> Self {
        self.dedicated_account = Some(account.to_string());
        self
    }
}

impl Display for NewOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reference = self.order_reference.as_ref().map(|r| r.to_string()).unwrap_or_else(|| "(unassigned)".into());
        write!(f, "Order {reference} for {} of {} via {}", self.customer_email, self.amount, self.payment_method)
    }
}

//--------------------------------------     PaymentUpdate     ---------------------------------------------------------
/// A requested payment status change, along with the data that accompanies it.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdate {
    pub status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub details: Option<Value>,
}

impl PaymentUpdate {
    pub fn new(status: PaymentStatus) -> Self {
        Self { status, payment_reference: None, details: None }
    }

    pub fn with_payment_reference(mut self, reference: &str) -> Self {
        self.payment_reference = Some(reference.to_string());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
