use std::fmt::Display;

use mpg_common::MinorUnits;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::db_types::{OrderReference, PaymentStatus};

/// Metadata keys under which the order reference may be carried by a gateway notification.
pub const ORDER_REFERENCE_METADATA_KEYS: [&str; 2] = ["order_reference", "orderReference"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentChannel {
    Card,
    BankTransfer,
    Terminal,
}

impl Display for PaymentChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentChannel::Card => write!(f, "card"),
            PaymentChannel::BankTransfer => write!(f, "bank_transfer"),
            PaymentChannel::Terminal => write!(f, "terminal"),
        }
    }
}

/// Where a payment notification came from. This is informational only: every source goes through the same
/// resolution and transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSource {
    Webhook,
    Verification,
    Manual,
    Rider,
}

impl Display for NotificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationSource::Webhook => write!(f, "webhook"),
            NotificationSource::Verification => write!(f, "verification"),
            NotificationSource::Manual => write!(f, "manual"),
            NotificationSource::Rider => write!(f, "rider"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("Unsupported gateway event: {0}")]
    Unsupported(String),
    #[error("Malformed payment notification: {0}")]
    Malformed(String),
}

/// A normalised payment notification. Every field other than `status` is optional, since each notification path
/// carries a different subset of identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub source: NotificationSource,
    pub channel: PaymentChannel,
    pub status: PaymentStatus,
    pub order_reference: Option<OrderReference>,
    pub gateway_reference: Option<String>,
    pub customer_email: Option<String>,
    pub amount: Option<MinorUnits>,
    /// The dedicated virtual account the money was paid into, for bank transfers.
    pub virtual_account: Option<String>,
    /// The notification exactly as it was received.
    pub raw: Value,
}

impl PaymentEvent {
    pub fn new(source: NotificationSource, channel: PaymentChannel, status: PaymentStatus) -> Self {
        Self {
            source,
            channel,
            status,
            order_reference: None,
            gateway_reference: None,
            customer_email: None,
            amount: None,
            virtual_account: None,
            raw: Value::Null,
        }
    }

    pub fn with_order_reference<R: Into<OrderReference>>(mut self, reference: R) -> Self {
        self.order_reference = Some(reference.into());
        self
    }

    pub fn with_gateway_reference(mut self, reference: &str) -> Self {
        self.gateway_reference = Some(reference.to_string());
        self
    }

    pub fn with_customer(mut self, email: &str, amount: MinorUnits) -> Self {
        self.customer_email = Some(email.to_string());
        self.amount = Some(amount);
        self
    }

    pub fn with_virtual_account(mut self, account: &str) -> Self {
        self.virtual_account = Some(account.to_string());
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// Parses a gateway webhook envelope of the form `{ "event": "charge.success", "data": { ... } }`.
    pub fn from_webhook(payload: &Value) -> Result<Self, NotificationError> {
        let name = payload
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| NotificationError::Malformed("The notification has no event name".into()))?;
        let (status, is_terminal_request) = match name {
            "charge.success" => (PaymentStatus::Paid, false),
            "charge.failed" => (PaymentStatus::Failed, false),
            "refund.processed" => (PaymentStatus::Refunded, false),
            "paymentrequest.success" => (PaymentStatus::Paid, true),
            "paymentrequest.failed" => (PaymentStatus::Failed, true),
            other => return Err(NotificationError::Unsupported(other.to_string())),
        };
        let data = payload
            .get("data")
            .filter(|d| d.is_object())
            .ok_or_else(|| NotificationError::Malformed(format!("The {name} notification has no data object")))?;
        let mut event = Self::from_transaction_data(NotificationSource::Webhook, status, data)?;
        if is_terminal_request {
            event.channel = PaymentChannel::Terminal;
            if event.order_reference.is_none() {
                event.order_reference = str_field(data, "offline_reference").map(OrderReference::from);
            }
        }
        event.raw = payload.clone();
        Ok(event)
    }

    /// Parses the `data` object of a verify-transaction response. Returns `Ok(None)` if the transaction has not
    /// settled yet (e.g. it is still `ongoing` or `abandoned`), since there is nothing to apply.
    pub fn from_verified_transaction(data: &Value) -> Result<Option<Self>, NotificationError> {
        let status = match data.get("status").and_then(Value::as_str) {
            Some("success") => PaymentStatus::Paid,
            Some("failed" | "reversed") => PaymentStatus::Failed,
            Some(_) => return Ok(None),
            None => return Err(NotificationError::Malformed("The transaction has no status".into())),
        };
        let mut event = Self::from_transaction_data(NotificationSource::Verification, status, data)?;
        event.raw = data.clone();
        Ok(Some(event))
    }

    fn from_transaction_data(
        source: NotificationSource,
        status: PaymentStatus,
        data: &Value,
    ) -> Result<Self, NotificationError> {
        let channel = match data.get("channel").and_then(Value::as_str) {
            Some("dedicated_nuban" | "bank_transfer" | "bank") => PaymentChannel::BankTransfer,
            Some("pos" | "terminal") => PaymentChannel::Terminal,
            _ => PaymentChannel::Card,
        };
        let metadata = metadata(data);
        let order_reference = metadata.as_ref().and_then(|m| {
            ORDER_REFERENCE_METADATA_KEYS.iter().find_map(|k| str_field(m, k)).map(OrderReference::from)
        });
        let gateway_reference = str_field(data, "reference").or_else(|| str_field(data, "transaction_reference"));
        let customer_email = data.get("customer").and_then(|c| str_field(c, "email"));
        let amount = match data.get("amount") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_i64()
                    .map(MinorUnits::from)
                    .ok_or_else(|| NotificationError::Malformed(format!("Invalid amount: {v}")))?,
            ),
        };
        let virtual_account = metadata
            .as_ref()
            .and_then(|m| str_field(m, "receiver_account_number"))
            .or_else(|| data.get("authorization").and_then(|a| str_field(a, "receiver_bank_account_number")))
            .or_else(|| data.get("dedicated_account").and_then(|a| str_field(a, "account_number")));
        Ok(Self {
            source,
            channel,
            status,
            order_reference,
            gateway_reference,
            customer_email,
            amount,
            virtual_account,
            raw: Value::Null,
        })
    }
}

/// Gateways sometimes deliver metadata as a JSON-encoded string rather than an object.
fn metadata(data: &Value) -> Option<Value> {
    match data.get("metadata")? {
        Value::String(s) => serde_json::from_str::<Value>(s).ok().filter(Value::is_object),
        v @ Value::Object(_) => Some(v.clone()),
        _ => None,
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}
