use std::fmt::Display;

use gateway_tools::{DedicatedAccount, TransactionInit, TransferReceipt};
use market_payment_engine::{
    db_types::{Order, OrderReference, PaymentMethod, PaymentStatus, VendorId},
    split::{CartLine, GatewaySplitConfig, OrderSplit},
    ReconcileOutcome,
};
use mpg_common::MinorUnits;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitPreviewRequest {
    pub cart: Vec<CartLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitPreview {
    pub split: OrderSplit,
    pub gateway_split: GatewaySplitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub customer_email: String,
    pub customer_name: String,
    #[serde(default)]
    pub delivery_address: Option<String>,
    pub payment_method: PaymentMethod,
    pub cart: Vec<CartLine>,
    /// If omitted, a reference is generated.
    #[serde(default)]
    pub order_reference: Option<OrderReference>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderResponse {
    pub order: Order,
    /// Set for prepaid orders: where to send the customer to pay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout: Option<TransactionInit>,
    /// Set for bank transfer on delivery: the account the customer pays into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedicated_account: Option<DedicatedAccount>,
}

/// Query parameters for the order listing. `status` may hold several comma-separated statuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
    pub payment_method: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: PaymentStatus,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub outcome: ReconcileOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub order_reference: OrderReference,
    pub rider_id: String,
    #[serde(default)]
    pub terminal_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectRequest {
    pub order_reference: OrderReference,
    pub rider_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRefRequest {
    pub order_reference: OrderReference,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "collection", rename_all = "snake_case")]
pub enum CollectionResponse {
    /// A terminal payment was taken. The order is confirmed once the terminal reports back.
    AwaitingTerminal { order_reference: OrderReference, confirm_in_ms: u128, already_scheduled: bool },
    /// The customer pays by transfer into their dedicated account.
    BankTransfer { order_reference: OrderReference, account_number: String, amount: MinorUnits },
}

#[derive(Debug, Clone, Serialize)]
pub struct VendorPayoutResult {
    pub vendor_id: VendorId,
    pub amount: MinorUnits,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<TransferReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VendorPayoutResult {
    pub fn paid(vendor_id: VendorId, amount: MinorUnits, receipt: TransferReceipt) -> Self {
        Self { vendor_id, amount, receipt: Some(receipt), error: None }
    }

    pub fn failed<S: Display>(vendor_id: VendorId, amount: MinorUnits, error: S) -> Self {
        Self { vendor_id, amount, receipt: None, error: Some(error.to_string()) }
    }

    pub fn is_paid(&self) -> bool {
        self.receipt.is_some()
    }
}
