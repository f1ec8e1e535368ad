//! Request and response bodies for the gateway REST API. Amounts are always integer minor units.
use chrono::{DateTime, Utc};
use mpg_common::MinorUnits;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every gateway response is wrapped in this envelope. `status: false` means the call failed, even with a 2xx code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

/// Who absorbs the gateway's processing fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bearer {
    /// The main (platform) account
    Account,
    Subaccount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSubaccount {
    pub subaccount: String,
    pub share: MinorUnits,
}

/// A one-off flat split. Whatever the subaccounts don't receive stays with the main account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicSplit {
    #[serde(rename = "type")]
    pub split_type: String,
    pub bearer_type: Bearer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_subaccount: Option<String>,
    pub subaccounts: Vec<SplitSubaccount>,
}

impl DynamicSplit {
    pub fn flat(subaccounts: Vec<SplitSubaccount>) -> Self {
        Self { split_type: "flat".into(), bearer_type: Bearer::Account, bearer_subaccount: None, subaccounts }
    }

    pub fn with_bearer_subaccount(mut self, subaccount: &str) -> Self {
        self.bearer_type = Bearer::Subaccount;
        self.bearer_subaccount = Some(subaccount.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitializeTransactionRequest {
    pub email: String,
    pub amount: MinorUnits,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// Settles the whole transaction to one subaccount
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subaccount: Option<String>,
    /// The flat amount the main account keeps when `subaccount` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_charge: Option<MinorUnits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer: Option<Bearer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split: Option<DynamicSplit>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl InitializeTransactionRequest {
    pub fn new(email: &str, amount: MinorUnits, reference: &str) -> Self {
        Self { email: email.to_string(), amount, reference: reference.to_string(), ..Default::default() }
    }

    pub fn with_subaccount(mut self, subaccount: &str, transaction_charge: MinorUnits) -> Self {
        self.subaccount = Some(subaccount.to_string());
        self.transaction_charge = Some(transaction_charge);
        self.bearer = Some(Bearer::Account);
        self.split = None;
        self
    }

    pub fn with_split(mut self, split: DynamicSplit) -> Self {
        self.split = Some(split);
        self.subaccount = None;
        self.transaction_charge = None;
        self.bearer = None;
        self
    }

    pub fn with_callback_url(mut self, url: Option<String>) -> Self {
        self.callback_url = url;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInit {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRequest {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl CustomerRequest {
    /// Splits a display name into first and last names on the first space.
    pub fn new(email: &str, full_name: &str) -> Self {
        let mut parts = full_name.trim().splitn(2, ' ');
        let first_name = parts.next().filter(|s| !s.is_empty()).map(String::from);
        let last_name = parts.next().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        Self { email: email.to_string(), first_name, last_name, phone: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCustomer {
    pub id: i64,
    pub customer_code: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedicatedAccount {
    pub account_number: String,
    pub account_name: String,
    pub bank: Bank,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source: String,
    pub amount: MinorUnits,
    pub recipient: String,
    pub reason: String,
    pub reference: String,
}

impl TransferRequest {
    pub fn from_balance(amount: MinorUnits, recipient: &str, reason: &str, reference: &str) -> Self {
        Self {
            source: "balance".into(),
            amount,
            recipient: recipient.to_string(),
            reason: reason.to_string(),
            reference: reference.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_code: String,
    pub reference: String,
    pub status: String,
    pub amount: MinorUnits,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
}
