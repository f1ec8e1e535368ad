use std::fmt::Display;

use mpg_common::MinorUnits;
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, PaymentMethod, PaymentStatus};

/// Criteria for [`crate::OrderStore::search_orders`]. All set fields must match. An empty filter matches every order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub status: Option<Vec<PaymentStatus>>,
    pub payment_method: Option<PaymentMethod>,
    pub customer_email: Option<String>,
    pub amount: Option<MinorUnits>,
    pub dedicated_account: Option<String>,
    pub rider_id: Option<String>,
}

impl OrderQueryFilter {
    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    /// Email matching is case-insensitive.
    pub fn with_customer_email(mut self, email: &str) -> Self {
        self.customer_email = Some(email.trim().to_string());
        self
    }

    pub fn with_amount(mut self, amount: MinorUnits) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_dedicated_account(mut self, account: &str) -> Self {
        self.dedicated_account = Some(account.to_string());
        self
    }

    pub fn with_rider_id(mut self, rider_id: &str) -> Self {
        self.rider_id = Some(rider_id.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() &&
            self.payment_method.is_none() &&
            self.customer_email.is_none() &&
            self.amount.is_none() &&
            self.dedicated_account.is_none() &&
            self.rider_id.is_none()
    }

    pub fn matches(&self, order: &Order) -> bool {
        if let Some(statuses) = &self.status {
            if !statuses.contains(&order.payment_status) {
                return false;
            }
        }
        if self.payment_method.is_some_and(|m| m != order.payment_method) {
            return false;
        }
        if self.customer_email.as_ref().is_some_and(|e| !e.eq_ignore_ascii_case(&order.customer_email)) {
            return false;
        }
        if self.amount.is_some_and(|a| a != order.amount) {
            return false;
        }
        if self.dedicated_account.is_some() && self.dedicated_account != order.dedicated_account {
            return false;
        }
        if self.rider_id.is_some() && self.rider_id != order.rider_id {
            return false;
        }
        true
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        if let Some(method) = &self.payment_method {
            write!(f, "payment_method: {method}. ")?;
        }
        if let Some(email) = &self.customer_email {
            write!(f, "email: {email}. ")?;
        }
        if let Some(amount) = &self.amount {
            write!(f, "amount: {amount}. ")?;
        }
        if let Some(account) = &self.dedicated_account {
            write!(f, "dedicated_account: {account}. ")?;
        }
        if let Some(rider) = &self.rider_id {
            write!(f, "rider_id: {rider}. ")?;
        }
        Ok(())
    }
}
