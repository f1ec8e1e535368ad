//! Payout splitting.
//!
//! [`PayoutSplitter`] turns a cart into an [`OrderSplit`]: gross sales per vendor, the platform's commission, and the
//! gateway's blended processing fee allocated proportionally across vendors. [`SplitPaymentConfigurator`] turns that
//! breakdown into the integer, fee-bearing configuration that is handed to the payment gateway.
//!
//! Fee math is carried out in [`Decimal`](rust_decimal::Decimal) and is only rounded to whole minor units when the
//! gateway configuration is built.
mod errors;
mod gateway_config;
mod splitter;
mod vendors;

pub use errors::{SplitError, VendorRegistryError};
pub use gateway_config::{GatewaySplitConfig, SplitPaymentConfigurator, SplitShare};
pub use splitter::{round_to_minor_units, CartLine, FeeSchedule, OrderSplit, PayoutSplitter, VendorPayout};
pub use vendors::{BankDetails, Vendor, VendorRegistry};
