use thiserror::Error;

use crate::db_types::VendorId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("Invalid cart: {0}")]
    InvalidCart(String),
    #[error("Vendor {0} is not in the vendor registry")]
    UnknownVendor(VendorId),
    #[error("The payout for vendor {0} would be negative")]
    NegativePayout(VendorId),
    #[error("Invalid fee schedule: {0}")]
    InvalidFeeSchedule(String),
    #[error("{0} cannot be represented in minor units")]
    AmountOutOfRange(String),
}

#[derive(Debug, Error)]
pub enum VendorRegistryError {
    #[error("Could not read the vendor registry: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Could not parse the vendor registry: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Vendor {0} has no gateway subaccount")]
    MissingSubaccount(VendorId),
}
