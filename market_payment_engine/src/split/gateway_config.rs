use std::sync::Arc;

use log::*;
use mpg_common::MinorUnits;
use serde::{Deserialize, Serialize};

use crate::split::{round_to_minor_units, OrderSplit, SplitError, VendorRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitShare {
    pub subaccount_id: String,
    pub amount_minor_units: MinorUnits,
}

/// The fee-bearing split configuration handed to the payment gateway when a transaction is initialised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewaySplitConfig {
    /// The whole payment settles to one vendor subaccount, less the platform's commission.
    SingleVendor { subaccount_id: String, platform_fee_minor_units: MinorUnits },
    /// Every vendor receives its net payout. The fee bearer's share absorbs the platform revenue, the processing fee
    /// and any rounding residue, so that the shares always sum to the order total.
    MultiVendor { shares: Vec<SplitShare>, fee_bearer_id: String },
}

impl GatewaySplitConfig {
    pub fn total(&self) -> Option<MinorUnits> {
        match self {
            GatewaySplitConfig::SingleVendor { .. } => None,
            GatewaySplitConfig::MultiVendor { shares, .. } => Some(shares.iter().map(|s| s.amount_minor_units).sum()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SplitPaymentConfigurator {
    registry: Arc<VendorRegistry>,
    fee_bearer_id: String,
}

impl SplitPaymentConfigurator {
    pub fn new(registry: Arc<VendorRegistry>, fee_bearer_id: &str) -> Self {
        Self { registry, fee_bearer_id: fee_bearer_id.to_string() }
    }

    pub fn fee_bearer_id(&self) -> &str {
        &self.fee_bearer_id
    }

    /// Builds the gateway configuration for an order split. All amounts are rounded to whole minor units here, and
    /// nowhere earlier.
    pub fn build_gateway_split_config(&self, split: &OrderSplit) -> Result<GatewaySplitConfig, SplitError> {
        let subaccount = |payout: &crate::split::VendorPayout| {
            self.registry
                .get(&payout.vendor_id)
                .map(|v| v.subaccount_id.clone())
                .ok_or_else(|| SplitError::UnknownVendor(payout.vendor_id.clone()))
        };
        match split.vendor_payouts.as_slice() {
            [] => Err(SplitError::InvalidCart("The split has no vendor payouts".into())),
            [payout] => {
                if payout.net_payout.is_sign_negative() {
                    return Err(SplitError::NegativePayout(payout.vendor_id.clone()));
                }
                let config = GatewaySplitConfig::SingleVendor {
                    subaccount_id: subaccount(payout)?,
                    platform_fee_minor_units: round_to_minor_units(split.platform_revenue)?,
                };
                debug!("🧮️ Single vendor split config for {}: {config:?}", payout.vendor_id);
                Ok(config)
            },
            payouts => {
                let mut shares = Vec::with_capacity(payouts.len() + 1);
                for payout in payouts {
                    let amount = payout.net_payout_minor_units()?;
                    if amount.is_negative() {
                        return Err(SplitError::NegativePayout(payout.vendor_id.clone()));
                    }
                    shares.push(SplitShare { subaccount_id: subaccount(payout)?, amount_minor_units: amount });
                }
                let vendor_total: MinorUnits = shares.iter().map(|s| s.amount_minor_units).sum();
                let bearer_amount = split.order_total - vendor_total;
                if bearer_amount.is_negative() {
                    return Err(SplitError::AmountOutOfRange(format!(
                        "Vendor shares ({vendor_total}) exceed the order total ({})",
                        split.order_total
                    )));
                }
                shares.push(SplitShare {
                    subaccount_id: self.fee_bearer_id.clone(),
                    amount_minor_units: bearer_amount,
                });
                trace!("🧮️ Multi-vendor split shares: {shares:?}");
                Ok(GatewaySplitConfig::MultiVendor { shares, fee_bearer_id: self.fee_bearer_id.clone() })
            },
        }
    }
}
