use std::{collections::HashMap, sync::Arc};

use log::*;
use mpg_common::MinorUnits;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::VendorId,
    split::{SplitError, VendorRegistry},
};

/// One line of a cart: `quantity` units of a product sold by `vendor_id` at `unit_price` each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub vendor_id: VendorId,
    pub unit_price: MinorUnits,
    pub quantity: i64,
}

impl CartLine {
    pub fn new<V: Into<VendorId>>(vendor_id: V, unit_price: i64, quantity: i64) -> Self {
        Self { vendor_id: vendor_id.into(), unit_price: MinorUnits::from(unit_price), quantity }
    }

    fn subtotal(&self) -> Result<MinorUnits, SplitError> {
        if self.quantity <= 0 {
            return Err(SplitError::InvalidCart(format!(
                "Quantity must be positive, but {} was ordered from {}",
                self.quantity, self.vendor_id
            )));
        }
        if self.unit_price.is_negative() {
            return Err(SplitError::InvalidCart(format!(
                "A line from {} has a negative unit price of {}",
                self.vendor_id, self.unit_price
            )));
        }
        self.unit_price
            .checked_mul(self.quantity)
            .ok_or_else(|| {
                SplitError::InvalidCart(format!("The subtotal for a line from {} overflows", self.vendor_id))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorPayout {
    pub vendor_id: VendorId,
    pub vendor_name: String,
    pub gross_sales: MinorUnits,
    pub platform_fee: Decimal,
    pub processing_fee_share: Decimal,
    /// `gross_sales - platform_fee - processing_fee_share`
    pub net_payout: Decimal,
    pub lines: Vec<CartLine>,
}

impl VendorPayout {
    pub fn net_payout_minor_units(&self) -> Result<MinorUnits, SplitError> {
        round_to_minor_units(self.net_payout)
    }
}

/// The fee breakdown for a single order. Computing the split for the same cart always yields an identical value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSplit {
    pub order_total: MinorUnits,
    pub platform_revenue: Decimal,
    pub total_processing_fee: Decimal,
    /// In the order in which each vendor first appears in the cart.
    pub vendor_payouts: Vec<VendorPayout>,
}

impl OrderSplit {
    pub fn is_single_vendor(&self) -> bool {
        self.vendor_payouts.len() == 1
    }

    pub fn total_net_payout(&self) -> Decimal {
        self.vendor_payouts.iter().map(|p| p.net_payout).sum()
    }
}

/// Rounds a fee amount to the nearest whole minor unit, with halves rounded away from zero.
pub fn round_to_minor_units(value: Decimal) -> Result<MinorUnits, SplitError> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .map(MinorUnits::from)
        .ok_or_else(|| SplitError::AmountOutOfRange(value.to_string()))
}

//--------------------------------------      FeeSchedule      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    /// The gateway's percentage fee on the order total, as a fraction.
    processing_fee_rate: Decimal,
    /// The gateway's flat per-transaction fee. Independent of the number of vendors.
    processing_fixed_fee: MinorUnits,
    /// The platform's commission on each vendor's gross sales, as a fraction.
    platform_fee_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            processing_fee_rate: Decimal::new(15, 3),
            processing_fixed_fee: MinorUnits::from(100),
            platform_fee_rate: Decimal::new(10, 2),
        }
    }
}

impl FeeSchedule {
    pub fn new(
        processing_fee_rate: Decimal,
        processing_fixed_fee: MinorUnits,
        platform_fee_rate: Decimal,
    ) -> Result<Self, SplitError> {
        let is_fraction = |r: Decimal| r >= Decimal::ZERO && r < Decimal::ONE;
        if !is_fraction(processing_fee_rate) {
            return Err(SplitError::InvalidFeeSchedule(format!(
                "The processing fee rate must be in [0, 1), not {processing_fee_rate}"
            )));
        }
        if !is_fraction(platform_fee_rate) {
            return Err(SplitError::InvalidFeeSchedule(format!(
                "The platform fee rate must be in [0, 1), not {platform_fee_rate}"
            )));
        }
        if processing_fixed_fee.is_negative() {
            return Err(SplitError::InvalidFeeSchedule(format!(
                "The fixed processing fee cannot be negative ({processing_fixed_fee})"
            )));
        }
        Ok(Self { processing_fee_rate, processing_fixed_fee, platform_fee_rate })
    }

    pub fn processing_fee_rate(&self) -> Decimal {
        self.processing_fee_rate
    }

    pub fn processing_fixed_fee(&self) -> MinorUnits {
        self.processing_fixed_fee
    }

    pub fn platform_fee_rate(&self) -> Decimal {
        self.platform_fee_rate
    }

    pub fn processing_fee(&self, order_total: MinorUnits) -> Decimal {
        Decimal::from(order_total.value()) * self.processing_fee_rate + Decimal::from(self.processing_fixed_fee.value())
    }

    pub fn platform_fee(&self, gross_sales: MinorUnits) -> Decimal {
        Decimal::from(gross_sales.value()) * self.platform_fee_rate
    }
}

//--------------------------------------     PayoutSplitter    ---------------------------------------------------------
/// Splits a cart's value across its vendors and the platform. This is a pure calculation.
#[derive(Debug, Clone)]
pub struct PayoutSplitter {
    fees: FeeSchedule,
    registry: Arc<VendorRegistry>,
}

impl PayoutSplitter {
    pub fn new(fees: FeeSchedule, registry: Arc<VendorRegistry>) -> Self {
        Self { fees, registry }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn registry(&self) -> &VendorRegistry {
        &self.registry
    }

    /// Calculates the payout breakdown for the given cart.
    ///
    /// Fails with [`SplitError::InvalidCart`] if the cart is empty, totals to zero, or contains a line with a
    /// non-positive quantity or negative price. Fails with [`SplitError::UnknownVendor`] if any line refers to a vendor
    /// that is not in the registry. Nothing is returned on failure.
    pub fn calculate_split(&self, lines: &[CartLine]) -> Result<OrderSplit, SplitError> {
        if lines.is_empty() {
            return Err(SplitError::InvalidCart("The cart is empty".into()));
        }
        // (vendor, gross, lines), in first-seen order
        let mut groups: Vec<(VendorId, MinorUnits, Vec<CartLine>)> = Vec::new();
        let mut index = HashMap::<&VendorId, usize>::new();
        for line in lines {
            if !self.registry.contains(&line.vendor_id) {
                return Err(SplitError::UnknownVendor(line.vendor_id.clone()));
            }
            let subtotal = line.subtotal()?;
            let i = *index.entry(&line.vendor_id).or_insert_with(|| {
                groups.push((line.vendor_id.clone(), MinorUnits::default(), Vec::new()));
                groups.len() - 1
            });
            let group = &mut groups[i];
            group.1 = group.1.checked_add(subtotal).ok_or_else(|| overflow(&line.vendor_id))?;
            group.2.push(line.clone());
        }
        let order_total = groups
            .iter()
            .try_fold(MinorUnits::default(), |acc, (_, gross, _)| acc.checked_add(*gross))
            .ok_or_else(|| SplitError::InvalidCart("The order total overflows".into()))?;
        if order_total.is_zero() {
            return Err(SplitError::InvalidCart("The order total is zero".into()));
        }
        let total_processing_fee = self.fees.processing_fee(order_total);
        let total = Decimal::from(order_total.value());
        let vendor_payouts = groups
            .into_iter()
            .map(|(vendor_id, gross_sales, lines)| {
                let vendor_name = self.registry.get(&vendor_id).map(|v| v.name.clone()).unwrap_or_default();
                let gross = Decimal::from(gross_sales.value());
                let platform_fee = self.fees.platform_fee(gross_sales);
                let processing_fee_share = gross * total_processing_fee / total;
                let net_payout = gross - platform_fee - processing_fee_share;
                VendorPayout {
                    vendor_id,
                    vendor_name,
                    gross_sales,
                    platform_fee,
                    processing_fee_share,
                    net_payout,
                    lines,
                }
            })
            .collect::<Vec<_>>();
        let platform_revenue = vendor_payouts.iter().map(|p| p.platform_fee).sum();
        debug!(
            "🧮️ Split {order_total} across {} vendors. Processing fee: {total_processing_fee}, platform revenue: \
             {platform_revenue}",
            vendor_payouts.len()
        );
        Ok(OrderSplit { order_total, platform_revenue, total_processing_fee, vendor_payouts })
    }
}

fn overflow(vendor: &VendorId) -> SplitError {
    SplitError::InvalidCart(format!("The gross sales for {vendor} overflow"))
}
