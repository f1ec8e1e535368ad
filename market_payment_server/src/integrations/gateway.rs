//! The payment gateway as seen by the HTTP boundary.
//!
//! Route handlers only talk to the gateway through [`PaymentGateway`], so that the REST client can be swapped for a
//! mock in tests. [`GatewayApi`] is the production implementation.
use gateway_tools::{
    CustomerRequest,
    DedicatedAccount,
    DynamicSplit,
    GatewayApi,
    GatewayApiError,
    InitializeTransactionRequest,
    SplitSubaccount,
    TransactionInit,
    TransferReceipt,
    TransferRequest,
};
use log::*;
use market_payment_engine::{
    db_types::Order,
    split::{GatewaySplitConfig, VendorPayout},
};
use mpg_common::MinorUnits;
use serde_json::{json, Value};

#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone {
    /// Starts a card checkout for a prepaid order. The gateway settles the payment according to `split`.
    async fn initialize_checkout(
        &self,
        order: &Order,
        split: &GatewaySplitConfig,
    ) -> Result<TransactionInit, GatewayApiError>;

    /// Fetches the gateway's view of a transaction. Returns the `data` object of the verification response.
    async fn verify_payment(&self, reference: &str) -> Result<Value, GatewayApiError>;

    /// Creates a customer profile and a dedicated virtual account the customer can pay into by bank transfer.
    async fn issue_dedicated_account(&self, email: &str, full_name: &str) -> Result<DedicatedAccount, GatewayApiError>;

    /// Transfers a vendor's payout from the platform balance to the vendor's transfer recipient.
    async fn pay_vendor(&self, transfer: TransferRequest) -> Result<TransferReceipt, GatewayApiError>;
}

impl PaymentGateway for GatewayApi {
    async fn initialize_checkout(
        &self,
        order: &Order,
        split: &GatewaySplitConfig,
    ) -> Result<TransactionInit, GatewayApiError> {
        let request = checkout_request(order, split);
        debug!("💳️ Initializing checkout for order {}", order.order_reference);
        self.initialize_transaction(request).await
    }

    async fn verify_payment(&self, reference: &str) -> Result<Value, GatewayApiError> {
        self.verify_transaction(reference).await
    }

    async fn issue_dedicated_account(&self, email: &str, full_name: &str) -> Result<DedicatedAccount, GatewayApiError> {
        let customer = self.create_customer(CustomerRequest::new(email, full_name)).await?;
        debug!("💳️ Created gateway customer {} for {email}", customer.customer_code);
        self.create_dedicated_account(&customer.customer_code).await
    }

    async fn pay_vendor(&self, transfer: TransferRequest) -> Result<TransferReceipt, GatewayApiError> {
        self.create_transfer(transfer).await
    }
}

/// Builds the transaction initialization request for `order`.
///
/// A single vendor receives the payment through its subaccount, with the platform fee taken as a flat transaction
/// charge. Multiple vendors receive their net payouts through a flat dynamic split, and the main account keeps the
/// remainder (platform revenue and processing fees). If the fee bearer is a subaccount instead of the platform's main
/// account, it is named as the bearer subaccount and receives the remainder itself.
pub fn checkout_request(order: &Order, split: &GatewaySplitConfig) -> InitializeTransactionRequest {
    let request = InitializeTransactionRequest::new(&order.customer_email, order.amount, order.order_reference.as_str())
        .with_metadata(json!({
            "order_reference": order.order_reference,
            "customer_name": order.customer_name,
        }));
    match split {
        GatewaySplitConfig::SingleVendor { subaccount_id, platform_fee_minor_units } => {
            request.with_subaccount(subaccount_id, *platform_fee_minor_units)
        },
        GatewaySplitConfig::MultiVendor { shares, fee_bearer_id } => {
            // The fee bearer's share is always the last one
            let (vendor_shares, bearer_share) = shares.split_at(shares.len().saturating_sub(1));
            let mut subaccounts = vendor_shares
                .iter()
                .map(|s| SplitSubaccount { subaccount: s.subaccount_id.clone(), share: s.amount_minor_units })
                .collect::<Vec<_>>();
            if is_main_account(fee_bearer_id) {
                return request.with_split(DynamicSplit::flat(subaccounts));
            }
            for share in bearer_share {
                match subaccounts.iter_mut().find(|s| s.subaccount == share.subaccount_id) {
                    Some(existing) => existing.share += share.amount_minor_units,
                    None => subaccounts.push(SplitSubaccount {
                        subaccount: share.subaccount_id.clone(),
                        share: share.amount_minor_units,
                    }),
                }
            }
            request.with_split(DynamicSplit::flat(subaccounts).with_bearer_subaccount(fee_bearer_id))
        },
    }
}

/// The transfer that pays out `payout` to `recipient_code`. The reference is derived from the order and the vendor,
/// so the gateway rejects a second transfer for the same payout.
pub fn payout_transfer(
    order: &Order,
    payout: &VendorPayout,
    recipient_code: &str,
    amount: MinorUnits,
) -> TransferRequest {
    let reference = format!("{}-{}", order.order_reference, payout.vendor_id);
    let reason = format!("Payout for order {}", order.order_reference);
    TransferRequest::from_balance(amount, recipient_code, &reason, &reference)
}

fn is_main_account(fee_bearer_id: &str) -> bool {
    fee_bearer_id.is_empty() || fee_bearer_id.eq_ignore_ascii_case("platform")
}
