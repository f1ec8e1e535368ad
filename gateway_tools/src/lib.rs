//! A thin REST client for the payment gateway.
//!
//! Only the calls the market server needs are covered: starting a checkout (with its split configuration), verifying a
//! transaction, issuing dedicated virtual accounts to customers and transferring vendor payouts. Retrying is left to
//! the caller.
mod api;
mod config;
mod error;

pub mod data_objects;
pub mod helpers;

pub use api::GatewayApi;
pub use config::GatewayConfig;
pub use data_objects::{
    Bearer,
    CustomerRequest,
    DedicatedAccount,
    DynamicSplit,
    Envelope,
    GatewayCustomer,
    InitializeTransactionRequest,
    SplitSubaccount,
    TransactionInit,
    TransferReceipt,
    TransferRequest,
};
pub use error::GatewayApiError;
