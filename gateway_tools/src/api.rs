use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use crate::{
    config::GatewayConfig,
    data_objects::{
        CustomerRequest,
        DedicatedAccount,
        Envelope,
        GatewayCustomer,
        InitializeTransactionRequest,
        TransactionInit,
        TransferReceipt,
        TransferRequest,
    },
    helpers::{error_message, unwrap_envelope},
    GatewayApiError,
};

#[derive(Clone)]
pub struct GatewayApi {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl GatewayApi {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.secret_key.reveal()))
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Sends a request and unwraps the gateway's `{status, message, data}` envelope.
    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, GatewayApiError> {
        let url = self.url(path);
        trace!("💳️ Sending REST query: {method} {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| GatewayApiError::RestRequestError(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            trace!("💳️ REST query successful. {status}");
            let envelope = response
                .json::<Envelope<T>>()
                .await
                .map_err(|e| GatewayApiError::JsonError(e.to_string()))?;
            unwrap_envelope(envelope, status.as_u16())
        } else {
            let body = response.text().await.map_err(|e| GatewayApiError::RestResponseError(e.to_string()))?;
            debug!("💳️ REST query failed. {status}. {body}");
            Err(GatewayApiError::QueryError { status: status.as_u16(), message: error_message(&body) })
        }
    }

    /// Starts a checkout. The customer completes payment at the returned authorization url.
    pub async fn initialize_transaction(
        &self,
        request: InitializeTransactionRequest,
    ) -> Result<TransactionInit, GatewayApiError> {
        let reference = request.reference.clone();
        let request = match (&request.callback_url, &self.config.callback_url) {
            (None, Some(url)) => request.with_callback_url(Some(url.clone())),
            _ => request,
        };
        debug!("💳️ Initializing transaction {reference} for {}", request.amount);
        let init = self
            .rest_query::<TransactionInit, _>(Method::POST, "/transaction/initialize", &[], Some(request))
            .await?;
        info!("💳️ Transaction {reference} initialized");
        Ok(init)
    }

    /// Fetches the current state of a transaction. The raw `data` object is returned so the caller can interpret it.
    pub async fn verify_transaction(&self, reference: &str) -> Result<Value, GatewayApiError> {
        let path = format!("/transaction/verify/{reference}");
        debug!("💳️ Verifying transaction {reference}");
        self.rest_query::<Value, ()>(Method::GET, &path, &[], None).await
    }

    pub async fn create_customer(&self, customer: CustomerRequest) -> Result<GatewayCustomer, GatewayApiError> {
        debug!("💳️ Creating customer {}", customer.email);
        let customer = self.rest_query::<GatewayCustomer, _>(Method::POST, "/customer", &[], Some(customer)).await?;
        info!("💳️ Customer {} created with code {}", customer.email, customer.customer_code);
        Ok(customer)
    }

    /// Issues a dedicated virtual account to an existing customer.
    pub async fn create_dedicated_account(&self, customer_code: &str) -> Result<DedicatedAccount, GatewayApiError> {
        let body = json!({ "customer": customer_code, "preferred_bank": self.config.preferred_bank });
        debug!("💳️ Requesting dedicated account for customer {customer_code}");
        let account =
            self.rest_query::<DedicatedAccount, _>(Method::POST, "/dedicated_account", &[], Some(body)).await?;
        info!("💳️ Dedicated account {} issued to {customer_code}", account.account_number);
        Ok(account)
    }

    /// Sends money from the platform balance to a transfer recipient. The gateway rejects repeated references, so a
    /// stable reference makes the call safe to repeat.
    pub async fn create_transfer(&self, transfer: TransferRequest) -> Result<TransferReceipt, GatewayApiError> {
        debug!("💳️ Transferring {} to {} ({})", transfer.amount, transfer.recipient, transfer.reference);
        let receipt = self.rest_query::<TransferReceipt, _>(Method::POST, "/transfer", &[], Some(transfer)).await?;
        info!("💳️ Transfer {} is {}", receipt.reference, receipt.status);
        Ok(receipt)
    }
}
