use log::*;
use mpg_common::Secret;

pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.paystack.co";
pub const DEFAULT_PREFERRED_BANK: &str = "wema-bank";

#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Used both as the bearer token for REST calls and as the webhook HMAC key
    pub secret_key: Secret<String>,
    /// Where the customer is sent after completing checkout
    pub callback_url: Option<String>,
    /// The bank slug requested when issuing dedicated virtual accounts
    pub preferred_bank: String,
}

impl GatewayConfig {
    pub fn new(base_url: &str, secret_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: Secret::new(secret_key.to_string()),
            callback_url: None,
            preferred_bank: DEFAULT_PREFERRED_BANK.to_string(),
        }
    }

    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("MPG_GATEWAY_BASE_URL").unwrap_or_else(|_| {
            info!("💳️ MPG_GATEWAY_BASE_URL not set, using {DEFAULT_GATEWAY_BASE_URL}");
            DEFAULT_GATEWAY_BASE_URL.to_string()
        });
        let secret_key = std::env::var("MPG_GATEWAY_SECRET_KEY").unwrap_or_else(|_| {
            warn!("💳️ MPG_GATEWAY_SECRET_KEY not set. Gateway calls and webhook signature checks will fail.");
            String::default()
        });
        let callback_url = std::env::var("MPG_GATEWAY_CALLBACK_URL").ok().filter(|s| !s.trim().is_empty());
        let preferred_bank =
            std::env::var("MPG_GATEWAY_PREFERRED_BANK").unwrap_or_else(|_| DEFAULT_PREFERRED_BANK.to_string());
        Self { callback_url, preferred_bank, ..Self::new(&base_url, &secret_key) }
    }
}
