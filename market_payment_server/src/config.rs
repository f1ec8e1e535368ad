use std::{env, net::IpAddr, path::PathBuf, str::FromStr, time::Duration};

use gateway_tools::GatewayConfig;
use log::*;
use market_payment_engine::split::FeeSchedule;
use mpg_common::{helpers::parse_boolean_flag, MinorUnits};
use rust_decimal::Decimal;

use crate::errors::ServerError;

const DEFAULT_MPG_HOST: &str = "127.0.0.1";
const DEFAULT_MPG_PORT: u16 = 8460;
const DEFAULT_VENDOR_REGISTRY: &str = "data/vendors.json";
const DEFAULT_FEE_BEARER_ID: &str = "platform";
const DEFAULT_TERMINAL_CONFIRM_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `sqlite://...` selects the SQLite order store. When unset, orders are kept in memory.
    pub database_url: Option<String>,
    pub vendor_registry_path: PathBuf,
    pub fees: FeeSchedule,
    /// The account that bears fees and keeps the platform's share in multi-vendor splits
    pub fee_bearer_id: String,
    pub gateway: GatewayConfig,
    pub webhook: WebhookConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// How long a terminal collection waits before it is confirmed as paid
    pub terminal_confirm_delay: Duration,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub hmac_checks: bool,
    /// If supplied, webhook calls are only accepted from these addresses
    pub whitelist: Option<Vec<IpAddr>>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { hmac_checks: true, whitelist: None }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPG_HOST.to_string(),
            port: DEFAULT_MPG_PORT,
            database_url: None,
            vendor_registry_path: PathBuf::from(DEFAULT_VENDOR_REGISTRY),
            fees: FeeSchedule::default(),
            fee_bearer_id: DEFAULT_FEE_BEARER_ID.to_string(),
            gateway: GatewayConfig::default(),
            webhook: WebhookConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            terminal_confirm_delay: DEFAULT_TERMINAL_CONFIRM_DELAY,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MPG_HOST").ok().unwrap_or_else(|| DEFAULT_MPG_HOST.into());
        let port = env::var("MPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MPG_PORT. {e} Using the default, {DEFAULT_MPG_PORT}, instead."
                    );
                    DEFAULT_MPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MPG_PORT);
        let database_url = env::var("MPG_DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
        if database_url.is_none() {
            warn!("🪛️ MPG_DATABASE_URL is not set. Orders will be kept in memory and lost on restart.");
        }
        let vendor_registry_path =
            PathBuf::from(env::var("MPG_VENDOR_REGISTRY").unwrap_or_else(|_| DEFAULT_VENDOR_REGISTRY.into()));
        let fees = configure_fees().unwrap_or_else(|e| {
            error!("🪛️ {e} Reverting to the default fee schedule.");
            FeeSchedule::default()
        });
        let fee_bearer_id = env::var("MPG_FEE_BEARER_ID").unwrap_or_else(|_| DEFAULT_FEE_BEARER_ID.into());
        let gateway = GatewayConfig::new_from_env_or_default();
        let webhook = WebhookConfig::from_env_or_default();
        let use_x_forwarded_for = parse_boolean_flag(env::var("MPG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("MPG_USE_FORWARDED").ok(), false);
        let terminal_confirm_delay = env::var("MPG_TERMINAL_CONFIRM_DELAY")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for MPG_TERMINAL_CONFIRM_DELAY. {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_TERMINAL_CONFIRM_DELAY);
        Self {
            host,
            port,
            database_url,
            vendor_registry_path,
            fees,
            fee_bearer_id,
            gateway,
            webhook,
            use_x_forwarded_for,
            use_forwarded,
            terminal_confirm_delay,
        }
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig { use_x_forwarded_for: self.use_x_forwarded_for, use_forwarded: self.use_forwarded }
    }
}

impl WebhookConfig {
    pub fn from_env_or_default() -> Self {
        let hmac_checks = parse_boolean_flag(env::var("MPG_WEBHOOK_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Webhook HMAC checks are DISABLED. Anyone can mark orders as paid. Never do this in production.");
        }
        let whitelist = env::var("MPG_GATEWAY_IP_WHITELIST").ok().and_then(|s| parse_whitelist(&s));
        match &whitelist {
            Some(whitelist) if whitelist.is_empty() => {
                warn!(
                    "🚨️ The gateway IP whitelist was configured, but is empty. The server will run, but won't accept \
                     any webhook calls."
                );
            },
            None => {
                info!("🪛️ No gateway IP whitelist is set. Only HMAC validation will be used.");
            },
            Some(v) => {
                let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                info!("🪛️ Gateway IP whitelist: {addrs}");
            },
        }
        Self { hmac_checks, whitelist }
    }
}

/// Parses a comma-separated list of IP addresses. "none", "false" and "0" explicitly disable the whitelist.
pub fn parse_whitelist(s: &str) -> Option<Vec<IpAddr>> {
    if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) {
        info!("🪛️ Gateway IP whitelist is disabled.");
        return None;
    }
    let ip_addrs = mpg_common::helpers::split_list(s)
        .into_iter()
        .filter_map(|s| {
            IpAddr::from_str(&s).map_err(|e| warn!("🪛️ Ignoring invalid IP address ({s}) in the whitelist: {e}")).ok()
        })
        .collect();
    Some(ip_addrs)
}

fn configure_fees() -> Result<FeeSchedule, ServerError> {
    let defaults = FeeSchedule::default();
    let rate = |name: &str, default: Decimal| -> Result<Decimal, ServerError> {
        match env::var(name) {
            Ok(s) => Decimal::from_str(s.trim())
                .map_err(|e| ServerError::ConfigurationError(format!("{name} is not a valid decimal. {e}."))),
            Err(_) => Ok(default),
        }
    };
    let processing_fee_rate = rate("MPG_PROCESSING_FEE_RATE", defaults.processing_fee_rate())?;
    let platform_fee_rate = rate("MPG_PLATFORM_FEE_RATE", defaults.platform_fee_rate())?;
    let fixed_fee = match env::var("MPG_PROCESSING_FIXED_FEE") {
        Ok(s) => s.trim().parse::<i64>().map(MinorUnits::from).map_err(|e| {
            ServerError::ConfigurationError(format!("MPG_PROCESSING_FIXED_FEE is not a whole number. {e}."))
        })?,
        Err(_) => defaults.processing_fixed_fee(),
    };
    FeeSchedule::new(processing_fee_rate, fixed_fee, platform_fee_rate)
        .map_err(|e| ServerError::ConfigurationError(e.to_string()))
}

//-------------------------------------------------  ProxyConfig  ------------------------------------------------------
/// The subset of the configuration request handlers need to work out who is calling. No secrets.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProxyConfig {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}
