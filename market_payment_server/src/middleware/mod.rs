mod hmac;
mod whitelist;

pub use hmac::{HmacMiddlewareFactory, HmacMiddlewareService, GATEWAY_SIGNATURE_HEADER};
pub use whitelist::{WhitelistMiddlewareFactory, WhitelistMiddlewareService};
