//! Webhook signature middleware.
//!
//! The payment gateway signs every webhook with `hex(HMAC-SHA512(secret_key, raw_body))` and sends the signature in
//! the `x-paystack-signature` header. Wrap the webhook routes in [`HmacMiddlewareFactory`] to reject calls that were
//! not signed with our gateway secret key.
//!
//! The body is buffered to check it, and then handed back to the inner service untouched.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorForbidden},
    http::header::HeaderMap,
    web,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use mpg_common::Secret;

use crate::helpers::verify_hmac;

pub const GATEWAY_SIGNATURE_HEADER: &str = "x-paystack-signature";

/// The signature rules shared by every worker's copy of the middleware.
struct SignatureCheck {
    header: String,
    key: Secret<String>,
    enabled: bool,
}

impl SignatureCheck {
    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), Error> {
        let signature = headers.get(self.header.as_str()).and_then(|v| v.to_str().ok()).ok_or_else(|| {
            warn!("🔐️ Webhook call has no {} header. Denying access.", self.header);
            ErrorForbidden("No HMAC signature found.")
        })?;
        // An unset key would otherwise accept anything signed with the empty string
        if self.key.is_empty() {
            warn!("🔐️ No gateway secret key is configured, so no webhook signature can be trusted. Denying access.");
            return Err(ErrorForbidden("Invalid HMAC signature."));
        }
        if verify_hmac(self.key.reveal(), body, signature) {
            trace!("🔐️ Webhook signature ✅️");
            Ok(())
        } else {
            warn!("🔐️ Webhook signature does not match the body. Denying access.");
            Err(ErrorForbidden("Invalid HMAC signature."))
        }
    }
}

pub struct HmacMiddlewareFactory {
    check: Rc<SignatureCheck>,
}

impl HmacMiddlewareFactory {
    /// When `enabled` is false every call is let through unchecked.
    pub fn new(header: &str, key: Secret<String>, enabled: bool) -> Self {
        Self { check: Rc::new(SignatureCheck { header: header.to_lowercase(), key, enabled }) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService { check: Rc::clone(&self.check), service: Rc::new(service) }))
    }
}

pub struct HmacMiddlewareService<S> {
    check: Rc<SignatureCheck>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let check = Rc::clone(&self.check);
        Box::pin(async move {
            if !check.enabled {
                trace!("🔐️ Webhook signature checks are disabled");
                return service.call(req).await;
            }
            let body = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Could not buffer the webhook body. {e}");
                ErrorBadRequest("Failed to extract request data.")
            })?;
            check.verify(req.headers(), &body)?;
            req.set_payload(replay(body));
            service.call(req).await
        })
    }
}

/// Puts a buffered body back so that the handler can extract it again.
fn replay(body: web::Bytes) -> Payload {
    let (_, mut payload) = h1::Payload::create(true);
    payload.unread_data(body);
    Payload::from(payload)
}
