//! Rejects requests whose remote address is not on a whitelist. Used to restrict webhook calls to the gateway's
//! published IP addresses. With no whitelist configured, every caller is let through.

use std::{
    future::{ready, Ready},
    net::IpAddr,
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorForbidden,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{info, trace, warn};

use crate::{config::ProxyConfig, helpers::get_remote_ip};

pub struct WhitelistMiddlewareFactory {
    whitelist: Option<Rc<Vec<IpAddr>>>,
    proxy: ProxyConfig,
}

impl WhitelistMiddlewareFactory {
    pub fn new(whitelist: Option<Vec<IpAddr>>, proxy: ProxyConfig) -> Self {
        Self { whitelist: whitelist.map(Rc::new), proxy }
    }
}

impl<S, B> Transform<S, ServiceRequest> for WhitelistMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = WhitelistMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(WhitelistMiddlewareService {
            whitelist: self.whitelist.clone(),
            proxy: self.proxy,
            service: Rc::new(service),
        }))
    }
}

pub struct WhitelistMiddlewareService<S> {
    whitelist: Option<Rc<Vec<IpAddr>>>,
    proxy: ProxyConfig,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for WhitelistMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let Some(whitelist) = self.whitelist.clone() else {
            trace!("🔐️ No whitelist configured. Allowing request.");
            return Box::pin(service.call(req));
        };
        let peer_ip = get_remote_ip(req.request(), self.proxy.use_x_forwarded_for, self.proxy.use_forwarded);
        Box::pin(async move {
            match peer_ip {
                Some(ip) if whitelist.contains(&ip) => {
                    info!("🔐️ Gateway call from {ip}");
                    service.call(req).await
                },
                Some(ip) => {
                    warn!("🔐️ {ip} is not on the gateway whitelist. Denying access.");
                    Err(ErrorForbidden("Forbidden peer."))
                },
                None => {
                    warn!("🔐️ No IP address found for the remote peer. Denying access.");
                    Err(ErrorForbidden("Forbidden peer."))
                },
            }
        })
    }
}
