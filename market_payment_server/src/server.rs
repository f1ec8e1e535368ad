use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use gateway_tools::GatewayApi;
use log::*;
use market_payment_engine::{
    events::EventProducers,
    split::{PayoutSplitter, SplitPaymentConfigurator, VendorRegistry},
    MemoryDatabase,
    OrderFlowApi,
    OrderReconciler,
    OrderStore,
};

use crate::{
    auto_confirm_worker::ConfirmationScheduler,
    config::ServerConfig,
    errors::ServerError,
    integrations::{gateway::PaymentGateway, hooks::create_logging_handlers},
    middleware::{HmacMiddlewareFactory, WhitelistMiddlewareFactory, GATEWAY_SIGNATURE_HEADER},
    routes::{
        cancel_collection,
        health,
        split_preview,
        CollectPaymentRoute,
        CompleteDeliveryRoute,
        DispatchRiderRoute,
        GatewayWebhookRoute,
        OrderByReferenceRoute,
        OrdersRoute,
        PayVendorsRoute,
        PlaceOrderRoute,
        UpdateOrderStatusRoute,
        VerifyPaymentRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let registry = VendorRegistry::from_file(&config.vendor_registry_path).map_err(|e| {
        ServerError::InitializeError(format!(
            "Could not load the vendor registry from {}. {e}",
            config.vendor_registry_path.display()
        ))
    })?;
    info!("🚀️ Loaded {} vendors from {}", registry.len(), config.vendor_registry_path.display());
    let gateway = GatewayApi::new(config.gateway.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = create_logging_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let registry = Arc::new(registry);
    match config.database_url.clone() {
        #[cfg(feature = "sqlite")]
        Some(url) => {
            let db = market_payment_engine::SqliteDatabase::open(&url, 25)
                .await
                .map_err(|e| ServerError::InitializeError(e.to_string()))?;
            info!("🚀️ Using the SQLite order store at {url}");
            let srv = create_server_instance(config, db, gateway, registry, producers)?;
            srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
        },
        #[cfg(not(feature = "sqlite"))]
        Some(url) => Err(ServerError::ConfigurationError(format!(
            "A database url ({url}) was given, but this server was built without database support"
        ))),
        None => {
            warn!("🚀️ No database url is configured. Orders are kept in memory and will be lost on shutdown.");
            let srv = create_server_instance(config, MemoryDatabase::new(), gateway, registry, producers)?;
            srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
        },
    }
}

pub fn create_server_instance<B, G>(
    config: ServerConfig,
    db: B,
    gateway: G,
    registry: Arc<VendorRegistry>,
    producers: EventProducers,
) -> Result<Server, ServerError>
where
    B: OrderStore + Send + 'static,
    G: PaymentGateway + Send + 'static,
{
    let scheduler = ConfirmationScheduler::new(config.terminal_confirm_delay);
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let reconciler = OrderReconciler::new(db.clone(), producers.clone());
        let splitter = PayoutSplitter::new(config.fees, Arc::clone(&registry));
        let configurator = SplitPaymentConfigurator::new(Arc::clone(&registry), &config.fee_bearer_id);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mpg::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(reconciler))
            .app_data(web::Data::new(splitter))
            .app_data(web::Data::new(configurator))
            .app_data(web::Data::new(gateway.clone()))
            .app_data(web::Data::new(scheduler.clone()))
            .service(health)
            .configure(|cfg| configure_gateway_routes::<B>(cfg, &config))
            .service(web::scope("/api").configure(configure_api_routes::<B, G>))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// Registers the gateway webhook under `/gateway`. Calls are checked against the source address whitelist first, and
/// then against the webhook signature.
pub fn configure_gateway_routes<B>(cfg: &mut web::ServiceConfig, config: &ServerConfig)
where B: OrderStore + 'static {
    let scope = web::scope("/gateway")
        .wrap(HmacMiddlewareFactory::new(
            GATEWAY_SIGNATURE_HEADER,
            config.gateway.secret_key.clone(),
            config.webhook.hmac_checks,
        ))
        .wrap(WhitelistMiddlewareFactory::new(config.webhook.whitelist.clone(), config.proxy_config()))
        .service(GatewayWebhookRoute::<B>::new());
    cfg.service(scope);
}

/// Registers every route under `/api`.
pub fn configure_api_routes<B, G>(cfg: &mut web::ServiceConfig)
where
    B: OrderStore + 'static,
    G: PaymentGateway + 'static,
{
    cfg.service(split_preview)
        .service(PlaceOrderRoute::<B, G>::new())
        .service(OrdersRoute::<B>::new())
        .service(UpdateOrderStatusRoute::<B>::new())
        .service(OrderByReferenceRoute::<B>::new())
        .service(VerifyPaymentRoute::<B, G>::new())
        .service(DispatchRiderRoute::<B>::new())
        .service(CollectPaymentRoute::<B>::new())
        .service(cancel_collection)
        .service(CompleteDeliveryRoute::<B>::new())
        .service(PayVendorsRoute::<B, G>::new());
}
