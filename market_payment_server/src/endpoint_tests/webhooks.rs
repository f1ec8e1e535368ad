use std::net::{IpAddr, SocketAddr};

use actix_web::{http::StatusCode, test, test::TestRequest, App};
use market_payment_engine::{
    db_types::{NewOrder, OrderReference, PaymentMethod, PaymentStatus},
    OrderStore,
};
use mpg_common::{MinorUnits, Secret};
use serde_json::json;

use super::{
    helpers::{call, json, TestContext},
    mocks::MockGateway,
};
use crate::{config::ServerConfig, helpers::calculate_hmac, middleware::GATEWAY_SIGNATURE_HEADER};

const SECRET: &str = "sk_test_webhooks";

fn charge_success(reference: &str) -> String {
    json!({
        "event": "charge.success",
        "data": {
            "reference": format!("T-{reference}"),
            "amount": 4800,
            "channel": "card",
            "status": "success",
            "customer": { "email": "ada@example.com" },
            "metadata": { "order_reference": reference }
        }
    })
    .to_string()
}

fn signed_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.gateway.secret_key = Secret::from(SECRET);
    config.webhook.hmac_checks = true;
    config
}

fn webhook(body: &str) -> TestRequest {
    TestRequest::post()
        .uri("/gateway/webhook")
        .insert_header(("content-type", "application/json"))
        .set_payload(body.to_string())
}

async fn new_order(ctx: &TestContext, reference: &str) {
    let order = NewOrder::new("ada@example.com", "Ada Obi", MinorUnits::from(4800), PaymentMethod::Prepay)
        .with_reference(reference);
    ctx.db.insert_order(order).await.expect("Could not insert order");
}

async fn status_of(ctx: &TestContext, reference: &str) -> PaymentStatus {
    let order = ctx.db.fetch_order(&OrderReference::from(reference)).await.unwrap().expect("Order should exist");
    order.payment_status
}

#[actix_web::test]
async fn signed_webhook() {
    let ctx = TestContext::new().with_config(signed_config());
    new_order(&ctx, "MPG-W1").await;
    let app = test::init_service(App::new().configure(ctx.clone().configure(MockGateway::new()))).await;
    let body = charge_success("MPG-W1");
    let signature = calculate_hmac(SECRET, body.as_bytes()).expect("HMAC failed");
    let req = webhook(&body).insert_header((GATEWAY_SIGNATURE_HEADER, signature)).to_request();
    let (status, body) = call(&app, req).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["outcome"], "resolved");
    assert_eq!(body["order_reference"], "MPG-W1");
    assert_eq!(body["applied_status"], "paid");
    assert_eq!(status_of(&ctx, "MPG-W1").await, PaymentStatus::Paid);
}

#[actix_web::test]
async fn unsigned_webhook() {
    let ctx = TestContext::new().with_config(signed_config());
    new_order(&ctx, "MPG-W2").await;
    let app = test::init_service(App::new().configure(ctx.clone().configure(MockGateway::new()))).await;
    let err = call(&app, webhook(&charge_success("MPG-W2")).to_request()).await.expect_err("Request should fail");
    assert_eq!(err, "No HMAC signature found.");
    assert_eq!(status_of(&ctx, "MPG-W2").await, PaymentStatus::Pending);
}

#[actix_web::test]
async fn forged_webhook() {
    let ctx = TestContext::new().with_config(signed_config());
    new_order(&ctx, "MPG-W3").await;
    let app = test::init_service(App::new().configure(ctx.clone().configure(MockGateway::new()))).await;
    let body = charge_success("MPG-W3");
    // Signed with the wrong key
    let signature = calculate_hmac("sk_test_other", body.as_bytes()).expect("HMAC failed");
    let req = webhook(&body).insert_header((GATEWAY_SIGNATURE_HEADER, signature)).to_request();
    let err = call(&app, req).await.expect_err("Request should fail");
    assert_eq!(err, "Invalid HMAC signature.");
    // Signed, but the body was tampered with afterwards
    let signature = calculate_hmac(SECRET, body.as_bytes()).expect("HMAC failed");
    let tampered = body.replace("4800", "48");
    let req = webhook(&tampered).insert_header((GATEWAY_SIGNATURE_HEADER, signature)).to_request();
    let err = call(&app, req).await.expect_err("Request should fail");
    assert_eq!(err, "Invalid HMAC signature.");
    assert_eq!(status_of(&ctx, "MPG-W3").await, PaymentStatus::Pending);
}

#[actix_web::test]
async fn whitelisted_sources() {
    let gateway_ip: IpAddr = "52.31.139.75".parse().unwrap();
    let mut config = ServerConfig::default();
    config.webhook.hmac_checks = false;
    config.webhook.whitelist = Some(vec![gateway_ip]);
    let ctx = TestContext::new().with_config(config);
    new_order(&ctx, "MPG-W4").await;
    let app = test::init_service(App::new().configure(ctx.clone().configure(MockGateway::new()))).await;
    let body = charge_success("MPG-W4");

    let err = call(&app, webhook(&body).to_request()).await.expect_err("Request should fail");
    assert_eq!(err, "Forbidden peer.");
    let stranger = SocketAddr::new("10.1.1.1".parse().unwrap(), 443);
    let err = call(&app, webhook(&body).peer_addr(stranger).to_request()).await.expect_err("Request should fail");
    assert_eq!(err, "Forbidden peer.");
    assert_eq!(status_of(&ctx, "MPG-W4").await, PaymentStatus::Pending);

    let req = webhook(&body).peer_addr(SocketAddr::new(gateway_ip, 443)).to_request();
    let (status, body) = call(&app, req).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["outcome"], "resolved");
    assert_eq!(status_of(&ctx, "MPG-W4").await, PaymentStatus::Paid);
}

#[actix_web::test]
async fn unusable_webhooks_are_acknowledged() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(ctx.clone().configure(MockGateway::new()))).await;
    let (status, body) = call(&app, webhook("{ not json").to_request()).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["outcome"], "malformed");

    let transfer = json!({ "event": "transfer.success", "data": { "reference": "TRF-1" } }).to_string();
    let (status, body) = call(&app, webhook(&transfer).to_request()).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(body["event"], "transfer.success");

    let (status, body) = call(&app, webhook(&charge_success("MPG-GHOST")).to_request()).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["outcome"], "unresolved");
}

#[actix_web::test]
async fn repeated_webhooks_are_idempotent() {
    let ctx = TestContext::new();
    new_order(&ctx, "MPG-W5").await;
    let app = test::init_service(App::new().configure(ctx.clone().configure(MockGateway::new()))).await;
    let body = charge_success("MPG-W5");
    let (_, first) = call(&app, webhook(&body).to_request()).await.expect("Request failed");
    assert_eq!(json(&first)["changed"], true);
    let (status, second) = call(&app, webhook(&body).to_request()).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let second = json(&second);
    assert_eq!(second["outcome"], "resolved");
    assert_eq!(second["changed"], false);
    assert_eq!(status_of(&ctx, "MPG-W5").await, PaymentStatus::Paid);
}
