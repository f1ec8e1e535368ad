use actix_web::{http::StatusCode, test, web, App};
use gateway_tools::{data_objects::Bank, DedicatedAccount, GatewayApiError, TransactionInit};
use market_payment_engine::{
    db_types::{Order, OrderReference, PaymentStatus},
    split::GatewaySplitConfig,
    OrderFlowApi,
    OrderStore,
    OrderStoreError,
};
use mpg_common::MinorUnits;
use serde_json::{json, Value};

use super::{
    helpers::{get_request, json, post_request, TestContext},
    mocks::{MockGateway, MockStore},
};
use crate::routes::OrderByReferenceRoute;

fn cart() -> Value {
    json!([
        { "vendor_id": "a", "unit_price": 1200, "quantity": 2 },
        { "vendor_id": "b", "unit_price": 800, "quantity": 3 }
    ])
}

fn order_request(reference: &str, method: &str) -> Value {
    json!({
        "customer_email": "ada@example.com",
        "customer_name": "Ada Obi",
        "delivery_address": "12 Allen Avenue, Ikeja",
        "payment_method": method,
        "cart": cart(),
        "order_reference": reference
    })
}

fn checkout_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway
        .expect_initialize_checkout()
        .withf(|order, split| {
            order.amount == MinorUnits::from(4800) && matches!(split, GatewaySplitConfig::MultiVendor { .. })
        })
        .returning(|order, _| {
            Ok(TransactionInit {
                authorization_url: format!("https://checkout.example/{}", order.order_reference),
                access_code: "access-1".into(),
                reference: order.order_reference.to_string(),
            })
        });
    gateway
}

#[actix_web::test]
async fn split_preview() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(ctx.clone().configure(MockGateway::new()))).await;
    let (status, body) = post_request(&app, "/api/split", json!({ "cart": cart() })).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["split"]["order_total"], 4800);
    assert_eq!(body["split"]["vendor_payouts"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["gateway_split"]["type"], "multi_vendor");
    assert_eq!(
        body["gateway_split"]["shares"],
        json!([
            { "subaccount_id": "ACCT_A", "amount_minor_units": 2074 },
            { "subaccount_id": "ACCT_B", "amount_minor_units": 2074 },
            { "subaccount_id": "platform", "amount_minor_units": 652 }
        ])
    );
}

#[actix_web::test]
async fn split_preview_rejects_bad_carts() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(ctx.clone().configure(MockGateway::new()))).await;
    let unknown = json!({ "cart": [{ "vendor_id": "zz", "unit_price": 100, "quantity": 1 }] });
    let (status, body) = post_request(&app, "/api/split", unknown).await.expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("zz"), "{body}");
    let (status, _) = post_request(&app, "/api/split", json!({ "cart": [] })).await.expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn place_prepaid_order() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(ctx.clone().configure(checkout_gateway()))).await;
    let (status, body) =
        post_request(&app, "/api/orders", order_request("MPG-P1", "prepay")).await.expect("Request failed");
    assert_eq!(status, StatusCode::CREATED);
    let body = json(&body);
    assert_eq!(body["order"]["order_reference"], "MPG-P1");
    assert_eq!(body["order"]["amount"], 4800);
    assert_eq!(body["order"]["payment_status"], "pending");
    assert_eq!(body["order"]["vendor_payouts"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["checkout"]["authorization_url"], "https://checkout.example/MPG-P1");
    assert!(body.get("dedicated_account").is_none());

    let (status, body) = get_request(&app, "/api/orders/MPG-P1").await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let order: Order = serde_json::from_str(&body).expect("Not an order");
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.delivery_address.as_deref(), Some("12 Allen Avenue, Ikeja"));

    let (status, _) =
        post_request(&app, "/api/orders", order_request("MPG-P1", "prepay")).await.expect("Request failed");
    assert_eq!(status, StatusCode::CONFLICT);
}

#[actix_web::test]
async fn place_bank_transfer_order() {
    let ctx = TestContext::new();
    let mut gateway = MockGateway::new();
    gateway.expect_issue_dedicated_account().times(1).returning(|_, name| {
        Ok(DedicatedAccount {
            account_number: "9930000001".into(),
            account_name: name.to_string(),
            bank: Bank { name: "Wema Bank".into(), slug: "wema-bank".into() },
        })
    });
    let app = test::init_service(App::new().configure(ctx.clone().configure(gateway))).await;
    let (status, body) = post_request(&app, "/api/orders", order_request("MPG-B1", "bank_transfer_on_delivery"))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::CREATED);
    let body = json(&body);
    assert_eq!(body["order"]["dedicated_account"], "9930000001");
    assert_eq!(body["dedicated_account"]["account_name"], "Ada Obi");
    assert!(body.get("checkout").is_none());
}

#[actix_web::test]
async fn no_order_without_a_dedicated_account() {
    let ctx = TestContext::new();
    let mut gateway = MockGateway::new();
    gateway
        .expect_issue_dedicated_account()
        .returning(|_, _| Err(GatewayApiError::QueryError { status: 400, message: "No bank".into() }));
    let app = test::init_service(App::new().configure(ctx.clone().configure(gateway))).await;
    let (status, _) = post_request(&app, "/api/orders", order_request("MPG-B2", "bank_transfer_on_delivery"))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let (status, body) = get_request(&app, "/api/orders").await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), json!([]));
}

#[actix_web::test]
async fn list_orders_with_filters() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(ctx.clone().configure(checkout_gateway()))).await;
    for (reference, method) in [("MPG-L1", "prepay"), ("MPG-L2", "terminal_on_delivery")] {
        let (status, _) =
            post_request(&app, "/api/orders", order_request(reference, method)).await.expect("Request failed");
        assert_eq!(status, StatusCode::CREATED);
    }
    let references = |body: &str| -> Option<Vec<String>> {
        json(body)
            .as_array()
            .map(|a| a.iter().map(|o| o["order_reference"].as_str().unwrap_or_default().to_string()).collect())
    };
    let (_, body) = get_request(&app, "/api/orders").await.expect("Request failed");
    assert_eq!(references(&body), Some(vec!["MPG-L1".to_string(), "MPG-L2".to_string()]));
    let (_, body) =
        get_request(&app, "/api/orders?payment_method=terminal_on_delivery").await.expect("Request failed");
    assert_eq!(references(&body), Some(vec!["MPG-L2".to_string()]));
    let (_, body) = get_request(&app, "/api/orders?status=paid,failed").await.expect("Request failed");
    assert_eq!(references(&body), Some(vec![]));
    let (_, body) =
        get_request(&app, "/api/orders?email=ADA@example.com&status=pending").await.expect("Request failed");
    assert_eq!(references(&body).map(|r| r.len()), Some(2));
    let (status, _) = get_request(&app, "/api/orders?status=lost").await.expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn unknown_order() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(ctx.clone().configure(MockGateway::new()))).await;
    let (status, body) = get_request(&app, "/api/orders/MPG-NOPE").await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "The data was not found. Order MPG-NOPE does not exist");
}

#[actix_web::test]
async fn manual_status_updates() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(ctx.clone().configure(MockGateway::new()))).await;
    let (status, _) = post_request(&app, "/api/orders", order_request("MPG-M1", "terminal_on_delivery"))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::CREATED);

    let update = json!({ "status": "paid", "payment_reference": "T-777" });
    let (status, body) = post_request(&app, "/api/orders/MPG-M1/status", update).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["outcome"], "resolved");
    assert_eq!(body["changed"], true);

    let order = ctx.db.fetch_order(&OrderReference::from("MPG-M1")).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.payment_reference.as_deref(), Some("T-777"));
    let details = order.payment_details.expect("manual update should keep its request body");
    assert_eq!(details["status"], "paid");
    assert_eq!(details["payment_reference"], "T-777");

    let (status, _) = post_request(&app, "/api/orders/MPG-M1/status", json!({ "status": "failed" }))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = post_request(&app, "/api/orders/MPG-M9/status", json!({ "status": "paid" }))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn verify_payment_by_polling() {
    let ctx = TestContext::new();
    let mut gateway = checkout_gateway();
    gateway.expect_verify_payment().returning(|reference| match reference {
        "MPG-V1" => Ok(json!({
            "status": "success",
            "reference": "MPG-V1",
            "amount": 4800,
            "channel": "card",
            "customer": { "email": "ada@example.com" },
            "metadata": { "order_reference": "MPG-V1" }
        })),
        _ => Ok(json!({ "status": "ongoing", "reference": reference })),
    });
    let app = test::init_service(App::new().configure(ctx.clone().configure(gateway))).await;
    let (status, _) =
        post_request(&app, "/api/orders", order_request("MPG-V1", "prepay")).await.expect("Request failed");
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = get_request(&app, "/api/payments/verify/MPG-V2").await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["outcome"]["outcome"], "ignored");
    assert!(body.get("order").is_none());

    let (status, body) = get_request(&app, "/api/payments/verify/MPG-V1").await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["outcome"]["outcome"], "resolved");
    assert_eq!(body["outcome"]["strategy"], "order_reference");
    assert_eq!(body["order"]["payment_status"], "paid");
    assert_eq!(body["order"]["payment_reference"], "MPG-V1");
}

#[actix_web::test]
async fn verify_payment_gateway_down() {
    let ctx = TestContext::new();
    let mut gateway = MockGateway::new();
    gateway.expect_verify_payment().returning(|_| Err(GatewayApiError::EmptyResponse("verify".into())));
    let app = test::init_service(App::new().configure(ctx.clone().configure(gateway))).await;
    let (status, _) = get_request(&app, "/api/payments/verify/MPG-1").await.expect("Request failed");
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[actix_web::test]
async fn backend_failure() {
    let _ = env_logger::try_init();
    let mut store = MockStore::new();
    store.expect_fetch_order().returning(|_| Err(OrderStoreError::DatabaseError("disk on fire".into())));
    let api = OrderFlowApi::new(store, Default::default());
    let app = test::init_service(
        App::new().app_data(web::Data::new(api)).service(OrderByReferenceRoute::<MockStore>::new()),
    )
    .await;
    let (status, body) = get_request(&app, "/orders/MPG-1").await.expect("Request failed");
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("disk on fire"), "{body}");
}
