use std::time::Duration;

use actix_web::{http::StatusCode, test, App};
use gateway_tools::{data_objects::Bank, DedicatedAccount, TransferReceipt};
use market_payment_engine::{
    db_types::{OrderReference, PaymentStatus},
    OrderStore,
};
use serde_json::{json, Value};

use super::{
    helpers::{get_request, json, post_request, TestContext, CONFIRM_DELAY},
    mocks::MockGateway,
};

fn order_request(reference: &str, method: &str) -> Value {
    json!({
        "customer_email": "bola@example.com",
        "customer_name": "Bola Ade",
        "payment_method": method,
        "cart": [
            { "vendor_id": "a", "unit_price": 1200, "quantity": 2 },
            { "vendor_id": "b", "unit_price": 800, "quantity": 3 }
        ],
        "order_reference": reference
    })
}

fn dedicated_account_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_issue_dedicated_account().returning(|_, name| {
        Ok(DedicatedAccount {
            account_number: "9930000002".into(),
            account_name: name.to_string(),
            bank: Bank { name: "Wema Bank".into(), slug: "wema-bank".into() },
        })
    });
    gateway
}

#[actix_web::test]
async fn terminal_collection() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(ctx.clone().configure(MockGateway::new()))).await;
    let (status, _) = post_request(&app, "/api/orders", order_request("MPG-T1", "terminal_on_delivery"))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::CREATED);

    let dispatch = json!({ "order_reference": "MPG-T1", "rider_id": "rider-1", "terminal_id": "TERM-9" });
    let (status, body) = post_request(&app, "/api/rider/dispatch", dispatch).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["rider_id"], "rider-1");
    assert_eq!(body["terminal_id"], "TERM-9");

    let poacher = json!({ "order_reference": "MPG-T1", "rider_id": "rider-2" });
    let (status, _) = post_request(&app, "/api/rider/dispatch", poacher).await.expect("Request failed");
    assert_eq!(status, StatusCode::CONFLICT);
    let collect_as = |rider: &str| json!({ "order_reference": "MPG-T1", "rider_id": rider });
    let (status, _) = post_request(&app, "/api/rider/collect", collect_as("rider-2")).await.expect("Request failed");
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = post_request(&app, "/api/rider/collect", collect_as("rider-1")).await.expect("Request failed");
    assert_eq!(status, StatusCode::ACCEPTED);
    let body = json(&body);
    assert_eq!(body["collection"], "awaiting_terminal");
    assert_eq!(body["confirm_in_ms"], CONFIRM_DELAY.as_millis() as u64);
    assert_eq!(body["already_scheduled"], false);
    let (_, body) = post_request(&app, "/api/rider/collect", collect_as("rider-1")).await.expect("Request failed");
    assert_eq!(json(&body)["already_scheduled"], true);

    actix_web::rt::time::sleep(CONFIRM_DELAY * 5).await;
    let (_, body) = get_request(&app, "/api/orders/MPG-T1").await.expect("Request failed");
    assert_eq!(json(&body)["payment_status"], "paid");
    let (status, _) = post_request(&app, "/api/rider/collect", collect_as("rider-1")).await.expect("Request failed");
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = post_request(&app, "/api/rider/complete", json!({ "order_reference": "MPG-T1" }))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["payment_status"], "delivered");
}

#[actix_web::test]
async fn cancelled_collection() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(ctx.clone().configure(MockGateway::new()))).await;
    let (status, _) = post_request(&app, "/api/orders", order_request("MPG-T2", "terminal_on_delivery"))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::CREATED);
    let dispatch = json!({ "order_reference": "MPG-T2", "rider_id": "rider-1" });
    let (status, _) = post_request(&app, "/api/rider/dispatch", dispatch).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        post_request(&app, "/api/rider/collect", json!({ "order_reference": "MPG-T2", "rider_id": "rider-1" }))
            .await
            .expect("Request failed");
    assert_eq!(status, StatusCode::ACCEPTED);

    let cancel = json!({ "order_reference": "MPG-T2" });
    let (status, body) =
        post_request(&app, "/api/rider/cancel_collection", cancel.clone()).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["success"], true);
    let (status, _) = post_request(&app, "/api/rider/cancel_collection", cancel).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);

    actix_web::rt::time::sleep(CONFIRM_DELAY * 5).await;
    let order = ctx.db.fetch_order(&OrderReference::from("MPG-T2")).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    let (status, _) = post_request(&app, "/api/rider/complete", json!({ "order_reference": "MPG-T2" }))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::CONFLICT);
}

#[actix_web::test]
async fn bank_transfer_collection_and_payouts() {
    let ctx = TestContext::new();
    let mut gateway = dedicated_account_gateway();
    gateway.expect_pay_vendor().withf(|req| req.recipient == "RCP_A").times(1).returning(|req| {
        Ok(TransferReceipt {
            transfer_code: "TRF_a1".into(),
            reference: req.reference.clone(),
            status: "pending".into(),
            amount: req.amount,
            created_at: None,
        })
    });
    let app = test::init_service(App::new().configure(ctx.clone().configure(gateway))).await;
    let (status, _) = post_request(&app, "/api/orders", order_request("MPG-D1", "bank_transfer_on_delivery"))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::CREATED);
    let dispatch = json!({ "order_reference": "MPG-D1", "rider_id": "rider-7" });
    let (status, _) = post_request(&app, "/api/rider/dispatch", dispatch).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);

    let collect = json!({ "order_reference": "MPG-D1", "rider_id": "rider-7" });
    let (status, body) = post_request(&app, "/api/rider/collect", collect).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["collection"], "bank_transfer");
    assert_eq!(body["account_number"], "9930000002");
    assert_eq!(body["amount"], 4800);

    // Paying out before the money has arrived is refused
    let (status, _) = post_request(&app, "/api/payouts/MPG-D1", json!({})).await.expect("Request failed");
    assert_eq!(status, StatusCode::CONFLICT);

    // The transfer carries neither the order reference nor the customer's email, only the account it was paid into
    let transfer = json!({
        "event": "charge.success",
        "data": {
            "reference": "TRX-5511",
            "amount": 4800,
            "channel": "dedicated_nuban",
            "status": "success",
            "customer": { "email": "a.relative@example.com" },
            "metadata": "{\"receiver_account_number\":\"9930000002\"}"
        }
    });
    let (status, body) = post_request(&app, "/gateway/webhook", transfer).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["outcome"], "resolved");
    assert_eq!(body["order_reference"], "MPG-D1");
    assert_eq!(body["strategy"], "dedicated_account");

    let (status, body) = post_request(&app, "/api/payouts/MPG-D1", json!({})).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json(&body),
        json!([
            {
                "vendor_id": "a",
                "amount": 2074,
                "receipt": {
                    "transfer_code": "TRF_a1",
                    "reference": "MPG-D1-a",
                    "status": "pending",
                    "amount": 2074,
                    "createdAt": null
                }
            },
            { "vendor_id": "b", "amount": 2074, "error": "The vendor has no transfer recipient" }
        ])
    );
}

#[actix_web::test]
async fn prepaid_orders_have_no_payouts() {
    let ctx = TestContext::new();
    let mut gateway = MockGateway::new();
    gateway.expect_initialize_checkout().returning(|order, _| {
        Ok(gateway_tools::TransactionInit {
            authorization_url: "https://checkout.example/p".into(),
            access_code: "p".into(),
            reference: order.order_reference.to_string(),
        })
    });
    let app = test::init_service(App::new().configure(ctx.clone().configure(gateway))).await;
    let (status, _) =
        post_request(&app, "/api/orders", order_request("MPG-P9", "prepay")).await.expect("Request failed");
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = post_request(&app, "/api/orders/MPG-P9/status", json!({ "status": "paid" }))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let (status, body) = post_request(&app, "/api/payouts/MPG-P9", json!({})).await.expect("Request failed");
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("gateway split"), "{body}");
    let (status, _) = post_request(&app, "/api/payouts/MPG-NOPE", json!({})).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
}
