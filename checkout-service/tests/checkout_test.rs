mod common;

use chrono::Utc;
use common::{cart_json, customer_json, TestApp, STOREFRONT_URL};
use checkout_service::services::MockEmailProvider;
use serde_json::{json, Value};

#[tokio::test]
async fn amount_mismatch_is_rejected_without_gateway_order() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/orders", &json!({ "amount": 100, "planIds": ["gold"] }))
        .await;

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(app.gateway.create_calls(), 0);
}

#[tokio::test]
async fn unknown_plan_is_rejected_without_gateway_order() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/orders", &json!({ "amount": 149900, "planIds": ["gold", "platinum"] }))
        .await;

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.gateway.create_calls(), 0);
}

#[tokio::test]
async fn order_amount_includes_coupon_discount() {
    let app = TestApp::spawn().await;

    // 10% of 1,499.00 is 149.90
    let response = app
        .post(
            "/orders",
            &json!({ "amount": 134910, "planIds": ["gold"], "couponCode": "downdating10" }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["order"]["amount"], 134910);
    assert_eq!(body["order"]["keyId"], "rzp_test_key");
    assert_eq!(body["order"]["free"], false);
    assert_eq!(app.gateway.create_calls(), 1);
}

#[tokio::test]
async fn order_lines_are_priced_by_quantity() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/orders",
            &json!({ "amount": 149_900, "items": [{ "id": "silver", "quantity": 2 }] }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.gateway.create_calls(), 0);

    let response = app
        .post(
            "/orders",
            &json!({
                "amount": 249_700,
                "items": [{ "id": "silver", "quantity": 2 }, { "id": "bronze" }]
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["order"]["amount"], 249_700);
}

#[tokio::test]
async fn unknown_coupon_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/orders",
            &json!({ "amount": 149900, "planIds": ["gold"], "couponCode": "BOGUS" }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.gateway.create_calls(), 0);
}

#[tokio::test]
async fn paid_checkout_records_transaction_and_issues_invoices() {
    let app = TestApp::spawn().await;
    let order_id = app.create_order(249_800, &["gold", "silver"]).await;
    app.gateway.mark_paid(&order_id);

    let response = app
        .post(
            "/payments/verify",
            &json!({
                "razorpay_order_id": order_id,
                "razorpay_payment_id": "pay_001",
                "razorpay_signature": app.sign_payment(&order_id, "pay_001"),
                "cartItems": cart_json(&["gold", "silver"]),
                "customerInfo": customer_json()
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["paymentStatus"], "completed");
    assert_eq!(body["totalAmount"], 249_800);
    assert_eq!(body["invoices"]["successful"].as_array().unwrap().len(), 2);
    assert!(body["invoices"]["failed"].as_array().unwrap().is_empty());
    assert!(body["redirectUrl"]
        .as_str()
        .unwrap()
        .starts_with(&format!("{}/payment-success?", STOREFRONT_URL)));

    assert_eq!(app.store.transaction_count(), 1);
    assert_eq!(app.email.send_count(), 2);

    let month = Utc::now().format("%Y%m").to_string();
    let mut numbers: Vec<String> = app
        .store
        .invoices()
        .into_iter()
        .map(|i| i.invoice_number)
        .collect();
    numbers.sort();
    assert_eq!(
        numbers,
        vec![format!("INV-{}-0001", month), format!("INV-{}-0002", month)]
    );

    let response = app.get(&format!("/transactions/{}", order_id)).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["transaction"]["razorpayPaymentId"], "pay_001");
    assert_eq!(body["transaction"]["planIds"], json!(["gold", "silver"]));
}

#[tokio::test]
async fn unpaid_gateway_order_is_recorded_as_pending() {
    let app = TestApp::spawn().await;
    let order_id = app.create_order(49_900, &["bronze"]).await;

    let response = app
        .post(
            "/payments/verify",
            &json!({
                "orderId": order_id,
                "paymentId": "pay_002",
                "signature": app.sign_payment(&order_id, "pay_002"),
                "cartItems": cart_json(&["bronze"]),
                "customerInfo": customer_json()
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["paymentStatus"], "pending");
}

#[tokio::test]
async fn bad_or_missing_signature_is_unauthorized() {
    let app = TestApp::spawn().await;
    let order_id = app.create_order(149_900, &["gold"]).await;
    app.gateway.mark_paid(&order_id);

    let forged = app
        .post(
            "/payments/verify",
            &json!({
                "orderId": order_id,
                "paymentId": "pay_003",
                "signature": app.sign_payment(&order_id, "pay_other"),
                "cartItems": cart_json(&["gold"]),
                "customerInfo": customer_json()
            }),
        )
        .await;
    assert_eq!(forged.status().as_u16(), 401);

    let unsigned = app
        .post(
            "/payments/verify",
            &json!({
                "orderId": order_id,
                "paymentId": "pay_003",
                "cartItems": cart_json(&["gold"]),
                "customerInfo": customer_json()
            }),
        )
        .await;
    assert_eq!(unsigned.status().as_u16(), 401);

    assert_eq!(app.store.transaction_count(), 0);
    assert_eq!(app.email.send_count(), 0);
}

#[tokio::test]
async fn confirming_the_same_order_twice_conflicts() {
    let app = TestApp::spawn().await;
    let order_id = app.create_order(149_900, &["gold"]).await;
    app.gateway.mark_paid(&order_id);

    let body = json!({
        "orderId": order_id,
        "paymentId": "pay_004",
        "signature": app.sign_payment(&order_id, "pay_004"),
        "cartItems": cart_json(&["gold"]),
        "customerInfo": customer_json()
    });

    assert_eq!(app.post("/payments/verify", &body).await.status().as_u16(), 200);
    assert_eq!(app.post("/payments/verify", &body).await.status().as_u16(), 409);

    assert_eq!(app.store.transaction_count(), 1);
    assert_eq!(app.store.invoice_count(), 1);
}

#[tokio::test]
async fn gateway_amount_must_match_repriced_cart() {
    let app = TestApp::spawn().await;
    // Order opened for less than the cart is worth.
    app.gateway.put_order("order_cheap", 100, "paid");

    let response = app
        .post(
            "/payments/verify",
            &json!({
                "orderId": "order_cheap",
                "paymentId": "pay_005",
                "signature": app.sign_payment("order_cheap", "pay_005"),
                "cartItems": cart_json(&["gold"]),
                "customerInfo": customer_json()
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.store.transaction_count(), 0);
}

#[tokio::test]
async fn zero_amount_checkout_skips_gateway_and_still_invoices() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/orders", &json!({ "amount": 0, "planIds": ["mixer"] }))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["order"]["free"], true);
    let order_id = body["order"]["id"].as_str().unwrap().to_string();
    assert!(order_id.starts_with("free_"));
    assert_eq!(app.gateway.create_calls(), 0);

    let response = app
        .post(
            "/payments/verify",
            &json!({
                "orderId": order_id,
                "paymentId": "FREE",
                "cartItems": cart_json(&["mixer"]),
                "customerInfo": customer_json()
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["paymentStatus"], "completed");
    assert_eq!(body["totalAmount"], 0);
    assert_eq!(body["invoices"]["successful"].as_array().unwrap().len(), 1);
    assert_eq!(body["invoices"]["successful"][0]["amount"], 0);

    let response = app.get(&format!("/transactions/{}", order_id)).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["transaction"]["razorpayPaymentId"], "FREE");
    assert_eq!(app.gateway.create_calls(), 0);
}

#[tokio::test]
async fn full_discount_coupon_makes_the_order_free() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/orders",
            &json!({ "amount": 0, "planIds": ["gold"], "couponCode": "FREEDATE" }),
        )
        .await;
    let body: Value = response.json().await.unwrap();
    let order_id = body["order"]["id"].as_str().unwrap().to_string();
    assert!(order_id.starts_with("free_"));

    let response = app
        .post(
            "/payments/verify",
            &json!({
                "orderId": order_id,
                "paymentId": "FREE",
                "cartItems": cart_json(&["gold"]),
                "customerInfo": customer_json(),
                "couponCode": "FREEDATE"
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["invoices"]["successful"][0]["amount"], 0);
}

#[tokio::test]
async fn free_sentinel_is_refused_for_a_paid_cart() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/payments/verify",
            &json!({
                "orderId": "free_0123456789abcdef",
                "paymentId": "FREE",
                "cartItems": cart_json(&["gold"]),
                "customerInfo": customer_json()
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.store.transaction_count(), 0);
}

#[tokio::test]
async fn one_failed_invoice_does_not_fail_checkout() {
    let app =
        TestApp::spawn_with_email(MockEmailProvider::new().fail_when_contains("Silver Match"))
            .await;
    let order_id = app.create_order(299_700, &["gold", "silver", "bronze"]).await;
    app.gateway.mark_paid(&order_id);

    let response = app
        .post(
            "/payments/verify",
            &json!({
                "orderId": order_id,
                "paymentId": "pay_006",
                "signature": app.sign_payment(&order_id, "pay_006"),
                "cartItems": cart_json(&["gold", "silver", "bronze"]),
                "customerInfo": customer_json()
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();

    let mut ok: Vec<&str> = body["invoices"]["successful"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["planId"].as_str().unwrap())
        .collect();
    ok.sort();
    assert_eq!(ok, vec!["bronze", "gold"]);

    let failed = body["invoices"]["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["planId"], "silver");
    assert_eq!(failed[0]["step"], "send");
    assert!(failed[0]["invoiceNumber"].is_string());

    assert_eq!(app.store.transaction_count(), 1);
}

#[tokio::test]
async fn invalid_customer_details_are_rejected() {
    let app = TestApp::spawn().await;
    let order_id = app.create_order(149_900, &["gold"]).await;

    let response = app
        .post(
            "/payments/verify",
            &json!({
                "orderId": order_id,
                "paymentId": "pay_007",
                "signature": app.sign_payment(&order_id, "pay_007"),
                "cartItems": cart_json(&["gold"]),
                "customerInfo": { "name": "", "email": "nope", "phone": "1" }
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 422);
    assert_eq!(app.store.transaction_count(), 0);
}

#[tokio::test]
async fn capture_forwards_to_gateway() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/payments/capture",
            &json!({ "paymentId": "pay_008", "amount": 149900 }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["payment"]["status"], "captured");
    assert_eq!(app.gateway.capture_calls(), 1);

    let response = app
        .post("/payments/capture", &json!({ "paymentId": "pay_009", "amount": 0 }))
        .await;
    assert_eq!(response.status().as_u16(), 400);
}
