mod common;

use common::{cart_json, customer_json, TestApp};
use serde_json::{json, Value};

async fn pending_order(app: &TestApp) -> String {
    let order_id = app.create_order(49_900, &["bronze"]).await;
    let response = app
        .post(
            "/payments/verify",
            &json!({
                "orderId": order_id,
                "paymentId": "pay_wh",
                "signature": app.sign_payment(&order_id, "pay_wh"),
                "cartItems": cart_json(&["bronze"]),
                "customerInfo": customer_json()
            }),
        )
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["paymentStatus"], "pending");
    order_id
}

fn payment_event(event: &str, order_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_wh",
                    "amount": 49900,
                    "currency": "INR",
                    "status": "captured",
                    "order_id": order_id
                }
            }
        }
    }))
    .unwrap()
}

async fn deliver(app: &TestApp, body: Vec<u8>, signature: Option<String>) -> reqwest::Response {
    let mut request = app
        .client
        .post(format!("{}/webhooks/razorpay", app.address))
        .header("content-type", "application/json")
        .body(body);
    if let Some(signature) = signature {
        request = request.header("X-Razorpay-Signature", signature);
    }
    request.send().await.expect("Failed to execute request")
}

#[tokio::test]
async fn captured_event_completes_pending_transaction() {
    let app = TestApp::spawn().await;
    let order_id = pending_order(&app).await;

    let body = payment_event("payment.captured", &order_id);
    let signature = app.sign_webhook(&body);
    let response = deliver(&app, body, Some(signature)).await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["status"], "completed");

    let response = app.get(&format!("/transactions/{}", order_id)).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["transaction"]["paymentStatus"], "completed");

    // Redelivery of the same event is harmless.
    let body = payment_event("payment.captured", &order_id);
    let signature = app.sign_webhook(&body);
    assert_eq!(deliver(&app, body, Some(signature)).await.status().as_u16(), 200);
}

#[tokio::test]
async fn settled_transaction_cannot_flip() {
    let app = TestApp::spawn().await;
    let order_id = pending_order(&app).await;

    let body = payment_event("payment.failed", &order_id);
    let signature = app.sign_webhook(&body);
    assert_eq!(deliver(&app, body, Some(signature)).await.status().as_u16(), 200);

    let body = payment_event("payment.captured", &order_id);
    let signature = app.sign_webhook(&body);
    assert_eq!(deliver(&app, body, Some(signature)).await.status().as_u16(), 409);
}

#[tokio::test]
async fn unsigned_or_forged_webhooks_are_rejected() {
    let app = TestApp::spawn().await;
    let order_id = pending_order(&app).await;

    let body = payment_event("payment.captured", &order_id);
    assert_eq!(deliver(&app, body.clone(), None).await.status().as_u16(), 401);
    assert_eq!(
        deliver(&app, body, Some("deadbeef".to_string())).await.status().as_u16(),
        401
    );

    let response = app.get(&format!("/transactions/{}", order_id)).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["transaction"]["paymentStatus"], "pending");
}

#[tokio::test]
async fn unknown_orders_and_events_are_acknowledged() {
    let app = TestApp::spawn().await;

    let body = payment_event("payment.captured", "order_missing");
    let signature = app.sign_webhook(&body);
    let response = deliver(&app, body, Some(signature)).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "unknown_order");

    let body = payment_event("refund.processed", "order_missing");
    let signature = app.sign_webhook(&body);
    let response = deliver(&app, body, Some(signature)).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "ignored");
}
