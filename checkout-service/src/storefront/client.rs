//! HTTP client for the checkout API, used by the storefront UI.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::cart::{CartError, CartItem, CartState, CartStore};
use crate::models::{CustomerInfo, PaymentStatus};
use crate::services::checkout::FREE_PAYMENT_ID;
use crate::services::invoice::InvoiceBatch;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Checkout API returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("Confirmation task failed: {0}")]
    Dispatch(String),

    #[error(transparent)]
    Cart(#[from] CartError),
}

/// Order reference returned by `POST /orders`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTicket {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub free: bool,
}

/// What the gateway widget hands back on success.
#[derive(Debug, Clone)]
pub struct PaymentCallback {
    pub order_id: String,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
}

impl PaymentCallback {
    /// Callback for a zero-amount order, which never reaches the gateway.
    pub fn free(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            payment_id: Some(FREE_PAYMENT_ID.to_string()),
            signature: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub success: bool,
    pub transaction_id: String,
    pub order_id: String,
    pub payment_status: PaymentStatus,
    pub total_amount: u64,
    pub invoices: InvoiceBatch,
    pub redirect_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderBody<'a> {
    amount: u64,
    plan_ids: Vec<String>,
    items: &'a [CartItem],
    #[serde(skip_serializing_if = "Option::is_none")]
    coupon_code: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmBody<'a> {
    order_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<&'a str>,
    cart_items: &'a [CartItem],
    customer_info: &'a CustomerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    coupon_code: Option<&'a str>,
}

#[derive(Deserialize)]
struct OrderEnvelope {
    order: OrderTicket,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: String,
}

#[derive(Clone)]
pub struct StorefrontClient {
    http: Client,
    base_url: String,
}

impl StorefrontClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Open an order for the cart's payable amount.
    pub async fn create_order(&self, cart: &CartState) -> Result<OrderTicket, ClientError> {
        if cart.is_empty() {
            return Err(ClientError::EmptyCart);
        }

        let body = CreateOrderBody {
            amount: cart.payable,
            plan_ids: cart.plan_ids(),
            items: &cart.items,
            coupon_code: cart.coupon.as_ref().map(|c| c.code.as_str()),
        };
        let response = self
            .http
            .post(format!("{}/orders", self.base_url))
            .json(&body)
            .send()
            .await?;

        let envelope: OrderEnvelope = parse(response).await?;
        Ok(envelope.order)
    }

    /// Send the confirmation and clear the cart once it is on its way,
    /// whatever the server answers.
    pub async fn confirm(
        &self,
        cart: &CartStore,
        callback: PaymentCallback,
        customer: &CustomerInfo,
    ) -> Result<CheckoutReceipt, ClientError> {
        let state = cart.state();
        if state.is_empty() {
            return Err(ClientError::EmptyCart);
        }

        let body = ConfirmBody {
            order_id: &callback.order_id,
            payment_id: callback.payment_id.as_deref(),
            signature: callback.signature.as_deref(),
            cart_items: &state.items,
            customer_info: customer,
            coupon_code: state.coupon.as_ref().map(|c| c.code.as_str()),
        };
        let request = self
            .http
            .post(format!("{}/payments/verify", self.base_url))
            .json(&body);

        let in_flight = tokio::spawn(async move {
            let response = request.send().await?;
            parse::<CheckoutReceipt>(response).await
        });

        if let Err(e) = cart.clear() {
            tracing::warn!(error = %e, "Failed to clear cart after checkout");
        }

        in_flight
            .await
            .map_err(|e| ClientError::Dispatch(e.to_string()))?
    }
}

async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&text)
        .map(|e| e.error)
        .unwrap_or(text);
    Err(ClientError::Api { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::coupons::CouponBook;
    use crate::storefront::cart::MemoryCartStorage;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn customer() -> CustomerInfo {
        CustomerInfo {
            name: "Asha".into(),
            email: "asha@example.com".into(),
            phone: "9876543210".into(),
        }
    }

    fn cart_with_gold() -> CartStore {
        let store = CartStore::open(
            Arc::new(MemoryCartStorage::new()),
            Arc::new(CouponBook::builtin()),
        );
        store
            .add(CartItem {
                id: "gold".into(),
                title: "Gold".into(),
                price: 100_000,
                category: "Plan".into(),
                icon: None,
                href: None,
                quantity: 1,
            })
            .unwrap();
        store
    }

    fn client(server: &MockServer) -> StorefrontClient {
        StorefrontClient::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn create_order_sends_discounted_payable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(body_partial_json(serde_json::json!({
                "amount": 90000,
                "planIds": ["gold"],
                "couponCode": "DOWNDATING10"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "success": true,
                "order": {"id": "order_1", "amount": 90000, "currency": "INR", "keyId": "rzp_test", "free": false}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cart = cart_with_gold();
        cart.apply_coupon("downdating10").unwrap();

        let order = client(&server).create_order(&cart.state()).await.unwrap();
        assert_eq!(order.id, "order_1");
        assert_eq!(order.key_id.as_deref(), Some("rzp_test"));
    }

    #[tokio::test]
    async fn confirm_clears_cart_even_when_server_rejects() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payments/verify"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "success": false,
                "error": "Invalid payment signature"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cart = cart_with_gold();
        let callback = PaymentCallback {
            order_id: "order_1".into(),
            payment_id: Some("pay_1".into()),
            signature: Some("bad".into()),
        };

        let err = client(&server)
            .confirm(&cart, callback, &customer())
            .await
            .unwrap_err();

        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(message, "Invalid payment signature");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(cart.state().is_empty());
    }

    #[tokio::test]
    async fn confirm_free_order_uses_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payments/verify"))
            .and(body_partial_json(serde_json::json!({
                "orderId": "free_abc",
                "paymentId": "FREE",
                "cartItems": [{"id": "gold", "quantity": 1}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "transactionId": "t1",
                "orderId": "free_abc",
                "paymentStatus": "completed",
                "totalAmount": 0,
                "invoices": {"successful": [], "failed": []},
                "redirectUrl": "http://localhost:3000/payment-success?amount=0"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cart = cart_with_gold();
        let receipt = client(&server)
            .confirm(&cart, PaymentCallback::free("free_abc"), &customer())
            .await
            .unwrap();

        assert_eq!(receipt.payment_status, PaymentStatus::Completed);
        assert!(cart.state().is_empty());
    }

    #[tokio::test]
    async fn empty_cart_is_not_sent() {
        let server = MockServer::start().await;
        let cart = cart_with_gold();
        cart.clear().unwrap();

        let err = client(&server).create_order(&cart.state()).await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyCart));
    }
}
