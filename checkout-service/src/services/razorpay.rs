//! Razorpay payment gateway client.
//!
//! Implements the Orders and Payments APIs used by checkout and the
//! signature checks for client callbacks and webhooks.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::utils::signature::{hmac_sha256_hex, verify_hmac_sha256_hex};
use std::time::Duration;
use thiserror::Error;

use crate::config::RazorpayConfig;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Razorpay credentials not configured")]
    NotConfigured,

    #[error("Gateway request timed out")]
    Timeout,

    #[error("Gateway transport error: {0}")]
    Transport(String),

    #[error("Razorpay error ({status}): {code} - {description}")]
    Api {
        status: u16,
        code: String,
        description: String,
    },

    #[error("Unexpected gateway response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Order as the gateway reports it. Amounts are minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub amount_paid: u64,
}

impl GatewayOrder {
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }
}

/// Payment entity returned by capture and carried in webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub captured: Option<bool>,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: u64,
    currency: &'a str,
    receipt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct CaptureRequest<'a> {
    amount: u64,
    currency: &'a str,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorBody {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

/// Outbound operations against the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to the client-side checkout widget.
    fn key_id(&self) -> &str;

    async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt: &str,
        notes: Option<serde_json::Value>,
    ) -> Result<GatewayOrder, GatewayError>;

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError>;

    async fn capture_payment(
        &self,
        payment_id: &str,
        amount: u64,
        currency: &str,
    ) -> Result<PaymentEntity, GatewayError>;
}

/// Razorpay REST client.
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    key_id: String,
    key_secret: Secret<String>,
    api_base_url: String,
}

impl RazorpayClient {
    pub fn new(config: &RazorpayConfig, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Whether credentials are set.
    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.expose_secret().is_empty()
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<T, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let response = request
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(operation, status = %status, "Razorpay response");

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()));
        }

        let error = parse_error(status, &body);
        tracing::error!(operation, error = %error, "Razorpay request failed");
        Err(error)
    }
}

fn parse_error(status: StatusCode, body: &str) -> GatewayError {
    match serde_json::from_str::<RazorpayErrorBody>(body) {
        Ok(parsed) => GatewayError::Api {
            status: status.as_u16(),
            code: parsed.error.code,
            description: parsed.error.description,
        },
        Err(_) => GatewayError::Api {
            status: status.as_u16(),
            code: "UNKNOWN".to_string(),
            description: body.to_string(),
        },
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt: &str,
        notes: Option<serde_json::Value>,
    ) -> Result<GatewayOrder, GatewayError> {
        let url = format!("{}/orders", self.api_base_url);
        let request = self.client.post(&url).json(&CreateOrderRequest {
            amount,
            currency,
            receipt,
            notes,
        });

        let order: GatewayOrder = self.send(request, "create_order").await?;
        tracing::info!(
            order_id = %order.id,
            amount = order.amount,
            currency = %order.currency,
            "Razorpay order created"
        );
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        let url = format!("{}/orders/{}", self.api_base_url, order_id);
        self.send(self.client.get(&url), "fetch_order").await
    }

    async fn capture_payment(
        &self,
        payment_id: &str,
        amount: u64,
        currency: &str,
    ) -> Result<PaymentEntity, GatewayError> {
        let url = format!("{}/payments/{}/capture", self.api_base_url, payment_id);
        let request = self
            .client
            .post(&url)
            .json(&CaptureRequest { amount, currency });

        let payment: PaymentEntity = self.send(request, "capture_payment").await?;
        tracing::info!(payment_id = %payment.id, status = %payment.status, "Payment captured");
        Ok(payment)
    }
}

/// Verifies signatures produced by the gateway.
#[derive(Clone)]
pub struct RazorpaySignatures {
    key_secret: Secret<String>,
    webhook_secret: Secret<String>,
}

impl RazorpaySignatures {
    pub fn new(key_secret: Secret<String>, webhook_secret: Secret<String>) -> Self {
        Self {
            key_secret,
            webhook_secret,
        }
    }

    pub fn from_config(config: &RazorpayConfig) -> Self {
        Self::new(config.key_secret.clone(), config.webhook_secret.clone())
    }

    /// `HMAC-SHA256(order_id|payment_id, key_secret)` as lowercase hex.
    pub fn sign_payment(&self, order_id: &str, payment_id: &str) -> anyhow::Result<String> {
        let payload = format!("{}|{}", order_id, payment_id);
        hmac_sha256_hex(self.key_secret.expose_secret(), payload.as_bytes())
    }

    /// Check the signature the checkout widget returned for a payment.
    pub fn verify_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> anyhow::Result<bool> {
        let payload = format!("{}|{}", order_id, payment_id);
        let valid =
            verify_hmac_sha256_hex(self.key_secret.expose_secret(), payload.as_bytes(), signature)?;

        if valid {
            tracing::info!(%order_id, %payment_id, "Payment signature verified");
        } else {
            tracing::warn!(%order_id, %payment_id, "Payment signature verification failed");
        }
        Ok(valid)
    }

    /// Check `X-Razorpay-Signature` against the raw webhook body.
    pub fn verify_webhook(&self, body: &[u8], signature: &str) -> anyhow::Result<bool> {
        let valid = verify_hmac_sha256_hex(self.webhook_secret.expose_secret(), body, signature)?;
        if !valid {
            tracing::warn!("Webhook signature verification failed");
        }
        Ok(valid)
    }
}

/// Razorpay webhook envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<WebhookPaymentEntity>,
    pub order: Option<WebhookOrderEntity>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPaymentEntity {
    pub entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
pub struct WebhookOrderEntity {
    pub entity: GatewayOrder,
}

impl WebhookEvent {
    /// Gateway order id the event refers to, if any.
    pub fn order_id(&self) -> Option<&str> {
        self.payload
            .order
            .as_ref()
            .map(|o| o.entity.id.as_str())
            .or_else(|| {
                self.payload
                    .payment
                    .as_ref()
                    .and_then(|p| p.entity.order_id.as_deref())
            })
    }
}
