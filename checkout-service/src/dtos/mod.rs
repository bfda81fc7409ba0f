//! Request and response bodies of the HTTP API.
//!
//! Field names are camelCase to match the storefront; Razorpay callback
//! names are accepted as aliases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    CustomerInfo, FormUrl, Invoice, PaymentStatus, Plan, PlanApplication, TransactionRecord,
};
use crate::services::checkout::{OrderRef, WebhookOutcome};
use crate::services::invoice::InvoiceBatch;
use crate::services::pricing::LineRequest;
use crate::services::razorpay::PaymentEntity;

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub success: bool,
    pub plans: Vec<Plan>,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub success: bool,
    pub plan: Plan,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFormsRequest {
    #[serde(alias = "plan_ids")]
    pub plan_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PlanFormsResponse {
    pub success: bool,
    pub forms: Vec<FormUrl>,
}

#[derive(Debug, Deserialize)]
pub struct CouponApplyRequest {
    pub code: String,
    /// Minor units.
    pub subtotal: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponApplyResponse {
    pub success: bool,
    pub applied_code: String,
    pub percent: u8,
    pub discount: u64,
    pub payable: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Payable the client computed, minor units.
    pub amount: u64,
    #[serde(default, alias = "plan_ids")]
    pub plan_ids: Vec<String>,
    /// Cart lines with quantities. Takes precedence over `planIds`.
    #[serde(default, alias = "cartItems")]
    pub items: Vec<CartItemPayload>,
    #[serde(default, alias = "coupon_code")]
    pub coupon_code: Option<String>,
}

impl CreateOrderRequest {
    pub fn line_requests(&self) -> Vec<LineRequest> {
        if self.items.is_empty() {
            self.plan_ids.iter().map(LineRequest::single).collect()
        } else {
            self.items.iter().map(LineRequest::from).collect()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order: OrderRef,
}

/// A cart line as the storefront holds it. Only `id` and `quantity` are
/// trusted; prices are re-read from the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CartItemPayload {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<u64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
}

impl From<&CartItemPayload> for LineRequest {
    fn from(item: &CartItemPayload) -> Self {
        LineRequest {
            plan_id: item.id.clone(),
            quantity: item.quantity.unwrap_or(1),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[serde(alias = "razorpay_order_id")]
    pub order_id: String,
    #[serde(default, alias = "razorpay_payment_id")]
    pub payment_id: Option<String>,
    #[serde(default, alias = "razorpay_signature", alias = "razorpaySignature")]
    pub signature: Option<String>,
    #[serde(alias = "cart_items")]
    pub cart_items: Vec<CartItemPayload>,
    #[serde(alias = "customer_info")]
    pub customer_info: CustomerInfo,
    #[serde(default, alias = "coupon_code")]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub transaction_id: String,
    pub order_id: String,
    pub payment_status: PaymentStatus,
    pub total_amount: u64,
    pub invoices: InvoiceBatch,
    pub redirect_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePaymentRequest {
    #[serde(alias = "razorpay_payment_id")]
    pub payment_id: String,
    pub amount: u64,
}

#[derive(Debug, Serialize)]
pub struct CapturePaymentResponse {
    pub success: bool,
    pub payment: PaymentEntity,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: WebhookOutcome,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub success: bool,
    pub transaction: TransactionRecord,
}

/// Standalone invoice payload.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendInvoiceRequest {
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "razorpayOrderId is required"))]
    pub razorpay_order_id: String,
    #[serde(default)]
    pub razorpay_payment_id: Option<String>,
    #[serde(alias = "planIds")]
    #[validate(length(min = 1, message = "planId is required"))]
    pub plan_id: String,
    #[serde(alias = "planTitles")]
    #[validate(length(min = 1, message = "planTitle is required"))]
    pub plan_title: String,
    /// Minor units.
    #[serde(alias = "totalAmount")]
    pub amount: u64,
    #[serde(default)]
    pub currency: Option<String>,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl SendInvoiceRequest {
    pub fn into_invoice(self, default_currency: &str) -> Invoice {
        Invoice {
            invoice_number: self.invoice_number.unwrap_or_default().trim().to_string(),
            name: self.name,
            email: self.email,
            phone: self.phone,
            razorpay_order_id: self.razorpay_order_id,
            razorpay_payment_id: self.razorpay_payment_id,
            plan_id: self.plan_id,
            plan_title: self.plan_title,
            amount: self.amount,
            currency: self.currency.unwrap_or_else(|| default_currency.to_string()),
            payment_status: self.payment_status,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendInvoiceResponse {
    pub success: bool,
    pub invoice_number: String,
    pub email_message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceQuery {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub success: bool,
    pub invoice: Invoice,
}

#[derive(Debug, Serialize)]
pub struct InvoicesResponse {
    pub success: bool,
    pub invoices: Vec<Invoice>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationsQuery {
    pub email: Option<String>,
    pub order_id: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitApplicationResponse {
    pub success: bool,
    pub message: String,
    pub application_id: String,
}

#[derive(Debug, Serialize)]
pub struct ApplicationsResponse {
    pub success: bool,
    pub applications: Vec<PlanApplication>,
    pub count: usize,
}
