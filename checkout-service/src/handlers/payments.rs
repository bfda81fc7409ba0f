//! Payment confirmation, capture and gateway webhooks.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{
    CapturePaymentRequest, CapturePaymentResponse, VerifyPaymentRequest, VerifyPaymentResponse,
    WebhookResponse,
};
use crate::services::checkout::ConfirmRequest;
use crate::services::pricing::LineRequest;
use crate::startup::AppState;

const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

/// Confirm a paid or free checkout, record it and issue invoices.
///
/// Invoice failures do not fail the request; they are listed under
/// `invoices.failed`.
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    tracing::info!(
        order_id = %payload.order_id,
        items = payload.cart_items.len(),
        "Verifying payment"
    );

    let confirmation = state
        .checkout
        .confirm_payment(ConfirmRequest {
            order_id: payload.order_id,
            payment_id: payload.payment_id,
            signature: payload.signature,
            cart_items: payload.cart_items.iter().map(LineRequest::from).collect(),
            customer: payload.customer_info,
            coupon_code: payload.coupon_code,
        })
        .await?;

    let transaction = confirmation.transaction;
    Ok(Json(VerifyPaymentResponse {
        success: true,
        transaction_id: transaction.id,
        order_id: transaction.razorpay_order_id,
        payment_status: transaction.payment_status,
        total_amount: transaction.total_amount,
        invoices: confirmation.invoices,
        redirect_url: confirmation.redirect_url,
    }))
}

pub async fn capture_payment(
    State(state): State<AppState>,
    Json(payload): Json<CapturePaymentRequest>,
) -> Result<Json<CapturePaymentResponse>, AppError> {
    let payment = state
        .checkout
        .capture_payment(&payload.payment_id, payload.amount)
        .await?;

    tracing::info!(payment_id = %payment.id, status = %payment.status, "Payment captured");
    Ok(Json(CapturePaymentResponse {
        success: true,
        payment,
    }))
}

/// Razorpay webhook. The signature covers the raw body, so it is read
/// before any JSON parsing.
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if signature.is_none() {
        tracing::warn!("Missing X-Razorpay-Signature header");
    }

    let outcome = state.checkout.apply_webhook(&body, signature).await?;

    Ok(Json(WebhookResponse {
        success: true,
        outcome,
    }))
}
