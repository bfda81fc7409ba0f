use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::{CouponApplyRequest, CouponApplyResponse};
use crate::error::CheckoutError;
use crate::startup::AppState;

/// Evaluate a coupon against a subtotal. Invalid codes are a 400 so the
/// client resets any previously applied discount.
pub async fn apply_coupon(
    State(state): State<AppState>,
    Json(payload): Json<CouponApplyRequest>,
) -> Result<Json<CouponApplyResponse>, AppError> {
    let applied = state
        .checkout
        .coupons()
        .apply(&payload.code, payload.subtotal)
        .ok_or_else(|| CheckoutError::InvalidCoupon(payload.code.trim().to_string()))?;

    Ok(Json(CouponApplyResponse {
        success: true,
        payable: payload.subtotal.saturating_sub(applied.discount),
        applied_code: applied.code,
        percent: applied.percent,
        discount: applied.discount,
    }))
}
