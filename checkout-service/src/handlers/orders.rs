use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::dtos::{CreateOrderRequest, CreateOrderResponse};
use crate::services::checkout::OrderRequest;
use crate::startup::AppState;

/// Create a gateway order for the cart, or a free order when nothing is
/// payable.
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    let lines = payload.line_requests();
    tracing::info!(
        amount = payload.amount,
        lines = lines.len(),
        "Creating order"
    );

    let order = state
        .checkout
        .create_order(OrderRequest {
            amount: payload.amount,
            lines,
            coupon_code: payload.coupon_code,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            success: true,
            order,
        }),
    ))
}
