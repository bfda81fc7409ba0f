use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::TransactionResponse;
use crate::startup::AppState;

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<TransactionResponse>, AppError> {
    let transaction = state.checkout.transaction(&order_id).await?;
    Ok(Json(TransactionResponse {
        success: true,
        transaction,
    }))
}
