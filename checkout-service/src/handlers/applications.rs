use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{ApplicationsQuery, ApplicationsResponse, SubmitApplicationResponse};
use crate::models::ApplicationFilter;
use crate::services::ApplicationSubmission;
use crate::startup::AppState;

const MAX_LIMIT: u32 = 200;

pub async fn submit_application(
    State(state): State<AppState>,
    Json(payload): Json<ApplicationSubmission>,
) -> Result<(StatusCode, Json<SubmitApplicationResponse>), AppError> {
    let application = state.applications.submit(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitApplicationResponse {
            success: true,
            message: "Application submitted successfully".to_string(),
            application_id: application.id,
        }),
    ))
}

/// Applications newest first. `email` takes priority over `orderId`.
pub async fn list_applications(
    State(state): State<AppState>,
    Query(query): Query<ApplicationsQuery>,
) -> Result<Json<ApplicationsResponse>, AppError> {
    let defaults = ApplicationFilter::default();
    let filter = ApplicationFilter {
        email: query.email.filter(|e| !e.trim().is_empty()),
        order_id: query.order_id.filter(|o| !o.trim().is_empty()),
        limit: query.limit.unwrap_or(defaults.limit).clamp(1, MAX_LIMIT),
    };

    let applications = state.applications.list(&filter).await?;

    Ok(Json(ApplicationsResponse {
        success: true,
        count: applications.len(),
        applications,
    }))
}
