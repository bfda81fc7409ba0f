//! Catalog endpoints and the add-to-cart deep link.

use axum::{
    extract::{Path, State},
    response::Redirect,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{PlanFormsRequest, PlanFormsResponse, PlanResponse, PlansResponse};
use crate::error::CheckoutError;
use crate::models::FormUrl;
use crate::startup::AppState;
use crate::storefront::CartItem;

pub async fn list_plans(State(state): State<AppState>) -> Result<Json<PlansResponse>, AppError> {
    let mut plans = state
        .store
        .list_plans()
        .await
        .map_err(CheckoutError::from)?;
    plans.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(Json(PlansResponse {
        success: true,
        plans,
    }))
}

pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<PlanResponse>, AppError> {
    let plan = state
        .store
        .get_plan(&plan_id)
        .await
        .map_err(CheckoutError::from)?
        .ok_or_else(|| CheckoutError::NotFound(format!("Plan {}", plan_id)))?;

    Ok(Json(PlanResponse {
        success: true,
        plan,
    }))
}

/// Form URLs for the requested plans, in request order. Unknown ids are
/// left out.
pub async fn plan_forms(
    State(state): State<AppState>,
    Json(payload): Json<PlanFormsRequest>,
) -> Result<Json<PlanFormsResponse>, AppError> {
    if payload.plan_ids.is_empty() {
        return Err(CheckoutError::InvalidRequest("Plan IDs are required".to_string()).into());
    }

    let plans = state
        .store
        .plans_by_ids(&payload.plan_ids)
        .await
        .map_err(CheckoutError::from)?;

    let forms = payload
        .plan_ids
        .iter()
        .filter_map(|id| plans.iter().find(|p| &p.id == id))
        .map(FormUrl::from)
        .collect();

    Ok(Json(PlanFormsResponse {
        success: true,
        forms,
    }))
}

/// Redirect into the storefront cart with the plan pre-selected.
pub async fn add_to_cart(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Redirect {
    let root = format!("{}/", state.storefront_url);

    let plan = match state.store.get_plan(plan_id.trim()).await {
        Ok(Some(plan)) => plan,
        Ok(None) => {
            tracing::warn!(%plan_id, "Add-to-cart for unknown plan");
            return Redirect::to(&root);
        }
        Err(e) => {
            tracing::error!(%plan_id, error = %e, "Plan lookup failed");
            return Redirect::to(&root);
        }
    };

    let item = CartItem::from(&plan);
    let query = serde_json::to_string(&item)
        .map_err(|e| e.to_string())
        .and_then(|json| serde_urlencoded::to_string([("addPlan", json)]).map_err(|e| e.to_string()));

    match query {
        Ok(query) => Redirect::to(&format!("{}/cart?{}", state.storefront_url, query)),
        Err(e) => {
            tracing::error!(%plan_id, error = %e, "Failed to encode cart item");
            Redirect::to(&root)
        }
    }
}
