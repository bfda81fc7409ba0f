//! Invoice lookup and the standalone send endpoint.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{
    InvoiceQuery, InvoiceResponse, InvoicesResponse, SendInvoiceRequest, SendInvoiceResponse,
};
use crate::error::CheckoutError;
use crate::services::invoice::{InvoiceStepError, IssueError};
use crate::services::store::StoreError;
use crate::startup::AppState;

fn issue_error(err: IssueError) -> AppError {
    match err.source {
        InvoiceStepError::Persist(StoreError::Duplicate(number)) => {
            AppError::Conflict(anyhow::anyhow!("Invoice {} already exists", number))
        }
        InvoiceStepError::Numbering(e) | InvoiceStepError::Persist(e) => {
            AppError::DatabaseError(anyhow::Error::new(e))
        }
        InvoiceStepError::Render(e) => AppError::InternalError(anyhow::Error::new(e)),
        InvoiceStepError::Send(e) => AppError::EmailError(match err.invoice_number {
            Some(number) => format!("Invoice {} was saved but not delivered: {}", number, e),
            None => e.to_string(),
        }),
    }
}

/// Persist, render and email one invoice.
pub async fn send_invoice(
    State(state): State<AppState>,
    Json(payload): Json<SendInvoiceRequest>,
) -> Result<Json<SendInvoiceResponse>, AppError> {
    payload.validate()?;

    let invoice = payload.into_invoice(&state.currency);
    tracing::info!(
        order_id = %invoice.razorpay_order_id,
        plan_id = %invoice.plan_id,
        "Sending standalone invoice"
    );

    let (invoice, receipt) = state
        .invoices
        .send_standalone(invoice)
        .await
        .map_err(issue_error)?;

    Ok(Json(SendInvoiceResponse {
        success: true,
        invoice_number: invoice.invoice_number,
        email_message_id: receipt.message_id,
    }))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_number): Path<String>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state
        .store
        .get_invoice(&invoice_number)
        .await
        .map_err(CheckoutError::from)?
        .ok_or_else(|| CheckoutError::NotFound(format!("Invoice {}", invoice_number)))?;

    Ok(Json(InvoiceResponse {
        success: true,
        invoice,
    }))
}

/// Invoices for one customer, newest first.
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<InvoicesResponse>, AppError> {
    let email = query
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| CheckoutError::InvalidRequest("email is required".to_string()))?;

    let mut invoices = state
        .store
        .invoices_by_email(&email)
        .await
        .map_err(CheckoutError::from)?;
    invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(InvoicesResponse {
        success: true,
        count: invoices.len(),
        invoices,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email::EmailError;
    use axum::http::StatusCode;

    #[test]
    fn duplicate_supplied_number_is_a_conflict() {
        let err = issue_error(IssueError {
            invoice_number: None,
            source: InvoiceStepError::Persist(StoreError::Duplicate("INV-202610-0001".into())),
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn delivery_failure_names_the_saved_invoice() {
        let err = issue_error(IssueError {
            invoice_number: Some("INV-202610-0007".into()),
            source: InvoiceStepError::Send(EmailError::Timeout),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("INV-202610-0007"));
    }
}
