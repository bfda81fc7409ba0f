//! Invoice numbering, persistence and email delivery.
//!
//! One invoice is issued per purchased line. Lines are dispatched
//! concurrently and every line settles independently: a failure on one
//! never aborts the others, and the caller receives a batch partitioned
//! into successes and failures naming the step that broke.

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use service_core::utils::retry::{retry_async, RetryConfig};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use crate::config::InvoiceSenderConfig;
use crate::models::{format_invoice_number, invoice_month, CustomerInfo, Invoice, PaymentStatus};
use crate::services::email::{EmailError, EmailMessage, EmailProvider, EmailReceipt};
use crate::services::metrics;
use crate::services::store::{CheckoutStore, StoreError};
use crate::services::template::{invoice_subject, render_invoice};

/// Reservations attempted before giving up on a number that keeps colliding.
const MAX_NUMBERING_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStep {
    Numbering,
    Persist,
    Render,
    Send,
}

impl InvoiceStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStep::Numbering => "numbering",
            InvoiceStep::Persist => "persist",
            InvoiceStep::Render => "render",
            InvoiceStep::Send => "send",
        }
    }
}

#[derive(Debug, Error)]
pub enum InvoiceStepError {
    #[error("Failed to allocate invoice number: {0}")]
    Numbering(StoreError),

    #[error("Failed to save invoice: {0}")]
    Persist(StoreError),

    #[error("Failed to render invoice: {0}")]
    Render(#[from] askama::Error),

    #[error("Failed to send invoice email: {0}")]
    Send(#[from] EmailError),
}

impl InvoiceStepError {
    pub fn step(&self) -> InvoiceStep {
        match self {
            InvoiceStepError::Numbering(_) => InvoiceStep::Numbering,
            InvoiceStepError::Persist(_) => InvoiceStep::Persist,
            InvoiceStepError::Render(_) => InvoiceStep::Render,
            InvoiceStepError::Send(_) => InvoiceStep::Send,
        }
    }
}

/// A line to invoice. `amount` is the net charge in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceLine {
    pub plan_id: String,
    pub plan_title: String,
    pub amount: u64,
}

/// Order-level facts shared by every invoice of one checkout.
#[derive(Debug, Clone)]
pub struct InvoiceContext {
    pub customer: CustomerInfo,
    pub order_id: String,
    pub payment_id: Option<String>,
    pub currency: String,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedInvoice {
    pub plan_id: String,
    pub plan_title: String,
    pub invoice_number: String,
    pub amount: u64,
    pub email_message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFailure {
    pub plan_id: String,
    pub plan_title: String,
    pub step: InvoiceStep,
    /// Set once the invoice row exists, so a send failure can be re-driven.
    pub invoice_number: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceBatch {
    pub successful: Vec<IssuedInvoice>,
    pub failed: Vec<InvoiceFailure>,
}

impl InvoiceBatch {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Failure of a single invoice, carrying the number if the row was saved.
#[derive(Debug)]
pub struct IssueError {
    pub invoice_number: Option<String>,
    pub source: InvoiceStepError,
}

#[derive(Clone)]
pub struct InvoiceDispatcher {
    store: Arc<dyn CheckoutStore>,
    email: Arc<dyn EmailProvider>,
    sender: InvoiceSenderConfig,
    retry: RetryConfig,
}

impl InvoiceDispatcher {
    pub fn new(
        store: Arc<dyn CheckoutStore>,
        email: Arc<dyn EmailProvider>,
        sender: InvoiceSenderConfig,
    ) -> Self {
        Self {
            store,
            email,
            sender,
            retry: RetryConfig::single_retry(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Issue one invoice per line concurrently and wait for all to settle.
    pub async fn issue_all(&self, lines: Vec<InvoiceLine>, ctx: &InvoiceContext) -> InvoiceBatch {
        let results = join_all(lines.into_iter().map(|line| async move {
            let outcome = self.issue(&line, ctx).await;
            (line, outcome)
        }))
        .await;

        let mut batch = InvoiceBatch::default();
        for (line, outcome) in results {
            match outcome {
                Ok(issued) => batch.successful.push(issued),
                Err(err) => batch.failed.push(InvoiceFailure {
                    plan_id: line.plan_id,
                    plan_title: line.plan_title,
                    step: err.source.step(),
                    invoice_number: err.invoice_number,
                    error: err.source.to_string(),
                }),
            }
        }
        batch
    }

    /// Number, persist, render and email a single line.
    #[instrument(skip(self, ctx), fields(order_id = %ctx.order_id, plan_id = %line.plan_id))]
    pub async fn issue(
        &self,
        line: &InvoiceLine,
        ctx: &InvoiceContext,
    ) -> Result<IssuedInvoice, IssueError> {
        let draft = Invoice {
            invoice_number: String::new(),
            name: ctx.customer.name.clone(),
            email: ctx.customer.email.clone(),
            phone: ctx.customer.phone.clone(),
            razorpay_order_id: ctx.order_id.clone(),
            razorpay_payment_id: ctx.payment_id.clone(),
            plan_id: line.plan_id.clone(),
            plan_title: line.plan_title.clone(),
            amount: line.amount,
            currency: ctx.currency.clone(),
            payment_status: ctx.status,
            created_at: Utc::now(),
        };

        let invoice = self.persist_numbered(draft).await.map_err(|source| {
            self.report_failure(&line.plan_id, &ctx.customer.email, None, &source);
            IssueError {
                invoice_number: None,
                source,
            }
        })?;

        let receipt = self.deliver(&invoice).await.map_err(|source| {
            self.report_failure(
                &line.plan_id,
                &ctx.customer.email,
                Some(&invoice.invoice_number),
                &source,
            );
            IssueError {
                invoice_number: Some(invoice.invoice_number.clone()),
                source,
            }
        })?;

        metrics::record_invoice_issued();
        tracing::info!(invoice_number = %invoice.invoice_number, "Invoice issued");

        Ok(IssuedInvoice {
            plan_id: invoice.plan_id,
            plan_title: invoice.plan_title,
            invoice_number: invoice.invoice_number,
            amount: invoice.amount,
            email_message_id: receipt.message_id,
        })
    }

    /// Persist and email a caller-supplied invoice. A blank number gets the
    /// next number of the current month.
    pub async fn send_standalone(
        &self,
        invoice: Invoice,
    ) -> Result<(Invoice, EmailReceipt), IssueError> {
        let invoice = if invoice.invoice_number.trim().is_empty() {
            self.persist_numbered(invoice).await
        } else {
            self.store
                .insert_invoice(&invoice)
                .await
                .map(|_| invoice)
                .map_err(InvoiceStepError::Persist)
        }
        .map_err(|source| IssueError {
            invoice_number: None,
            source,
        })?;

        let receipt = self.deliver(&invoice).await.map_err(|source| {
            self.report_failure(
                &invoice.plan_id,
                &invoice.email,
                Some(&invoice.invoice_number),
                &source,
            );
            IssueError {
                invoice_number: Some(invoice.invoice_number.clone()),
                source,
            }
        })?;

        metrics::record_invoice_issued();
        Ok((invoice, receipt))
    }

    /// Reserve a number and insert, reserving again if the number is taken.
    async fn persist_numbered(&self, mut draft: Invoice) -> Result<Invoice, InvoiceStepError> {
        let month = invoice_month(draft.created_at);
        let mut last_conflict = None;

        for attempt in 1..=MAX_NUMBERING_ATTEMPTS {
            let sequence = self
                .store
                .reserve_invoice_sequence(&month)
                .await
                .map_err(InvoiceStepError::Numbering)?;
            draft.invoice_number = format_invoice_number(&month, sequence);

            match self.store.insert_invoice(&draft).await {
                Ok(()) => return Ok(draft),
                Err(StoreError::Duplicate(number)) => {
                    tracing::warn!(
                        invoice_number = %number,
                        attempt,
                        "Invoice number already taken, reserving another"
                    );
                    last_conflict = Some(number);
                }
                Err(err) => return Err(InvoiceStepError::Persist(err)),
            }
        }

        Err(InvoiceStepError::Numbering(StoreError::Duplicate(
            last_conflict.unwrap_or_default(),
        )))
    }

    async fn deliver(&self, invoice: &Invoice) -> Result<EmailReceipt, InvoiceStepError> {
        let html = render_invoice(invoice)?;
        let message = EmailMessage {
            to: invoice.email.clone(),
            subject: invoice_subject(&invoice.invoice_number),
            html_body: html,
            from_email: self.sender.from_email.clone(),
            from_name: self.sender.from_name.clone(),
        };

        let receipt = retry_async(
            &self.retry,
            "send_invoice_email",
            || self.email.send(&message),
            EmailError::is_transient,
        )
        .await?;
        Ok(receipt)
    }

    fn report_failure(
        &self,
        plan_id: &str,
        recipient: &str,
        invoice_number: Option<&str>,
        err: &InvoiceStepError,
    ) {
        metrics::record_invoice_failed(err.step().as_str());
        tracing::error!(
            %plan_id,
            %recipient,
            invoice_number = invoice_number.unwrap_or("-"),
            step = err.step().as_str(),
            error = %err,
            "Invoice dispatch failed"
        );
    }
}
