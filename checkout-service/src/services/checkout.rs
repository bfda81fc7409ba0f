//! Order creation and payment confirmation.
//!
//! Every amount a client declares is re-derived from the catalog before it
//! is trusted: at order creation the declared payable must match the quote,
//! and at confirmation the cart is priced again and checked against the
//! gateway's own view of the order.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::error::CheckoutError;
use crate::models::{CustomerInfo, NewTransaction, PaymentStatus, TransactionRecord};
use crate::services::coupons::{Coupon, CouponBook};
use crate::services::invoice::{InvoiceBatch, InvoiceContext, InvoiceDispatcher, InvoiceLine};
use crate::services::metrics;
use crate::services::pricing::{quote, LineRequest, PricingError, Quote};
use crate::services::razorpay::{
    PaymentEntity, PaymentGateway, RazorpaySignatures, WebhookEvent,
};
use crate::services::store::{CheckoutStore, StoreError};

/// Prefix of order ids minted for zero-amount checkouts.
pub const FREE_ORDER_PREFIX: &str = "free_";
/// Payment id recorded for zero-amount checkouts.
pub const FREE_PAYMENT_ID: &str = "FREE";

pub fn is_free_order(order_id: &str) -> bool {
    order_id.starts_with(FREE_ORDER_PREFIX)
}

impl From<PricingError> for CheckoutError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::UnknownPlan(id) => CheckoutError::InvalidPlan(id),
            other => CheckoutError::InvalidRequest(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Payable the client computed, minor units.
    pub amount: u64,
    pub lines: Vec<LineRequest>,
    pub coupon_code: Option<String>,
}

/// Reference handed to the client-side checkout widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// True when no gateway order exists and the client should confirm
    /// directly with the free sentinels.
    pub free: bool,
}

#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub order_id: String,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
    pub cart_items: Vec<LineRequest>,
    pub customer: CustomerInfo,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub transaction: TransactionRecord,
    pub invoices: InvoiceBatch,
    /// Confirmation view URL carrying what it needs to render.
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied {
        order_id: String,
        status: PaymentStatus,
    },
    UnknownOrder {
        order_id: String,
    },
    Ignored {
        event: String,
    },
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn CheckoutStore>,
    gateway: Arc<dyn PaymentGateway>,
    signatures: RazorpaySignatures,
    coupons: Arc<CouponBook>,
    invoices: InvoiceDispatcher,
    currency: String,
    storefront_url: String,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn CheckoutStore>,
        gateway: Arc<dyn PaymentGateway>,
        signatures: RazorpaySignatures,
        coupons: Arc<CouponBook>,
        invoices: InvoiceDispatcher,
        currency: impl Into<String>,
        storefront_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            signatures,
            coupons,
            invoices,
            currency: currency.into(),
            storefront_url: storefront_url.into(),
        }
    }

    pub fn coupons(&self) -> &CouponBook {
        &self.coupons
    }

    fn coupon(&self, code: Option<&str>) -> Result<Option<&Coupon>, CheckoutError> {
        match code.map(str::trim).filter(|c| !c.is_empty()) {
            None => Ok(None),
            Some(code) => self
                .coupons
                .lookup(code)
                .map(Some)
                .ok_or_else(|| CheckoutError::InvalidCoupon(code.to_string())),
        }
    }

    async fn price(
        &self,
        lines: &[LineRequest],
        coupon_code: Option<&str>,
    ) -> Result<Quote, CheckoutError> {
        let coupon = self.coupon(coupon_code)?;

        let mut ids: Vec<String> = lines.iter().map(|l| l.plan_id.clone()).collect();
        ids.sort();
        ids.dedup();
        let catalog = self.store.plans_by_ids(&ids).await?;

        Ok(quote(&catalog, lines, coupon)?)
    }

    /// Validate the declared amount and open a gateway order for it.
    #[instrument(skip(self, request), fields(amount = request.amount, lines = request.lines.len()))]
    pub async fn create_order(&self, request: OrderRequest) -> Result<OrderRef, CheckoutError> {
        let quote = self
            .price(&request.lines, request.coupon_code.as_deref())
            .await?;

        if request.amount != quote.payable {
            tracing::warn!(
                declared = request.amount,
                expected = quote.payable,
                "Declared amount does not match catalog"
            );
            return Err(CheckoutError::AmountMismatch {
                declared: request.amount,
                expected: quote.payable,
            });
        }

        if quote.payable == 0 {
            let id = format!("{}{}", FREE_ORDER_PREFIX, Uuid::new_v4().simple());
            tracing::info!(order_id = %id, "Zero-amount cart, skipping gateway order");
            metrics::record_order_created("free");
            return Ok(OrderRef {
                id,
                amount: 0,
                currency: self.currency.clone(),
                receipt: None,
                key_id: None,
                free: true,
            });
        }

        let receipt = format!(
            "receipt_{}_{}",
            Utc::now().timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let notes = order_notes(
            &quote.plan_ids(),
            quote.coupon.as_ref().map(|c| c.code.as_str()),
        );

        let order = self
            .gateway
            .create_order(quote.payable, &self.currency, &receipt, Some(notes))
            .await?;
        metrics::record_order_created("gateway");

        Ok(OrderRef {
            id: order.id,
            amount: order.amount,
            currency: order.currency,
            receipt: Some(receipt),
            key_id: Some(self.gateway.key_id().to_string()),
            free: false,
        })
    }

    /// Verify a payment, record it, issue invoices and build the redirect.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn confirm_payment(
        &self,
        request: ConfirmRequest,
    ) -> Result<Confirmation, CheckoutError> {
        request.customer.validate()?;
        if request.cart_items.is_empty() {
            return Err(CheckoutError::InvalidRequest("Cart is empty".to_string()));
        }

        let quote = self
            .price(&request.cart_items, request.coupon_code.as_deref())
            .await?;

        let (payment_id, status) = if is_free_order(&request.order_id) {
            self.check_free(&request, &quote)?
        } else {
            self.check_paid(&request, &quote).await?
        };

        let transaction = self
            .store
            .record_transaction(NewTransaction {
                customer: request.customer.clone(),
                razorpay_order_id: request.order_id.clone(),
                razorpay_payment_id: Some(payment_id.clone()),
                plan_ids: quote.plan_ids(),
                plan_titles: quote.plan_titles(),
                total_amount: quote.payable,
                currency: self.currency.clone(),
                payment_status: status,
            })
            .await
            .map_err(|err| match err {
                StoreError::Duplicate(order_id) => {
                    tracing::warn!(%order_id, "Order already recorded");
                    CheckoutError::DuplicateOrder(order_id)
                }
                other => {
                    tracing::error!(
                        order_id = %request.order_id,
                        payment_id = %payment_id,
                        recipient = %request.customer.email,
                        error = %other,
                        "Failed to record transaction"
                    );
                    CheckoutError::RecordFailed {
                        order_id: request.order_id.clone(),
                    }
                }
            })?;
        metrics::record_transaction(status.as_str());
        tracing::info!(
            transaction_id = %transaction.id,
            status = %status,
            total = transaction.total_amount,
            "Transaction recorded"
        );

        let lines: Vec<InvoiceLine> = quote
            .lines
            .iter()
            .zip(quote.net_amounts())
            .map(|(line, amount)| InvoiceLine {
                plan_id: line.plan_id.clone(),
                plan_title: line.title.clone(),
                amount,
            })
            .collect();
        let ctx = InvoiceContext {
            customer: request.customer.clone(),
            order_id: request.order_id.clone(),
            payment_id: Some(payment_id),
            currency: self.currency.clone(),
            status,
        };
        let invoices = self.invoices.issue_all(lines, &ctx).await;
        if !invoices.all_succeeded() {
            tracing::warn!(
                failed = invoices.failed.len(),
                succeeded = invoices.successful.len(),
                "Some invoices need manual follow-up"
            );
        }

        let redirect_url = self.confirmation_url(&quote, &request.customer)?;

        Ok(Confirmation {
            transaction,
            invoices,
            redirect_url,
        })
    }

    fn check_free(
        &self,
        request: &ConfirmRequest,
        quote: &Quote,
    ) -> Result<(String, PaymentStatus), CheckoutError> {
        if let Some(payment_id) = request.payment_id.as_deref() {
            if payment_id != FREE_PAYMENT_ID {
                return Err(CheckoutError::InvalidRequest(
                    "Free orders carry no gateway payment".to_string(),
                ));
            }
        }
        if quote.payable != 0 {
            tracing::warn!(expected = quote.payable, "Free confirmation for a paid cart");
            return Err(CheckoutError::AmountMismatch {
                declared: 0,
                expected: quote.payable,
            });
        }
        Ok((FREE_PAYMENT_ID.to_string(), PaymentStatus::Completed))
    }

    async fn check_paid(
        &self,
        request: &ConfirmRequest,
        quote: &Quote,
    ) -> Result<(String, PaymentStatus), CheckoutError> {
        let payment_id = request
            .payment_id
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| CheckoutError::InvalidRequest("paymentId is required".to_string()))?;
        let signature = request
            .signature
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(CheckoutError::InvalidSignature)?;

        let valid = self
            .signatures
            .verify_payment(&request.order_id, payment_id, signature)
            .map_err(|e| {
                tracing::error!(error = %e, "Signature verification error");
                CheckoutError::InvalidSignature
            })?;
        if !valid {
            return Err(CheckoutError::InvalidSignature);
        }

        let order = self.gateway.fetch_order(&request.order_id).await?;
        if order.amount != quote.payable {
            tracing::warn!(
                order_id = %request.order_id,
                gateway_amount = order.amount,
                expected = quote.payable,
                "Gateway order amount does not match cart"
            );
            return Err(CheckoutError::AmountMismatch {
                declared: order.amount,
                expected: quote.payable,
            });
        }

        let status = if order.is_paid() {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Pending
        };
        Ok((payment_id.to_string(), status))
    }

    fn confirmation_url(
        &self,
        quote: &Quote,
        customer: &CustomerInfo,
    ) -> Result<String, CheckoutError> {
        let ids = to_json(&quote.plan_ids())?;
        let titles = to_json(&quote.plan_titles())?;
        let prices = to_json(&quote.lines.iter().map(|l| l.amount).collect::<Vec<_>>())?;
        let form_urls = to_json(
            &quote
                .lines
                .iter()
                .map(|l| l.google_form_url.clone())
                .collect::<Vec<_>>(),
        )?;
        let amount = quote.payable.to_string();

        let query = serde_urlencoded::to_string([
            ("planIds", ids.as_str()),
            ("planTitles", titles.as_str()),
            ("planPrices", prices.as_str()),
            ("planFormUrls", form_urls.as_str()),
            ("amount", amount.as_str()),
            ("name", customer.name.as_str()),
            ("email", customer.email.as_str()),
            ("phone", customer.phone.as_str()),
        ])
        .map_err(|e| CheckoutError::InvalidRequest(e.to_string()))?;

        Ok(format!("{}/payment-success?{}", self.storefront_url, query))
    }

    pub async fn capture_payment(
        &self,
        payment_id: &str,
        amount: u64,
    ) -> Result<PaymentEntity, CheckoutError> {
        if payment_id.trim().is_empty() || amount == 0 {
            return Err(CheckoutError::InvalidRequest(
                "paymentId and a positive amount are required".to_string(),
            ));
        }
        Ok(self
            .gateway
            .capture_payment(payment_id, amount, &self.currency)
            .await?)
    }

    /// Apply a signed gateway webhook to the matching transaction.
    pub async fn apply_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, CheckoutError> {
        let signature = signature.ok_or(CheckoutError::InvalidSignature)?;
        let valid = self.signatures.verify_webhook(body, signature).map_err(|e| {
            tracing::error!(error = %e, "Webhook signature verification error");
            CheckoutError::InvalidSignature
        })?;
        if !valid {
            return Err(CheckoutError::InvalidSignature);
        }

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| CheckoutError::InvalidRequest(format!("Malformed webhook: {}", e)))?;

        let status = match event.event.as_str() {
            "payment.captured" | "order.paid" => PaymentStatus::Completed,
            "payment.failed" => PaymentStatus::Failed,
            _ => {
                tracing::debug!(event = %event.event, "Ignoring webhook event");
                return Ok(WebhookOutcome::Ignored { event: event.event });
            }
        };

        let Some(order_id) = event.order_id().map(str::to_string) else {
            tracing::warn!(event = %event.event, "Webhook without order id");
            return Ok(WebhookOutcome::Ignored { event: event.event });
        };

        match self.store.update_transaction_status(&order_id, status).await {
            Ok(record) => {
                tracing::info!(%order_id, status = %record.payment_status, "Transaction status updated");
                Ok(WebhookOutcome::Applied {
                    order_id,
                    status: record.payment_status,
                })
            }
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(%order_id, event = %event.event, "Webhook for unknown order");
                Ok(WebhookOutcome::UnknownOrder { order_id })
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn transaction(&self, order_id: &str) -> Result<TransactionRecord, CheckoutError> {
        self.store
            .transaction_by_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(format!("Transaction for order {}", order_id)))
    }
}

/// Gateway notes are flat string pairs.
fn order_notes(plan_ids: &[String], coupon: Option<&str>) -> serde_json::Value {
    let mut notes = serde_json::Map::new();
    notes.insert("planIds".into(), plan_ids.join(",").into());
    if let Some(code) = coupon {
        notes.insert("coupon".into(), code.into());
    }
    serde_json::Value::Object(notes)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CheckoutError> {
    serde_json::to_string(value).map_err(|e| CheckoutError::InvalidRequest(e.to_string()))
}
