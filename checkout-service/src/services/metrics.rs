use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static ORDERS_CREATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static TRANSACTIONS_RECORDED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static INVOICES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Install the HTTP metrics recorder and register checkout counters.
/// Calling it again is a no-op.
pub fn init_metrics() -> anyhow::Result<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    let _ = METRICS_HANDLE.set(handle);

    let registry = Registry::new();

    let orders = IntCounterVec::new(
        Opts::new(
            "checkout_orders_created_total",
            "Orders created, by kind (gateway or free)",
        ),
        &["kind"],
    )?;
    let transactions = IntCounterVec::new(
        Opts::new(
            "checkout_transactions_recorded_total",
            "Transaction records written, by payment status",
        ),
        &["status"],
    )?;
    let invoices = IntCounterVec::new(
        Opts::new(
            "checkout_invoices_total",
            "Invoice dispatch outcomes, by outcome and failing step",
        ),
        &["outcome", "step"],
    )?;

    registry.register(Box::new(orders.clone()))?;
    registry.register(Box::new(transactions.clone()))?;
    registry.register(Box::new(invoices.clone()))?;

    let _ = PROMETHEUS_REGISTRY.set(registry);
    let _ = ORDERS_CREATED_TOTAL.set(orders);
    let _ = TRANSACTIONS_RECORDED_TOTAL.set(transactions);
    let _ = INVOICES_TOTAL.set(invoices);
    Ok(())
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&registry.gather(), &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

pub fn record_order_created(kind: &str) {
    if let Some(counter) = ORDERS_CREATED_TOTAL.get() {
        counter.with_label_values(&[kind]).inc();
    }
}

pub fn record_transaction(status: &str) {
    if let Some(counter) = TRANSACTIONS_RECORDED_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}

pub fn record_invoice_issued() {
    if let Some(counter) = INVOICES_TOTAL.get() {
        counter.with_label_values(&["issued", "none"]).inc();
    }
}

pub fn record_invoice_failed(step: &str) {
    if let Some(counter) = INVOICES_TOTAL.get() {
        counter.with_label_values(&["failed", step]).inc();
    }
}
