//! Application wiring and server lifecycle.

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use service_core::middleware::{metrics::metrics_middleware, tracing::trace_requests};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::{CheckoutConfig, DatabaseConfig, EmailConfig};
use crate::handlers;
use crate::models::Plan;
use crate::services::{
    ApplicationService, CheckoutService, CheckoutStore, CouponBook, EmailProvider,
    HttpObjectStorage, InvoiceDispatcher, MemoryObjectStorage, MemoryStore, MockEmailProvider,
    MongoRepository, ObjectStorage, PaymentGateway, RazorpayClient, RazorpaySignatures,
    SendGridProvider, SmtpProvider,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CheckoutStore>,
    pub checkout: CheckoutService,
    pub invoices: InvoiceDispatcher,
    pub applications: ApplicationService,
    pub currency: String,
    pub storefront_url: String,
    pub service_name: String,
}

/// Read a JSON array of plans used to seed the in-memory catalog.
pub fn load_plan_seed(path: impl AsRef<Path>) -> anyhow::Result<Vec<Plan>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading plan seed {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing plan seed {}", path.display()))
}

/// Connect backends and assemble the services.
pub async fn build_state(config: &CheckoutConfig) -> anyhow::Result<AppState> {
    let timeout = config.http_timeout;

    let store: Arc<dyn CheckoutStore> = match &config.database {
        DatabaseConfig::Mongo(mongo) => {
            let repository = MongoRepository::connect(mongo, timeout).await?;
            repository.init_indexes().await?;
            tracing::info!(database = %mongo.database, "Connected to MongoDB");
            Arc::new(repository)
        }
        DatabaseConfig::Memory { plans_seed_path } => {
            let plans = match plans_seed_path {
                Some(path) => load_plan_seed(path)?,
                None => Vec::new(),
            };
            tracing::warn!(plans = plans.len(), "Using in-memory store; data is not persisted");
            Arc::new(MemoryStore::with_plans(plans))
        }
    };

    let razorpay = RazorpayClient::new(&config.razorpay, timeout)?;
    if razorpay.is_configured() {
        tracing::info!("Razorpay client initialized");
    } else {
        tracing::warn!("Razorpay credentials not configured - paid checkout will fail");
    }
    let gateway: Arc<dyn PaymentGateway> = Arc::new(razorpay);

    let email: Arc<dyn EmailProvider> = match &config.email {
        EmailConfig::SendGrid(sendgrid) => {
            Arc::new(SendGridProvider::new(sendgrid.clone(), timeout)?)
        }
        EmailConfig::Smtp(smtp) => Arc::new(SmtpProvider::new(smtp, timeout)?),
        EmailConfig::Mock => {
            tracing::warn!("Using mock email provider; invoices are not delivered");
            Arc::new(MockEmailProvider::new())
        }
    };
    tracing::info!(provider = email.name(), "Email provider ready");

    let storage: Arc<dyn ObjectStorage> = match &config.storage {
        Some(storage) => Arc::new(HttpObjectStorage::new(storage.clone(), timeout)?),
        None => {
            tracing::warn!("Object storage not configured; screenshots are kept in memory");
            Arc::new(MemoryObjectStorage::new())
        }
    };

    let coupons = match &config.coupons_path {
        Some(path) => CouponBook::from_file(path)?,
        None => CouponBook::builtin(),
    };
    tracing::info!(coupons = coupons.len(), "Coupon book loaded");

    let invoices = InvoiceDispatcher::new(store.clone(), email, config.sender.clone());
    let checkout = CheckoutService::new(
        store.clone(),
        gateway,
        RazorpaySignatures::from_config(&config.razorpay),
        Arc::new(coupons),
        invoices.clone(),
        config.currency.clone(),
        config.storefront_url.clone(),
    );
    let applications = ApplicationService::new(store.clone(), storage);

    Ok(AppState {
        store,
        checkout,
        invoices,
        applications,
        currency: config.currency.clone(),
        storefront_url: config.storefront_url.clone(),
        service_name: config.service_name.clone(),
    })
}

fn cors_layer(storefront_url: &str) -> CorsLayer {
    let origin = match storefront_url.parse::<HeaderValue>() {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(e) => {
            tracing::error!("Invalid CORS origin '{}': {}. Allowing any origin.", storefront_url, e);
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Catalog
        .route("/plans", get(handlers::plans::list_plans))
        .route("/plans/forms", post(handlers::plans::plan_forms))
        .route("/plans/:id", get(handlers::plans::get_plan))
        .route("/add-to-cart/:plan_id", get(handlers::plans::add_to_cart))
        // Checkout
        .route("/coupons/apply", post(handlers::coupons::apply_coupon))
        .route("/orders", post(handlers::orders::create_order))
        .route("/payments/verify", post(handlers::payments::verify_payment))
        .route("/payments/capture", post(handlers::payments::capture_payment))
        .route("/webhooks/razorpay", post(handlers::payments::razorpay_webhook))
        .route(
            "/transactions/:order_id",
            get(handlers::transactions::get_transaction),
        )
        // Invoices
        .route("/invoices", get(handlers::invoices::list_invoices))
        .route("/invoices/send", post(handlers::invoices::send_invoice))
        .route("/invoices/:invoice_number", get(handlers::invoices::get_invoice))
        // Applications
        .route(
            "/applications",
            post(handlers::applications::submit_application)
                .get(handlers::applications::list_applications),
        )
        .layer(from_fn(metrics_middleware));

    trace_requests(routes)
        .layer(cors_layer(&state.storefront_url))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: CheckoutConfig) -> anyhow::Result<Self> {
        let state = build_state(&config).await?;
        Self::with_state(state, config.common.port).await
    }

    /// Bind `port` (0 picks a free one) and serve the given state.
    pub async fn with_state(state: AppState, port: u16) -> anyhow::Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {}", addr))?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!(port = self.port, "Listening");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
