#![allow(dead_code)]

use async_trait::async_trait;
use checkout_service::config::InvoiceSenderConfig;
use checkout_service::models::Plan;
use checkout_service::services::razorpay::{GatewayError, GatewayOrder, PaymentEntity};
use checkout_service::services::{
    ApplicationService, CheckoutService, CouponBook, InvoiceDispatcher, MemoryObjectStorage,
    MemoryStore, MockEmailProvider, PaymentGateway, RazorpaySignatures,
};
use checkout_service::startup::{AppState, Application};
use secrecy::Secret;
use serde_json::Value;
use service_core::utils::signature::hmac_sha256_hex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";
pub const STOREFRONT_URL: &str = "http://storefront.test";

pub fn plan(id: &str, title: &str, price: u64) -> Plan {
    Plan {
        id: id.to_string(),
        title: title.to_string(),
        price,
        original_price: None,
        description: format!("{} description", title),
        features: vec!["Curated matches".to_string()],
        popular: false,
        period: Some("Monthly".to_string()),
        google_form_url: Some(format!("https://forms.example/{}", id)),
    }
}

pub fn catalog() -> Vec<Plan> {
    vec![
        plan("gold", "Gold Match", 149_900),
        plan("silver", "Silver Match", 99_900),
        plan("bronze", "Bronze Match", 49_900),
        plan("mixer", "Community Mixer", 0),
    ]
}

/// In-process stand-in for the Razorpay Orders API.
#[derive(Default)]
pub struct FakeGateway {
    orders: Mutex<HashMap<String, GatewayOrder>>,
    create_calls: AtomicUsize,
    captures: AtomicUsize,
}

impl FakeGateway {
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn capture_calls(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    /// Register an order as if it had been created out of band.
    pub fn put_order(&self, id: &str, amount: u64, status: &str) {
        self.orders.lock().unwrap().insert(
            id.to_string(),
            GatewayOrder {
                id: id.to_string(),
                amount,
                currency: "INR".to_string(),
                receipt: None,
                status: status.to_string(),
                amount_paid: if status == "paid" { amount } else { 0 },
            },
        );
    }

    pub fn mark_paid(&self, id: &str) {
        if let Some(order) = self.orders.lock().unwrap().get_mut(id) {
            order.status = "paid".to_string();
            order.amount_paid = order.amount;
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> &str {
        "rzp_test_key"
    }

    async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt: &str,
        _notes: Option<Value>,
    ) -> Result<GatewayOrder, GatewayError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let order = GatewayOrder {
            id: format!("order_test_{}", n),
            amount,
            currency: currency.to_string(),
            receipt: Some(receipt.to_string()),
            status: "created".to_string(),
            amount_paid: 0,
        };
        self.orders
            .lock()
            .unwrap()
            .insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        self.orders
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                status: 400,
                code: "BAD_REQUEST_ERROR".to_string(),
                description: "The id provided does not exist".to_string(),
            })
    }

    async fn capture_payment(
        &self,
        payment_id: &str,
        amount: u64,
        currency: &str,
    ) -> Result<PaymentEntity, GatewayError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentEntity {
            id: payment_id.to_string(),
            amount,
            currency: currency.to_string(),
            status: "captured".to_string(),
            order_id: None,
            method: Some("upi".to_string()),
            email: None,
            captured: Some(true),
        })
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: MemoryStore,
    pub gateway: Arc<FakeGateway>,
    pub email: Arc<MockEmailProvider>,
    pub storage: MemoryObjectStorage,
    pub signatures: RazorpaySignatures,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_email(MockEmailProvider::new()).await
    }

    pub async fn spawn_with_email(email: MockEmailProvider) -> Self {
        let store = MemoryStore::with_plans(catalog());
        let gateway = Arc::new(FakeGateway::default());
        let email = Arc::new(email);
        let storage = MemoryObjectStorage::new();
        let signatures = RazorpaySignatures::new(
            Secret::new(KEY_SECRET.to_string()),
            Secret::new(WEBHOOK_SECRET.to_string()),
        );

        let shared_store = Arc::new(store.clone());
        let invoices = InvoiceDispatcher::new(
            shared_store.clone(),
            email.clone(),
            InvoiceSenderConfig {
                from_email: "support@downdating.test".to_string(),
                from_name: "DownDating".to_string(),
            },
        );
        let checkout = CheckoutService::new(
            shared_store.clone(),
            gateway.clone(),
            signatures.clone(),
            Arc::new(CouponBook::builtin()),
            invoices.clone(),
            "INR",
            STOREFRONT_URL,
        );
        let applications = ApplicationService::new(shared_store.clone(), Arc::new(storage.clone()));

        let state = AppState {
            store: shared_store,
            checkout,
            invoices,
            applications,
            currency: "INR".to_string(),
            storefront_url: STOREFRONT_URL.to_string(),
            service_name: "checkout-service".to_string(),
        };

        let app = Application::with_state(state, 0)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let address = format!("http://127.0.0.1:{}", port);

        for _ in 0..50 {
            if client
                .get(format!("{}/ready", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            port,
            store,
            gateway,
            email,
            storage,
            signatures,
            client,
        }
    }

    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub fn sign_payment(&self, order_id: &str, payment_id: &str) -> String {
        self.signatures.sign_payment(order_id, payment_id).unwrap()
    }

    pub fn sign_webhook(&self, body: &[u8]) -> String {
        hmac_sha256_hex(WEBHOOK_SECRET, body).unwrap()
    }

    /// Create an order through the API and return its id.
    pub async fn create_order(&self, amount: u64, plan_ids: &[&str]) -> String {
        let response = self
            .post(
                "/orders",
                &serde_json::json!({ "amount": amount, "planIds": plan_ids }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        body["order"]["id"].as_str().unwrap().to_string()
    }
}

pub fn customer_json() -> Value {
    serde_json::json!({
        "name": "Asha Rao",
        "email": "asha@example.com",
        "phone": "9876543210"
    })
}

pub fn cart_json(ids: &[&str]) -> Value {
    Value::Array(
        ids.iter()
            .map(|id| serde_json::json!({ "id": id, "title": id, "price": 1, "category": "Plan" }))
            .collect(),
    )
}
