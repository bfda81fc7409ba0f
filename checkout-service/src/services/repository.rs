//! MongoDB-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use mongodb::bson::{doc, to_bson};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Client, Collection, Database, IndexModel};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::config::MongoConfig;
use crate::models::{
    normalize_email, ApplicationFilter, ApplicationStatus, Invoice, NewTransaction,
    PaymentStatus, Plan, PlanApplication, TransactionRecord,
};
use crate::services::store::{
    ApplicationStore, CheckoutStore, InvoiceStore, PlanCatalog, StoreError, TransactionStore,
};

const DUPLICATE_KEY: i32 = 11000;

pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == DUPLICATE_KEY,
        ErrorKind::Command(ce) => ce.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn to_i64(value: u64, field: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Backend(anyhow::anyhow!("{} out of range", field)))
}

fn to_u64(value: i64, field: &str) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::Backend(anyhow::anyhow!("{} is negative: {}", field, value)))
}

#[derive(Debug, Serialize, Deserialize)]
struct PlanDocument {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    price: i64,
    #[serde(default)]
    original_price: Option<i64>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    popular: bool,
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    google_form_url: Option<String>,
}

impl TryFrom<PlanDocument> for Plan {
    type Error = StoreError;

    fn try_from(doc: PlanDocument) -> Result<Self, Self::Error> {
        Ok(Plan {
            price: to_u64(doc.price, "plan price")?,
            original_price: doc
                .original_price
                .map(|p| to_u64(p, "plan original price"))
                .transpose()?,
            id: doc.id,
            title: doc.title,
            description: doc.description,
            features: doc.features,
            popular: doc.popular,
            period: doc.period,
            google_form_url: doc.google_form_url,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TransactionDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    email: String,
    phone: String,
    razorpay_order_id: String,
    razorpay_payment_id: Option<String>,
    plan_ids: Vec<String>,
    plan_titles: Vec<String>,
    total_amount: i64,
    currency: String,
    payment_status: PaymentStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    updated_at: DateTime<Utc>,
}

impl TransactionDocument {
    fn from_record(r: &TransactionRecord) -> Result<Self, StoreError> {
        Ok(Self {
            id: r.id.clone(),
            name: r.name.clone(),
            email: r.email.clone(),
            phone: r.phone.clone(),
            razorpay_order_id: r.razorpay_order_id.clone(),
            razorpay_payment_id: r.razorpay_payment_id.clone(),
            plan_ids: r.plan_ids.clone(),
            plan_titles: r.plan_titles.clone(),
            total_amount: to_i64(r.total_amount, "total amount")?,
            currency: r.currency.clone(),
            payment_status: r.payment_status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }

    fn into_record(self) -> Result<TransactionRecord, StoreError> {
        Ok(TransactionRecord {
            total_amount: to_u64(self.total_amount, "total amount")?,
            id: self.id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            razorpay_order_id: self.razorpay_order_id,
            razorpay_payment_id: self.razorpay_payment_id,
            plan_ids: self.plan_ids,
            plan_titles: self.plan_titles,
            currency: self.currency,
            payment_status: self.payment_status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct InvoiceDocument {
    invoice_number: String,
    name: String,
    email: String,
    phone: String,
    razorpay_order_id: String,
    razorpay_payment_id: Option<String>,
    plan_id: String,
    plan_title: String,
    amount: i64,
    currency: String,
    payment_status: PaymentStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
}

impl InvoiceDocument {
    fn from_invoice(i: &Invoice) -> Result<Self, StoreError> {
        Ok(Self {
            invoice_number: i.invoice_number.clone(),
            name: i.name.clone(),
            email: normalize_email(&i.email),
            phone: i.phone.clone(),
            razorpay_order_id: i.razorpay_order_id.clone(),
            razorpay_payment_id: i.razorpay_payment_id.clone(),
            plan_id: i.plan_id.clone(),
            plan_title: i.plan_title.clone(),
            amount: to_i64(i.amount, "invoice amount")?,
            currency: i.currency.clone(),
            payment_status: i.payment_status,
            created_at: i.created_at,
        })
    }

    fn into_invoice(self) -> Result<Invoice, StoreError> {
        Ok(Invoice {
            amount: to_u64(self.amount, "invoice amount")?,
            invoice_number: self.invoice_number,
            name: self.name,
            email: self.email,
            phone: self.phone,
            razorpay_order_id: self.razorpay_order_id,
            razorpay_payment_id: self.razorpay_payment_id,
            plan_id: self.plan_id,
            plan_title: self.plan_title,
            currency: self.currency,
            payment_status: self.payment_status,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CounterDocument {
    #[serde(rename = "_id")]
    id: String,
    seq: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApplicationDocument {
    #[serde(rename = "_id")]
    id: String,
    plan_id: String,
    plan_title: String,
    plan_price: i64,
    name: String,
    instagram_id: String,
    email: String,
    phone: String,
    gender: String,
    interested_in: String,
    relationship_style: Option<String>,
    ideal_first_meeting: Option<String>,
    love_language: Option<String>,
    party_vibe: Option<String>,
    flirting_style: Option<String>,
    toxic_trait: Option<String>,
    bollywood_character: Option<String>,
    green_flag: Option<String>,
    perfect_date: Option<String>,
    pitch_yourself: Option<String>,
    razorpay_order_id: Option<String>,
    payment_screenshot_url: String,
    agree_to_terms: bool,
    agree_to_privacy: bool,
    status: ApplicationStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
}

impl ApplicationDocument {
    fn from_application(a: &PlanApplication) -> Result<Self, StoreError> {
        let a = a.clone();
        Ok(Self {
            plan_price: to_i64(a.plan_price, "plan price")?,
            id: a.id,
            plan_id: a.plan_id,
            plan_title: a.plan_title,
            name: a.name,
            instagram_id: a.instagram_id,
            email: normalize_email(&a.email),
            phone: a.phone,
            gender: a.gender,
            interested_in: a.interested_in,
            relationship_style: a.relationship_style,
            ideal_first_meeting: a.ideal_first_meeting,
            love_language: a.love_language,
            party_vibe: a.party_vibe,
            flirting_style: a.flirting_style,
            toxic_trait: a.toxic_trait,
            bollywood_character: a.bollywood_character,
            green_flag: a.green_flag,
            perfect_date: a.perfect_date,
            pitch_yourself: a.pitch_yourself,
            razorpay_order_id: a.razorpay_order_id,
            payment_screenshot_url: a.payment_screenshot_url,
            agree_to_terms: a.agree_to_terms,
            agree_to_privacy: a.agree_to_privacy,
            status: a.status,
            created_at: a.created_at,
        })
    }

    fn into_application(self) -> Result<PlanApplication, StoreError> {
        Ok(PlanApplication {
            plan_price: to_u64(self.plan_price, "plan price")?,
            id: self.id,
            plan_id: self.plan_id,
            plan_title: self.plan_title,
            name: self.name,
            instagram_id: self.instagram_id,
            email: self.email,
            phone: self.phone,
            gender: self.gender,
            interested_in: self.interested_in,
            relationship_style: self.relationship_style,
            ideal_first_meeting: self.ideal_first_meeting,
            love_language: self.love_language,
            party_vibe: self.party_vibe,
            flirting_style: self.flirting_style,
            toxic_trait: self.toxic_trait,
            bollywood_character: self.bollywood_character,
            green_flag: self.green_flag,
            perfect_date: self.perfect_date,
            pitch_yourself: self.pitch_yourself,
            razorpay_order_id: self.razorpay_order_id,
            payment_screenshot_url: self.payment_screenshot_url,
            agree_to_terms: self.agree_to_terms,
            agree_to_privacy: self.agree_to_privacy,
            status: self.status,
            created_at: self.created_at,
        })
    }
}

#[derive(Clone)]
pub struct MongoRepository {
    db: Database,
    plans: Collection<PlanDocument>,
    payments: Collection<TransactionDocument>,
    invoices: Collection<InvoiceDocument>,
    invoice_counters: Collection<CounterDocument>,
    applications: Collection<ApplicationDocument>,
}

impl MongoRepository {
    pub async fn connect(config: &MongoConfig, timeout: Duration) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(config.uri.expose_secret()).await?;
        options.app_name = Some("checkout-service".to_string());
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);

        let client = Client::with_options(options)?;
        Ok(Self::new(&client.database(&config.database)))
    }

    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            plans: db.collection("plans"),
            payments: db.collection("payments"),
            invoices: db.collection("invoices"),
            invoice_counters: db.collection("invoice_counters"),
            applications: db.collection("plan_applications"),
        }
    }

    /// Unique keys back the duplicate-order and duplicate-invoice checks.
    pub async fn init_indexes(&self) -> Result<(), StoreError> {
        let order_index = IndexModel::builder()
            .keys(doc! { "razorpay_order_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("payments_order_id_unique".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        self.payments.create_index(order_index, None).await?;

        let number_index = IndexModel::builder()
            .keys(doc! { "invoice_number": 1 })
            .options(
                IndexOptions::builder()
                    .name("invoices_number_unique".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("invoices_email_created_idx".to_string())
                    .build(),
            )
            .build();
        self.invoices
            .create_indexes([number_index, email_index], None)
            .await?;

        let app_email_index = IndexModel::builder()
            .keys(doc! { "email": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("applications_email_created_idx".to_string())
                    .build(),
            )
            .build();
        let app_order_index = IndexModel::builder()
            .keys(doc! { "razorpay_order_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("applications_order_id_idx".to_string())
                    .build(),
            )
            .build();
        self.applications
            .create_indexes([app_email_index, app_order_index], None)
            .await?;

        tracing::info!("Checkout service indexes initialized");
        Ok(())
    }

    async fn increment_counter(&self, month: &str) -> Result<Option<CounterDocument>, mongodb::error::Error> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        self.invoice_counters
            .find_one_and_update(doc! { "_id": month }, doc! { "$inc": { "seq": 1_i64 } }, options)
            .await
    }
}

#[async_trait]
impl PlanCatalog for MongoRepository {
    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let docs: Vec<PlanDocument> = self.plans.find(doc! {}, options).await?.try_collect().await?;
        docs.into_iter().map(Plan::try_from).collect()
    }

    async fn get_plan(&self, id: &str) -> Result<Option<Plan>, StoreError> {
        self.plans
            .find_one(doc! { "_id": id }, None)
            .await?
            .map(Plan::try_from)
            .transpose()
    }

    async fn plans_by_ids(&self, ids: &[String]) -> Result<Vec<Plan>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let docs: Vec<PlanDocument> = self
            .plans
            .find(doc! { "_id": { "$in": ids.to_vec() } }, options)
            .await?
            .try_collect()
            .await?;
        docs.into_iter().map(Plan::try_from).collect()
    }
}

#[async_trait]
impl TransactionStore for MongoRepository {
    #[instrument(skip(self, transaction), fields(order_id = %transaction.razorpay_order_id))]
    async fn record_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        let record = transaction.into_record(Uuid::new_v4().to_string(), Utc::now());
        let document = TransactionDocument::from_record(&record)?;

        match self.payments.insert_one(document, None).await {
            Ok(_) => Ok(record),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate(record.razorpay_order_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn transaction_by_order(
        &self,
        order_id: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        self.payments
            .find_one(doc! { "razorpay_order_id": order_id }, None)
            .await?
            .map(TransactionDocument::into_record)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn update_transaction_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
    ) -> Result<TransactionRecord, StoreError> {
        // Only pending rows move; the filter makes the check and the write atomic.
        let filter = doc! {
            "razorpay_order_id": order_id,
            "payment_status": to_bson(&PaymentStatus::Pending)?,
        };
        let update = doc! {
            "$set": {
                "payment_status": to_bson(&status)?,
                "updated_at": mongodb::bson::DateTime::now(),
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        if let Some(updated) = self
            .payments
            .find_one_and_update(filter, update, options)
            .await?
        {
            return updated.into_record();
        }

        let current = self
            .transaction_by_order(order_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("transaction for order {}", order_id)))?;

        if current.payment_status == status {
            Ok(current)
        } else {
            Err(StoreError::InvalidTransition {
                from: current.payment_status,
                to: status,
            })
        }
    }
}

#[async_trait]
impl InvoiceStore for MongoRepository {
    #[instrument(skip(self))]
    async fn reserve_invoice_sequence(&self, month: &str) -> Result<u32, StoreError> {
        // Two first-of-month upserts can race on `_id`; the loser retries
        // against the now-existing counter.
        let counter = match self.increment_counter(month).await {
            Err(e) if is_duplicate_key(&e) => self.increment_counter(month).await?,
            other => other?,
        }
        .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("counter upsert returned nothing")))?;

        u32::try_from(counter.seq)
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("invoice sequence out of range")))
    }

    #[instrument(skip(self, invoice), fields(invoice_number = %invoice.invoice_number))]
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError> {
        let document = InvoiceDocument::from_invoice(invoice)?;
        match self.invoices.insert_one(document, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                Err(StoreError::Duplicate(invoice.invoice_number.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_invoice(&self, invoice_number: &str) -> Result<Option<Invoice>, StoreError> {
        self.invoices
            .find_one(doc! { "invoice_number": invoice_number }, None)
            .await?
            .map(InvoiceDocument::into_invoice)
            .transpose()
    }

    async fn invoices_by_email(&self, email: &str) -> Result<Vec<Invoice>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1, "invoice_number": -1 })
            .build();
        let docs: Vec<InvoiceDocument> = self
            .invoices
            .find(doc! { "email": normalize_email(email) }, options)
            .await?
            .try_collect()
            .await?;
        docs.into_iter().map(InvoiceDocument::into_invoice).collect()
    }
}

#[async_trait]
impl ApplicationStore for MongoRepository {
    async fn insert_application(&self, application: &PlanApplication) -> Result<(), StoreError> {
        let document = ApplicationDocument::from_application(application)?;
        self.applications.insert_one(document, None).await?;
        Ok(())
    }

    async fn list_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<PlanApplication>, StoreError> {
        let query = match (&filter.email, &filter.order_id) {
            (Some(email), _) => doc! { "email": normalize_email(email) },
            (None, Some(order_id)) => doc! { "razorpay_order_id": order_id },
            (None, None) => doc! {},
        };
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .limit(i64::from(filter.limit))
            .build();
        let docs: Vec<ApplicationDocument> = self
            .applications
            .find(query, options)
            .await?
            .try_collect()
            .await?;
        docs.into_iter()
            .map(ApplicationDocument::into_application)
            .collect()
    }
}

#[async_trait]
impl CheckoutStore for MongoRepository {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}
