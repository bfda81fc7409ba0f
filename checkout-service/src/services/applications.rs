//! Detailed plan applications with proof-of-payment screenshots.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::CheckoutError;
use crate::models::{ApplicationFilter, ApplicationStatus, PlanApplication};
use crate::services::storage::ObjectStorage;
use crate::services::store::CheckoutStore;

/// Application form as posted by the storefront.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationSubmission {
    pub plan_id: String,
    /// Price the form displayed, minor units.
    pub plan_price: u64,
    pub name: String,
    pub instagram_id: String,
    pub email: String,
    pub phone: String,
    pub gender: String,
    pub interested_in: String,
    pub relationship_style: Option<String>,
    pub ideal_first_meeting: Option<String>,
    pub love_language: Option<String>,
    pub party_vibe: Option<String>,
    pub flirting_style: Option<String>,
    pub toxic_trait: Option<String>,
    pub bollywood_character: Option<String>,
    pub green_flag: Option<String>,
    pub perfect_date: Option<String>,
    pub pitch_yourself: Option<String>,
    pub razorpay_order_id: Option<String>,
    /// Base64 image, optionally as a `data:` URL.
    pub payment_screenshot: Option<String>,
    pub agree_to_terms: bool,
    pub agree_to_privacy: bool,
}

/// Split a possibly `data:`-prefixed base64 string into content type and bytes.
fn decode_screenshot(raw: &str) -> Result<(String, Vec<u8>), CheckoutError> {
    let raw = raw.trim();
    let (content_type, payload) = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest.split_once(',').ok_or_else(|| {
                CheckoutError::InvalidRequest("Malformed payment screenshot".to_string())
            })?;
            let content_type = meta.trim_end_matches(";base64");
            (content_type.to_string(), data)
        }
        None => ("image/jpeg".to_string(), raw),
    };

    let bytes = STANDARD
        .decode(payload)
        .map_err(|_| CheckoutError::InvalidRequest("Payment screenshot is not valid base64".to_string()))?;
    if bytes.is_empty() {
        return Err(CheckoutError::InvalidRequest(
            "Payment screenshot is required".to_string(),
        ));
    }
    Ok((content_type, bytes))
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

#[derive(Clone)]
pub struct ApplicationService {
    store: Arc<dyn CheckoutStore>,
    storage: Arc<dyn ObjectStorage>,
}

impl ApplicationService {
    pub fn new(store: Arc<dyn CheckoutStore>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { store, storage }
    }

    pub async fn submit(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<PlanApplication, CheckoutError> {
        let required = [
            ("name", &submission.name),
            ("instagramId", &submission.instagram_id),
            ("email", &submission.email),
            ("phone", &submission.phone),
            ("gender", &submission.gender),
            ("interestedIn", &submission.interested_in),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() {
            return Err(CheckoutError::InvalidRequest(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        if !submission.agree_to_terms || !submission.agree_to_privacy {
            return Err(CheckoutError::InvalidRequest(
                "Must agree to terms and privacy policy".to_string(),
            ));
        }

        let screenshot = submission
            .payment_screenshot
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                CheckoutError::InvalidRequest("Payment screenshot is required".to_string())
            })?;
        let (content_type, bytes) = decode_screenshot(screenshot)?;

        let plan = self
            .store
            .get_plan(&submission.plan_id)
            .await?
            .ok_or_else(|| CheckoutError::InvalidPlan(submission.plan_id.clone()))?;
        if submission.plan_price != plan.price {
            tracing::warn!(
                plan_id = %plan.id,
                declared = submission.plan_price,
                expected = plan.price,
                "Application price does not match catalog"
            );
            return Err(CheckoutError::AmountMismatch {
                declared: submission.plan_price,
                expected: plan.price,
            });
        }

        let filename = format!("{}.{}", plan.id, extension_for(&content_type));
        let screenshot_url = self
            .storage
            .upload(bytes, &filename, &content_type)
            .await
            .map_err(|e| {
                tracing::error!(plan_id = %plan.id, recipient = %submission.email, error = %e, "Screenshot upload failed");
                e
            })?;

        let application = PlanApplication {
            id: Uuid::new_v4().to_string(),
            plan_id: plan.id,
            plan_title: plan.title,
            plan_price: plan.price,
            name: submission.name.trim().to_string(),
            instagram_id: submission.instagram_id.trim().to_string(),
            email: submission.email.trim().to_string(),
            phone: submission.phone.trim().to_string(),
            gender: submission.gender,
            interested_in: submission.interested_in,
            relationship_style: submission.relationship_style,
            ideal_first_meeting: submission.ideal_first_meeting,
            love_language: submission.love_language,
            party_vibe: submission.party_vibe,
            flirting_style: submission.flirting_style,
            toxic_trait: submission.toxic_trait,
            bollywood_character: submission.bollywood_character,
            green_flag: submission.green_flag,
            perfect_date: submission.perfect_date,
            pitch_yourself: submission.pitch_yourself,
            razorpay_order_id: submission.razorpay_order_id,
            payment_screenshot_url: screenshot_url,
            agree_to_terms: true,
            agree_to_privacy: true,
            status: ApplicationStatus::Pending,
            created_at: Utc::now(),
        };

        self.store.insert_application(&application).await?;
        tracing::info!(application_id = %application.id, plan_id = %application.plan_id, "Application submitted");
        Ok(application)
    }

    pub async fn list(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<PlanApplication>, CheckoutError> {
        Ok(self.store.list_applications(filter).await?)
    }
}
