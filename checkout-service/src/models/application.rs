use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

/// Detailed application submitted for a plan, with proof of payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanApplication {
    pub id: String,
    pub plan_id: String,
    pub plan_title: String,
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
    pub payment_screenshot_url: String,
    pub agree_to_terms: bool,
    pub agree_to_privacy: bool,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
}

/// Listing filter; `email` wins over `order_id` when both are set.
#[derive(Debug, Clone)]
pub struct ApplicationFilter {
    pub email: Option<String>,
    pub order_id: Option<String>,
    pub limit: u32,
}

impl Default for ApplicationFilter {
    fn default() -> Self {
        Self {
            email: None,
            order_id: None,
            limit: 50,
        }
    }
}
