use serde::{Deserialize, Serialize};

/// A purchasable matching tier.
///
/// Plans are owned by the admin process; this service only reads them.
/// `price` and `original_price` are minor units (paise).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub title: String,
    pub price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<u64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub popular: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_form_url: Option<String>,
}

impl Plan {
    /// Category label shown in the cart.
    pub fn category(&self) -> String {
        self.period.clone().unwrap_or_else(|| "Plan".to_string())
    }
}

/// External application-form link for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormUrl {
    pub id: String,
    pub google_form_url: Option<String>,
}

impl From<&Plan> for FormUrl {
    fn from(plan: &Plan) -> Self {
        Self {
            id: plan.id.clone(),
            google_form_url: plan.google_form_url.clone(),
        }
    }
}
