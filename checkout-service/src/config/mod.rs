use secrecy::Secret;
use service_core::config::{self as core_config, get_env, get_optional_env, is_production};
use service_core::error::AppError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub database: DatabaseConfig,
    pub razorpay: RazorpayConfig,
    pub currency: String,
    pub email: EmailConfig,
    pub sender: InvoiceSenderConfig,
    /// Screenshots are kept in memory when unset.
    pub storage: Option<StorageConfig>,
    /// Public storefront origin used for confirmation redirects.
    pub storefront_url: String,
    pub coupons_path: Option<String>,
    pub http_timeout: Duration,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    Mongo(MongoConfig),
    /// In-process store, optionally seeded with plans from a JSON file.
    Memory { plans_seed_path: Option<String> },
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub enum EmailConfig {
    SendGrid(SendGridConfig),
    Smtp(SmtpConfig),
    Mock,
}

#[derive(Debug, Clone)]
pub struct SendGridConfig {
    pub api_key: Secret<String>,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct InvoiceSenderConfig {
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub api_base_url: String,
    pub public_base_url: String,
    pub bucket: String,
    pub service_key: Secret<String>,
}

impl CheckoutConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = is_production();

        let database = match get_env("DATABASE_BACKEND", Some("memory"), is_prod)?.as_str() {
            "mongo" => DatabaseConfig::Mongo(MongoConfig {
                uri: Secret::new(get_env("MONGODB_URI", None, is_prod)?),
                database: get_env("MONGODB_DATABASE", Some("checkout_db"), is_prod)?,
            }),
            "memory" => DatabaseConfig::Memory {
                plans_seed_path: get_optional_env("PLANS_SEED_PATH"),
            },
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_BACKEND must be mongo or memory, got {}",
                    other
                )))
            }
        };

        let email = match get_env("EMAIL_PROVIDER", Some("mock"), is_prod)?.as_str() {
            "sendgrid" => EmailConfig::SendGrid(SendGridConfig {
                api_key: Secret::new(get_env("SENDGRID_API_KEY", None, is_prod)?),
                api_base_url: get_env(
                    "SENDGRID_API_BASE_URL",
                    Some("https://api.sendgrid.com"),
                    false,
                )?,
            }),
            "smtp" => EmailConfig::Smtp(SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: parse_env("SMTP_PORT", get_env("SMTP_PORT", Some("587"), is_prod)?)?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: Secret::new(get_env("SMTP_PASSWORD", Some(""), is_prod)?),
            }),
            "mock" if !is_prod => EmailConfig::Mock,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "EMAIL_PROVIDER {} is not available in this environment",
                    other
                )))
            }
        };

        let storage = match get_optional_env("STORAGE_API_URL") {
            Some(api_base_url) => Some(StorageConfig {
                public_base_url: get_env("STORAGE_PUBLIC_URL", Some(&api_base_url), is_prod)?,
                api_base_url,
                bucket: get_env("STORAGE_BUCKET", Some("payment-screenshots"), is_prod)?,
                service_key: Secret::new(get_env("STORAGE_SERVICE_KEY", None, is_prod)?),
            }),
            None if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "STORAGE_API_URL is required in production but not set"
                )))
            }
            None => None,
        };

        let timeout_secs: u64 = parse_env(
            "HTTP_TIMEOUT_SECS",
            get_env("HTTP_TIMEOUT_SECS", Some("15"), false)?,
        )?;

        Ok(CheckoutConfig {
            common,
            service_name: "checkout-service".to_string(),
            database,
            razorpay: RazorpayConfig {
                key_id: get_env("RAZORPAY_KEY_ID", Some(""), is_prod)?,
                key_secret: Secret::new(get_env("RAZORPAY_KEY_SECRET", Some(""), is_prod)?),
                webhook_secret: Secret::new(get_env(
                    "RAZORPAY_WEBHOOK_SECRET",
                    Some(""),
                    is_prod,
                )?),
                api_base_url: get_env(
                    "RAZORPAY_API_BASE_URL",
                    Some("https://api.razorpay.com/v1"),
                    false,
                )?,
            },
            currency: get_env("CHECKOUT_CURRENCY", Some("INR"), false)?,
            email,
            sender: InvoiceSenderConfig {
                from_email: get_env("FROM_EMAIL", Some("support@downdating.in"), is_prod)?,
                from_name: get_env("FROM_NAME", Some("DownDating"), false)?,
            },
            storage,
            storefront_url: get_env("STOREFRONT_URL", Some("http://localhost:3000"), is_prod)?
                .trim_end_matches('/')
                .to_string(),
            coupons_path: get_optional_env("COUPONS_PATH"),
            http_timeout: Duration::from_secs(timeout_secs),
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: String) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, raw)))
}
