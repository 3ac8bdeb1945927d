use std::fs;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::payment::GatewaySecrets;
use crate::ports::UserProfile;
use crate::rate_limit::RateLimitConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub http: HttpConfig,
    /// Absent means the in-memory store
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub offers: OffersConfig,
    pub payment: PaymentConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Seed entries for the in-process user directory
    #[serde(default)]
    pub users: Vec<UserProfile>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OffersConfig {
    pub max_active_per_case: usize,
    pub ttl_hours: i64,
    pub sweep_interval_secs: u64,
}

impl Default for OffersConfig {
    fn default() -> Self {
        Self {
            max_active_per_case: 5,
            ttl_hours: 48,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Mock,
    Http,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentConfig {
    pub provider: GatewayKind,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub key_secret: String,
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_signature_header() -> String {
    "x-webhook-signature".to_string()
}

impl PaymentConfig {
    pub fn secrets(&self) -> GatewaySecrets {
        GatewaySecrets {
            key_id: self.key_id.clone(),
            key_secret: self.key_secret.clone(),
            webhook_secret: self.webhook_secret.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config: {}", config_path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(content).context("Failed to parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            bail!("auth.jwt_secret must be set");
        }
        if self.offers.max_active_per_case == 0 {
            bail!("offers.max_active_per_case must be at least 1");
        }
        if self.offers.ttl_hours <= 0 {
            bail!("offers.ttl_hours must be positive");
        }
        let payment = &self.payment;
        if payment.key_secret.is_empty() || payment.webhook_secret.is_empty() {
            bail!("payment.key_secret and payment.webhook_secret must be set");
        }
        if payment.key_secret == payment.webhook_secret {
            bail!("payment.webhook_secret must differ from payment.key_secret");
        }
        if payment.provider == GatewayKind::Http && payment.base_url.is_empty() {
            bail!("payment.base_url is required for the http gateway");
        }
        Ok(())
    }
}
