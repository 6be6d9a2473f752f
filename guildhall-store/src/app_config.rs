use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
    pub fulfillment: FulfillmentConfig,
    pub pricing: PricingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Public origin of the site, used to build provider return URLs
    pub public_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Empty runs against in-memory storage
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Rate limiting is disabled when unset
    pub url: Option<String>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

fn default_rate_limit() -> i64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    #[serde(default = "default_payments_base")]
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub membership_price_id: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub success_path: String,
    pub cancel_path: String,
    pub subscribe_success_path: String,
    pub portal_return_path: String,
}

fn default_payments_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FulfillmentConfig {
    pub api_base: String,
    pub api_key: String,
    /// Secret segment of the webhook URL
    pub webhook_token: String,
    /// Require `X-Webhook-Signature` when set
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    /// Used until an admin stores a markup in the settings table
    #[serde(with = "rust_decimal::serde::str")]
    pub default_markup_percent: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_seconds: 10 }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked developer overrides
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `GUILDHALL_PAYMENTS__SECRET_KEY=sk_live_...`
            .add_source(config::Environment::with_prefix("GUILDHALL").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Absolute URL on the public site for `path`
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.server.public_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
