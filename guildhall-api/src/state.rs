use guildhall_catalog::{CatalogSync, Markup, MarkupSettings};
use guildhall_core::fulfillment::FulfillmentProvider;
use guildhall_core::payment::PaymentProvider;
use guildhall_core::repository::{
    OrderRepository, ProductRepository, ProfileRepository, SettingsRepository, WebhookLedger,
};
use guildhall_order::{
    BillingService, BillingUrls, CheckoutService, FulfillmentEventProcessor, PaymentEventProcessor, ReturnUrls,
};
use guildhall_store::memory::{
    InMemoryOrderRepository, InMemoryProductRepository, InMemoryProfileRepository, InMemorySettingsRepository,
    InMemoryWebhookLedger,
};
use guildhall_store::{
    Config, DbClient, RedisClient, StoreOrderRepository, StoreProductRepository, StoreProfileRepository,
    StoreSettingsRepository, StoreWebhookLedger,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct WebhookSecrets {
    pub payments_secret: String,
    pub fulfillment_token: String,
    pub fulfillment_secret: Option<String>,
}

#[derive(Clone)]
pub struct RateLimit {
    pub redis: Arc<RedisClient>,
    pub per_minute: i64,
}

/// Storage backends behind the repository traits
#[derive(Clone)]
pub struct Repositories {
    pub orders: Arc<dyn OrderRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub ledger: Arc<dyn WebhookLedger>,
}

impl Repositories {
    pub fn postgres(db: &DbClient) -> Self {
        Self {
            orders: Arc::new(StoreOrderRepository::new(db.pool.clone())),
            products: Arc::new(StoreProductRepository::new(db.pool.clone())),
            profiles: Arc::new(StoreProfileRepository::new(db.pool.clone())),
            settings: Arc::new(StoreSettingsRepository::new(db.pool.clone())),
            ledger: Arc::new(StoreWebhookLedger::new(db.pool.clone())),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(InMemoryOrderRepository::default()),
            products: Arc::new(InMemoryProductRepository::default()),
            profiles: Arc::new(InMemoryProfileRepository::default()),
            settings: Arc::new(InMemorySettingsRepository::default()),
            ledger: Arc::new(InMemoryWebhookLedger::default()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub markup: Arc<MarkupSettings>,
    pub checkout: Arc<CheckoutService>,
    pub payment_events: Arc<PaymentEventProcessor>,
    pub fulfillment_events: Arc<FulfillmentEventProcessor>,
    pub billing: Arc<BillingService>,
    pub catalog_sync: Arc<CatalogSync>,
    pub currency: String,
    pub auth: AuthConfig,
    pub webhooks: WebhookSecrets,
    pub rate_limit: Option<RateLimit>,
}

impl AppState {
    /// Wire services from configuration. Every client is injected here, so
    /// tests swap in fakes by passing different providers.
    pub fn new(
        config: &Config,
        repos: Repositories,
        payments: Arc<dyn PaymentProvider>,
        fulfillment: Arc<dyn FulfillmentProvider>,
        rate_limiter: Option<Arc<RedisClient>>,
    ) -> anyhow::Result<Self> {
        let default_markup = Markup::new(config.pricing.default_markup_percent)?;
        let currency = config.payments.currency.to_lowercase();

        let checkout = CheckoutService::new(
            repos.products.clone(),
            payments.clone(),
            MarkupSettings::new(repos.settings.clone(), default_markup),
            ReturnUrls {
                success_url: config.public_url(&config.payments.success_path),
                cancel_url: config.public_url(&config.payments.cancel_path),
            },
            currency.clone(),
        );

        let billing = BillingService::new(
            repos.profiles.clone(),
            payments,
            config.payments.membership_price_id.clone(),
            currency.clone(),
            BillingUrls {
                success_url: config.public_url(&config.payments.subscribe_success_path),
                cancel_url: config.public_url(&config.payments.cancel_path),
                portal_return_url: config.public_url(&config.payments.portal_return_path),
            },
        );

        let payment_events = PaymentEventProcessor::new(
            repos.orders.clone(),
            repos.profiles.clone(),
            repos.ledger.clone(),
            fulfillment.clone(),
            currency.clone(),
        );

        Ok(Self {
            orders: repos.orders.clone(),
            products: repos.products.clone(),
            profiles: repos.profiles.clone(),
            markup: Arc::new(MarkupSettings::new(repos.settings.clone(), default_markup)),
            checkout: Arc::new(checkout),
            payment_events: Arc::new(payment_events),
            fulfillment_events: Arc::new(FulfillmentEventProcessor::new(repos.orders.clone())),
            billing: Arc::new(billing),
            catalog_sync: Arc::new(CatalogSync::new(repos.products, fulfillment)),
            currency,
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
            },
            webhooks: WebhookSecrets {
                payments_secret: config.payments.webhook_secret.clone(),
                fulfillment_token: config.fulfillment.webhook_token.clone(),
                fulfillment_secret: config
                    .fulfillment
                    .webhook_secret
                    .clone()
                    .filter(|secret| !secret.is_empty()),
            },
            rate_limit: rate_limiter.map(|redis| RateLimit {
                redis,
                per_minute: config.redis.rate_limit_per_minute,
            }),
        })
    }
}
