pub mod app_config;
pub mod catalog_repo;
pub mod database;
pub mod fulfillment_client;
pub mod memory;
pub mod mock;
pub mod order_repo;
pub mod profile_repo;
pub mod redis_repo;
pub mod settings_repo;
pub mod stripe;
pub mod webhook_ledger;

pub use app_config::Config;
pub use catalog_repo::StoreProductRepository;
pub use database::DbClient;
pub use fulfillment_client::HttpFulfillmentClient;
pub use order_repo::StoreOrderRepository;
pub use profile_repo::StoreProfileRepository;
pub use redis_repo::RedisClient;
pub use settings_repo::StoreSettingsRepository;
pub use stripe::StripeClient;
pub use webhook_ledger::StoreWebhookLedger;
