use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guildhall_shared::{Order, OrderStatus, OrderStatusChangedEvent, Product, Profile, VariantRecord};
use uuid::Uuid;

pub type RepoError = Box<dyn std::error::Error + Send + Sync>;
pub type RepoResult<T> = Result<T, RepoError>;

/// Repository trait for order data access
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert the order with its items. Returns `false` without writing when an
    /// order for the same payment session already exists.
    async fn create_order(&self, order: &Order) -> RepoResult<bool>;

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<Order>>;

    async fn find_by_payment_session(&self, session_id: &str) -> RepoResult<Option<Order>>;

    /// Orders newest first; `None` lists every user's orders.
    async fn list_orders(&self, user_id: Option<Uuid>) -> RepoResult<Vec<Order>>;

    /// Persist status, tracking and attention note while the stored status
    /// still equals `expected`. Returns `false` when another writer moved the
    /// order first; nothing is written in that case.
    async fn save_order(&self, order: &Order, expected: OrderStatus) -> RepoResult<bool>;

    /// Record the print provider's order id. Touches no other column.
    async fn set_fulfillment_reference(&self, id: Uuid, reference: &str) -> RepoResult<()>;

    async fn add_order_change(&self, change: &OrderStatusChangedEvent) -> RepoResult<()>;

    async fn list_order_changes(&self, order_id: Uuid) -> RepoResult<Vec<OrderStatusChangedEvent>>;
}

/// Row counts of the mirrored catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CatalogCounts {
    pub products: usize,
    pub variants: usize,
    pub images: usize,
}

/// Repository trait for product catalog access
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn list_products(&self, active_only: bool) -> RepoResult<Vec<Product>>;

    async fn get_product(&self, id: Uuid) -> RepoResult<Option<Product>>;

    async fn get_variant(&self, id: Uuid) -> RepoResult<Option<VariantRecord>>;

    /// Upsert the product by external id and its variants by SKU; images are
    /// replaced by the given set.
    async fn upsert_product(&self, product: &Product) -> RepoResult<()>;

    async fn deactivate_products(&self, ids: &[Uuid]) -> RepoResult<()>;

    async fn deactivate_variants(&self, ids: &[Uuid]) -> RepoResult<()>;

    /// Returns whether a variant with that SKU exists.
    async fn update_stock(&self, sku: &str, stock: i32) -> RepoResult<bool>;

    async fn counts(&self) -> RepoResult<CatalogCounts>;
}

/// Repository trait for member profiles
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> RepoResult<Option<Profile>>;

    /// Fetch the profile, creating a blank member profile on first sight.
    async fn ensure_profile(&self, id: Uuid, email: Option<&str>) -> RepoResult<Profile>;

    async fn find_by_customer(&self, customer_id: &str) -> RepoResult<Option<Profile>>;

    async fn save_profile(&self, profile: &Profile) -> RepoResult<()>;
}

/// Key/value site settings, values stored as `{"value": ...}`
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_setting(&self, key: &str) -> RepoResult<Option<serde_json::Value>>;

    async fn put_setting(&self, key: &str, value: serde_json::Value) -> RepoResult<()>;
}

/// Outcome of claiming a provider event in the idempotency ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerClaim {
    /// The caller now owns processing of the event
    Claimed,
    AlreadyProcessed,
    /// Another delivery is processing it right now
    InProgress,
}

/// Idempotency ledger keyed by provider event id
#[async_trait]
pub trait WebhookLedger: Send + Sync {
    /// Claim `event_id`. A `processing` claim older than `stale_before` is
    /// taken over, the worker that held it is assumed dead.
    async fn claim(
        &self,
        provider: &str,
        event_id: &str,
        event_type: &str,
        stale_before: DateTime<Utc>,
    ) -> RepoResult<LedgerClaim>;

    async fn complete(&self, provider: &str, event_id: &str) -> RepoResult<()>;

    /// Drop a claim after a failed attempt so the provider's retry can run.
    async fn release(&self, provider: &str, event_id: &str) -> RepoResult<()>;
}
