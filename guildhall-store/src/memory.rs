//! In-memory repositories. They back the test suites and let the API run
//! without a database; semantics follow the Postgres implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guildhall_core::repository::{
    CatalogCounts, LedgerClaim, OrderRepository, ProductRepository, ProfileRepository, RepoResult,
    SettingsRepository, WebhookLedger,
};
use guildhall_shared::{Order, OrderStatus, OrderStatusChangedEvent, Product, Profile, VariantRecord};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
    changes: RwLock<Vec<OrderStatusChangedEvent>>,
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, order: &Order) -> RepoResult<bool> {
        let mut orders = self.orders.write().await;
        if orders
            .values()
            .any(|o| o.payment_session_id == order.payment_session_id)
        {
            return Ok(false);
        }
        orders.insert(order.id, order.clone());
        Ok(true)
    }

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_payment_session(&self, session_id: &str) -> RepoResult<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.payment_session_id == session_id)
            .cloned())
    }

    async fn list_orders(&self, user_id: Option<Uuid>) -> RepoResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| user_id.map_or(true, |id| o.user_id == id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn save_order(&self, order: &Order, expected: OrderStatus) -> RepoResult<bool> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.id)
            .ok_or_else(|| format!("order {} does not exist", order.id))?;
        if stored.status != expected {
            return Ok(false);
        }

        // Items, totals and addresses are frozen at creation.
        stored.status = order.status;
        stored.tracking = order.tracking.clone();
        stored.needs_attention = order.needs_attention.clone();
        stored.updated_at = order.updated_at;
        Ok(true)
    }

    async fn set_fulfillment_reference(&self, id: Uuid, reference: &str) -> RepoResult<()> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&id).ok_or_else(|| format!("order {} does not exist", id))?;
        stored.fulfillment_reference = Some(reference.to_string());
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn add_order_change(&self, change: &OrderStatusChangedEvent) -> RepoResult<()> {
        self.changes.write().await.push(change.clone());
        Ok(())
    }

    async fn list_order_changes(&self, order_id: Uuid) -> RepoResult<Vec<OrderStatusChangedEvent>> {
        Ok(self
            .changes
            .read()
            .await
            .iter()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<Uuid, Product>>,
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn list_products(&self, active_only: bool) -> RepoResult<Vec<Product>> {
        let mut products: Vec<Product> = self
            .products
            .read()
            .await
            .values()
            .filter(|p| p.is_active || !active_only)
            .cloned()
            .map(|mut p| {
                if active_only {
                    p.variants.retain(|v| v.is_active);
                }
                p
            })
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn get_product(&self, id: Uuid) -> RepoResult<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn get_variant(&self, id: Uuid) -> RepoResult<Option<VariantRecord>> {
        let products = self.products.read().await;
        Ok(products.values().find_map(|p| {
            p.variants.iter().find(|v| v.id == id).map(|v| VariantRecord {
                variant: v.clone(),
                product_name: p.name.clone(),
                product_active: p.is_active,
            })
        }))
    }

    async fn upsert_product(&self, product: &Product) -> RepoResult<()> {
        let mut products = self.products.write().await;

        let product_id = products
            .values()
            .find(|p| p.external_id == product.external_id)
            .map(|p| p.id)
            .unwrap_or(product.id);

        let mut stored = products.remove(&product_id).unwrap_or_else(|| Product {
            id: product_id,
            variants: Vec::new(),
            ..product.clone()
        });
        stored.name = product.name.clone();
        stored.description = product.description.clone();
        stored.is_active = product.is_active;
        stored.updated_at = product.updated_at;

        for variant in &product.variants {
            // SKUs are unique across the catalog; a moved SKU keeps its id.
            let mut existing = stored
                .variants
                .iter()
                .position(|v| v.sku == variant.sku)
                .map(|idx| stored.variants.remove(idx));
            if existing.is_none() {
                for other in products.values_mut() {
                    if let Some(idx) = other.variants.iter().position(|v| v.sku == variant.sku) {
                        existing = Some(other.variants.remove(idx));
                        break;
                    }
                }
            }

            let mut next = variant.clone();
            next.product_id = product_id;
            if let Some(existing) = existing {
                next.id = existing.id;
            }
            stored.variants.push(next);
        }
        stored.variants.sort_by(|a, b| a.sku.cmp(&b.sku));

        stored.images = product
            .images
            .iter()
            .cloned()
            .map(|mut image| {
                image.product_id = product_id;
                image
            })
            .collect();
        stored.images.sort_by_key(|image| image.position);

        products.insert(product_id, stored);
        Ok(())
    }

    async fn deactivate_products(&self, ids: &[Uuid]) -> RepoResult<()> {
        let mut products = self.products.write().await;
        for id in ids {
            if let Some(product) = products.get_mut(id) {
                product.is_active = false;
                product.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn deactivate_variants(&self, ids: &[Uuid]) -> RepoResult<()> {
        let mut products = self.products.write().await;
        for variant in products.values_mut().flat_map(|p| p.variants.iter_mut()) {
            if ids.contains(&variant.id) {
                variant.is_active = false;
            }
        }
        Ok(())
    }

    async fn update_stock(&self, sku: &str, stock: i32) -> RepoResult<bool> {
        let mut products = self.products.write().await;
        match products
            .values_mut()
            .flat_map(|p| p.variants.iter_mut())
            .find(|v| v.sku == sku)
        {
            Some(variant) => {
                variant.stock = stock;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn counts(&self) -> RepoResult<CatalogCounts> {
        let products = self.products.read().await;
        Ok(CatalogCounts {
            products: products.len(),
            variants: products.values().map(|p| p.variants.len()).sum(),
            images: products.values().map(|p| p.images.len()).sum(),
        })
    }
}

#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<Uuid, Profile>>,
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn get_profile(&self, id: Uuid) -> RepoResult<Option<Profile>> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn ensure_profile(&self, id: Uuid, email: Option<&str>) -> RepoResult<Profile> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .entry(id)
            .or_insert_with(|| Profile::new(id, email.map(String::from)));
        if profile.email.is_none() {
            profile.email = email.map(String::from);
        }
        Ok(profile.clone())
    }

    async fn find_by_customer(&self, customer_id: &str) -> RepoResult<Option<Profile>> {
        Ok(self
            .profiles
            .read()
            .await
            .values()
            .find(|p| p.customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn save_profile(&self, profile: &Profile) -> RepoResult<()> {
        self.profiles.write().await.insert(profile.id, profile.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    values: RwLock<HashMap<String, Value>>,
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get_setting(&self, key: &str) -> RepoResult<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn put_setting(&self, key: &str, value: Value) -> RepoResult<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

struct LedgerEntry {
    processed: bool,
    claimed_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryWebhookLedger {
    entries: RwLock<HashMap<(String, String), LedgerEntry>>,
}

#[async_trait]
impl WebhookLedger for InMemoryWebhookLedger {
    async fn claim(
        &self,
        provider: &str,
        event_id: &str,
        _event_type: &str,
        stale_before: DateTime<Utc>,
    ) -> RepoResult<LedgerClaim> {
        let mut entries = self.entries.write().await;
        let key = (provider.to_string(), event_id.to_string());

        match entries.get_mut(&key) {
            Some(entry) if entry.processed => Ok(LedgerClaim::AlreadyProcessed),
            Some(entry) if entry.claimed_at < stale_before => {
                entry.claimed_at = Utc::now();
                Ok(LedgerClaim::Claimed)
            }
            Some(_) => Ok(LedgerClaim::InProgress),
            None => {
                entries.insert(
                    key,
                    LedgerEntry {
                        processed: false,
                        claimed_at: Utc::now(),
                    },
                );
                Ok(LedgerClaim::Claimed)
            }
        }
    }

    async fn complete(&self, provider: &str, event_id: &str) -> RepoResult<()> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&(provider.to_string(), event_id.to_string())) {
            entry.processed = true;
        }
        Ok(())
    }

    async fn release(&self, provider: &str, event_id: &str) -> RepoResult<()> {
        let mut entries = self.entries.write().await;
        let key = (provider.to_string(), event_id.to_string());
        if entries.get(&key).is_some_and(|e| !e.processed) {
            entries.remove(&key);
        }
        Ok(())
    }
}
