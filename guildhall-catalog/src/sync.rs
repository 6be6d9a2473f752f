use chrono::{DateTime, Utc};
use guildhall_core::fulfillment::{FulfillmentProvider, RemoteArticle};
use guildhall_core::repository::{CatalogCounts, ProductRepository};
use guildhall_core::{CoreError, CoreResult};
use guildhall_shared::{Product, ProductImage, ProductVariant};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::pricing::cents_from_major;

/// Writes needed to mirror a remote catalog snapshot
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub products: Vec<Product>,
    pub deactivate_products: Vec<Uuid>,
    pub deactivate_variants: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncReport {
    pub products: usize,
    pub variants: usize,
    pub images: usize,
    pub deactivated_products: usize,
    pub deactivated_variants: usize,
    /// Row counts after the run
    pub counts: CatalogCounts,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StockReport {
    pub updated: usize,
    /// Remote SKUs with no local variant
    pub unknown: usize,
}

/// Diff the remote articles against the local catalog. Ids of rows that
/// already exist are kept, so re-running with the same input rewrites the
/// same rows. Duplicates in the remote list resolve last-wins.
pub fn plan_sync(remote: &[RemoteArticle], existing: &[Product], now: DateTime<Utc>) -> SyncPlan {
    let products_by_external: HashMap<&str, &Product> =
        existing.iter().map(|p| (p.external_id.as_str(), p)).collect();
    let variants_by_sku: HashMap<&str, &ProductVariant> = existing
        .iter()
        .flat_map(|p| p.variants.iter())
        .map(|v| (v.sku.as_str(), v))
        .collect();

    // Last occurrence of each article id and SKU wins.
    let mut article_winner: HashMap<&str, usize> = HashMap::new();
    let mut sku_winner: HashMap<&str, usize> = HashMap::new();
    for (idx, article) in remote.iter().enumerate() {
        article_winner.insert(article.id.as_str(), idx);
    }
    for (idx, article) in remote.iter().enumerate() {
        if article_winner.get(article.id.as_str()) != Some(&idx) {
            continue;
        }
        for variant in &article.variants {
            sku_winner.insert(variant.sku.as_str(), idx);
        }
    }

    let mut plan = SyncPlan::default();
    let mut seen_skus: HashSet<&str> = HashSet::new();

    for (idx, article) in remote.iter().enumerate() {
        if article_winner.get(article.id.as_str()) != Some(&idx) {
            continue;
        }

        let product_id = products_by_external
            .get(article.id.as_str())
            .map(|p| p.id)
            .unwrap_or_else(Uuid::new_v4);

        let mut variants: Vec<ProductVariant> = Vec::new();
        for remote_variant in &article.variants {
            let sku = remote_variant.sku.trim();
            if sku.is_empty() || sku_winner.get(remote_variant.sku.as_str()) != Some(&idx) {
                continue;
            }

            let base_price_cents = match cents_from_major(remote_variant.price) {
                Ok(cents) if cents >= 0 => cents,
                _ => {
                    warn!(sku, price = %remote_variant.price, "Skipping variant with unusable price");
                    continue;
                }
            };

            let variant = ProductVariant {
                id: variants_by_sku.get(sku).map(|v| v.id).unwrap_or_else(Uuid::new_v4),
                product_id,
                sku: sku.to_string(),
                size: remote_variant.size.clone(),
                color: remote_variant.color.clone(),
                base_price_cents,
                stock: remote_variant.stock.max(0),
                is_active: true,
            };

            // Same SKU twice inside one article: keep the later one.
            match variants.iter_mut().find(|v| v.sku == variant.sku) {
                Some(slot) => *slot = variant,
                None => variants.push(variant),
            }
            seen_skus.insert(sku);
        }

        let images = article
            .images
            .iter()
            .enumerate()
            .map(|(position, url)| ProductImage {
                id: Uuid::new_v4(),
                product_id,
                url: url.clone(),
                position: position as i32,
            })
            .collect();

        plan.products.push(Product {
            id: product_id,
            external_id: article.id.clone(),
            name: article.name.clone(),
            description: article.description.clone(),
            is_active: true,
            variants,
            images,
            updated_at: now,
        });
    }

    for product in existing {
        if product.is_active && !article_winner.contains_key(product.external_id.as_str()) {
            plan.deactivate_products.push(product.id);
        }
        for variant in &product.variants {
            if variant.is_active && !seen_skus.contains(variant.sku.as_str()) {
                plan.deactivate_variants.push(variant.id);
            }
        }
    }

    plan
}

/// Mirrors the fulfillment provider's catalog into the local product tables
pub struct CatalogSync {
    catalog: Arc<dyn ProductRepository>,
    provider: Arc<dyn FulfillmentProvider>,
}

impl CatalogSync {
    pub fn new(catalog: Arc<dyn ProductRepository>, provider: Arc<dyn FulfillmentProvider>) -> Self {
        Self { catalog, provider }
    }

    /// Full refresh. Nothing is ever deleted; missing rows are deactivated.
    pub async fn run(&self) -> CoreResult<SyncReport> {
        let articles = self.provider.list_articles().await?;
        if articles.is_empty() {
            // An empty answer is far more likely an outage than a real catalog.
            return Err(CoreError::UpstreamError(
                "fulfillment provider returned an empty catalog".to_string(),
            ));
        }

        let existing = self.catalog.list_products(false).await?;
        let plan = plan_sync(&articles, &existing, Utc::now());

        let mut report = SyncReport::default();
        for product in &plan.products {
            self.catalog.upsert_product(product).await?;
            report.products += 1;
            report.variants += product.variants.len();
            report.images += product.images.len();
        }

        if !plan.deactivate_products.is_empty() {
            self.catalog.deactivate_products(&plan.deactivate_products).await?;
        }
        if !plan.deactivate_variants.is_empty() {
            self.catalog.deactivate_variants(&plan.deactivate_variants).await?;
        }
        report.deactivated_products = plan.deactivate_products.len();
        report.deactivated_variants = plan.deactivate_variants.len();
        report.counts = self.catalog.counts().await?;

        info!(
            products = report.products,
            variants = report.variants,
            images = report.images,
            deactivated_products = report.deactivated_products,
            deactivated_variants = report.deactivated_variants,
            "Catalog sync finished"
        );
        Ok(report)
    }

    /// Pull stock levels only and write them onto variants by SKU.
    pub async fn refresh_stock(&self) -> CoreResult<StockReport> {
        let levels = self.provider.list_stock().await?;

        let mut report = StockReport::default();
        for level in &levels {
            if self.catalog.update_stock(&level.sku, level.quantity.max(0)).await? {
                report.updated += 1;
            } else {
                report.unknown += 1;
            }
        }

        if report.unknown > 0 {
            warn!(unknown = report.unknown, "Stock refresh saw SKUs missing from the catalog");
        }
        info!(updated = report.updated, "Stock refresh finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildhall_core::fulfillment::{RemoteStock, RemoteVariant};
    use guildhall_store::memory::InMemoryProductRepository;
    use guildhall_store::mock::MockFulfillmentProvider;
    use rust_decimal::Decimal;

    fn variant(sku: &str, price_cents: i64, stock: i32) -> RemoteVariant {
        RemoteVariant {
            sku: sku.to_string(),
            size: Some("M".to_string()),
            color: Some("black".to_string()),
            price: Decimal::new(price_cents, 2),
            stock,
        }
    }

    fn article(id: &str, variants: Vec<RemoteVariant>) -> RemoteArticle {
        RemoteArticle {
            id: id.to_string(),
            name: format!("Article {}", id),
            description: None,
            variants,
            images: vec![
                format!("https://img.example/{}/front.png", id),
                format!("https://img.example/{}/back.png", id),
            ],
        }
    }

    fn remote() -> Vec<RemoteArticle> {
        vec![
            article("tee", vec![variant("TEE-M", 1998, 5), variant("TEE-L", 1998, 0)]),
            article("mug", vec![variant("MUG", 1200, 12)]),
        ]
    }

    fn job(provider: MockFulfillmentProvider) -> (CatalogSync, Arc<InMemoryProductRepository>) {
        let repo = Arc::new(InMemoryProductRepository::default());
        (CatalogSync::new(repo.clone(), Arc::new(provider)), repo)
    }

    #[test]
    fn test_plan_keeps_existing_ids() {
        let first = plan_sync(&remote(), &[], Utc::now());
        assert_eq!(first.products.len(), 2);

        let second = plan_sync(&remote(), &first.products, Utc::now());
        assert_eq!(first.products[0].id, second.products[0].id);
        assert_eq!(first.products[0].variants[0].id, second.products[0].variants[0].id);
        assert!(second.deactivate_products.is_empty());
        assert!(second.deactivate_variants.is_empty());
    }

    #[test]
    fn test_plan_converts_price_and_orders_images() {
        let plan = plan_sync(&remote(), &[], Utc::now());
        let tee = &plan.products[0];
        assert_eq!(tee.variants[0].base_price_cents, 1998);
        assert_eq!(tee.images[1].position, 1);
        assert!(tee.images[1].url.ends_with("back.png"));
    }

    #[test]
    fn test_plan_duplicates_last_wins() {
        let articles = vec![
            article("tee", vec![variant("TEE-M", 1000, 1)]),
            article("tee", vec![variant("TEE-M", 2000, 2), variant("TEE-M", 2500, 3)]),
        ];
        let plan = plan_sync(&articles, &[], Utc::now());
        assert_eq!(plan.products.len(), 1);
        assert_eq!(plan.products[0].variants.len(), 1);
        assert_eq!(plan.products[0].variants[0].base_price_cents, 2500);
    }

    #[test]
    fn test_plan_deactivates_missing() {
        let first = plan_sync(&remote(), &[], Utc::now());
        let shrunk = vec![article("tee", vec![variant("TEE-M", 1998, 5)])];
        let plan = plan_sync(&shrunk, &first.products, Utc::now());

        let mug = first.products.iter().find(|p| p.external_id == "mug").unwrap();
        let tee_l = first.products[0].variants.iter().find(|v| v.sku == "TEE-L").unwrap();
        assert_eq!(plan.deactivate_products, vec![mug.id]);
        assert!(plan.deactivate_variants.contains(&tee_l.id));
        assert!(plan.deactivate_variants.contains(&mug.variants[0].id));
    }

    #[tokio::test]
    async fn test_sync_twice_keeps_row_counts() {
        let provider = MockFulfillmentProvider::default();
        provider.set_articles(remote());
        let (sync, _repo) = job(provider);

        let first = sync.run().await.unwrap();
        let second = sync.run().await.unwrap();

        assert_eq!(first.counts, CatalogCounts { products: 2, variants: 3, images: 4 });
        assert_eq!(first.counts, second.counts);
        assert_eq!(second.deactivated_products, 0);
    }

    #[tokio::test]
    async fn test_sync_refuses_empty_catalog() {
        let (sync, _repo) = job(MockFulfillmentProvider::default());
        assert!(matches!(sync.run().await, Err(CoreError::UpstreamError(_))));
    }

    #[tokio::test]
    async fn test_sync_upstream_failure() {
        let provider = MockFulfillmentProvider::default();
        provider.set_failing(true);
        let (sync, _repo) = job(provider);
        assert!(matches!(sync.run().await, Err(CoreError::UpstreamError(_))));
    }

    #[tokio::test]
    async fn test_refresh_stock() {
        let provider = Arc::new(MockFulfillmentProvider::default());
        provider.set_articles(remote());
        provider.set_stock(vec![
            RemoteStock { sku: "TEE-M".to_string(), quantity: 9 },
            RemoteStock { sku: "GONE".to_string(), quantity: 1 },
        ]);
        let repo = Arc::new(InMemoryProductRepository::default());
        let sync = CatalogSync::new(repo.clone(), provider.clone());
        sync.run().await.unwrap();

        let report = sync.refresh_stock().await.unwrap();
        assert_eq!(report, StockReport { updated: 1, unknown: 1 });

        let products = repo.list_products(true).await.unwrap();
        let tee = products.iter().find(|p| p.external_id == "tee").unwrap();
        assert_eq!(tee.variants.iter().find(|v| v.sku == "TEE-M").unwrap().stock, 9);
    }
}
