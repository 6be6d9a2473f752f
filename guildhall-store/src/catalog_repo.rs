use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guildhall_core::repository::{CatalogCounts, ProductRepository, RepoResult};
use guildhall_shared::{Product, ProductImage, ProductVariant, VariantRecord};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

pub struct StoreProductRepository {
    pool: PgPool,
}

impl StoreProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach variants and images to the given product rows.
    async fn assemble(&self, rows: Vec<ProductRow>, active_only: bool) -> RepoResult<Vec<Product>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let variants: Vec<VariantRow> = sqlx::query_as(
            "SELECT id, product_id, sku, size, color, base_price_cents, stock, is_active \
             FROM product_variants WHERE product_id = ANY($1) AND (is_active OR NOT $2) ORDER BY sku",
        )
        .bind(&ids)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        let images: Vec<ImageRow> = sqlx::query_as(
            "SELECT id, product_id, url, position FROM product_images WHERE product_id = ANY($1) ORDER BY position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut variants_by_product: HashMap<Uuid, Vec<ProductVariant>> = HashMap::new();
        for row in variants {
            variants_by_product.entry(row.product_id).or_default().push(row.into());
        }
        let mut images_by_product: HashMap<Uuid, Vec<ProductImage>> = HashMap::new();
        for row in images {
            images_by_product.entry(row.product_id).or_default().push(row.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| Product {
                variants: variants_by_product.remove(&row.id).unwrap_or_default(),
                images: images_by_product.remove(&row.id).unwrap_or_default(),
                id: row.id,
                external_id: row.external_id,
                name: row.name,
                description: row.description,
                is_active: row.is_active,
                updated_at: row.updated_at,
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    external_id: String,
    name: String,
    description: Option<String>,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: Uuid,
    product_id: Uuid,
    sku: String,
    size: Option<String>,
    color: Option<String>,
    base_price_cents: i64,
    stock: i32,
    is_active: bool,
}

impl From<VariantRow> for ProductVariant {
    fn from(row: VariantRow) -> Self {
        ProductVariant {
            id: row.id,
            product_id: row.product_id,
            sku: row.sku,
            size: row.size,
            color: row.color,
            base_price_cents: row.base_price_cents,
            stock: row.stock,
            is_active: row.is_active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: Uuid,
    product_id: Uuid,
    url: String,
    position: i32,
}

impl From<ImageRow> for ProductImage {
    fn from(row: ImageRow) -> Self {
        ProductImage {
            id: row.id,
            product_id: row.product_id,
            url: row.url,
            position: row.position,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VariantRecordRow {
    #[sqlx(flatten)]
    variant: VariantRow,
    product_name: String,
    product_active: bool,
}

#[async_trait]
impl ProductRepository for StoreProductRepository {
    async fn list_products(&self, active_only: bool) -> RepoResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, external_id, name, description, is_active, updated_at FROM products \
             WHERE is_active OR NOT $1 ORDER BY name",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows, active_only).await
    }

    async fn get_product(&self, id: Uuid) -> RepoResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, external_id, name, description, is_active, updated_at FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.assemble(vec![row], false).await?.pop()),
            None => Ok(None),
        }
    }

    async fn get_variant(&self, id: Uuid) -> RepoResult<Option<VariantRecord>> {
        let row: Option<VariantRecordRow> = sqlx::query_as(
            r#"
            SELECT v.id, v.product_id, v.sku, v.size, v.color, v.base_price_cents, v.stock, v.is_active,
                   p.name AS product_name, p.is_active AS product_active
            FROM product_variants v
            JOIN products p ON p.id = v.product_id
            WHERE v.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| VariantRecord {
            variant: r.variant.into(),
            product_name: r.product_name,
            product_active: r.product_active,
        }))
    }

    async fn upsert_product(&self, product: &Product) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        let (product_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO products (id, external_id, name, description, is_active, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (external_id) DO UPDATE
            SET name = EXCLUDED.name, description = EXCLUDED.description,
                is_active = EXCLUDED.is_active, updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(product.id)
        .bind(&product.external_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.is_active)
        .bind(product.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        for variant in &product.variants {
            sqlx::query(
                r#"
                INSERT INTO product_variants (id, product_id, sku, size, color, base_price_cents, stock, is_active, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                ON CONFLICT (sku) DO UPDATE
                SET product_id = EXCLUDED.product_id, size = EXCLUDED.size, color = EXCLUDED.color,
                    base_price_cents = EXCLUDED.base_price_cents, stock = EXCLUDED.stock,
                    is_active = EXCLUDED.is_active, updated_at = NOW()
                "#,
            )
            .bind(variant.id)
            .bind(product_id)
            .bind(&variant.sku)
            .bind(&variant.size)
            .bind(&variant.color)
            .bind(variant.base_price_cents)
            .bind(variant.stock)
            .bind(variant.is_active)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM product_images WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        for image in &product.images {
            sqlx::query("INSERT INTO product_images (id, product_id, url, position) VALUES ($1, $2, $3, $4)")
                .bind(image.id)
                .bind(product_id)
                .bind(&image.url)
                .bind(image.position)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn deactivate_products(&self, ids: &[Uuid]) -> RepoResult<()> {
        sqlx::query("UPDATE products SET is_active = FALSE, updated_at = NOW() WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_variants(&self, ids: &[Uuid]) -> RepoResult<()> {
        sqlx::query("UPDATE product_variants SET is_active = FALSE, updated_at = NOW() WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_stock(&self, sku: &str, stock: i32) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE product_variants SET stock = $2, updated_at = NOW() WHERE sku = $1")
            .bind(sku)
            .bind(stock)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn counts(&self) -> RepoResult<CatalogCounts> {
        let (products, variants, images): (i64, i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM products), (SELECT COUNT(*) FROM product_variants), \
             (SELECT COUNT(*) FROM product_images)",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogCounts {
            products: products as usize,
            variants: variants as usize,
            images: images as usize,
        })
    }
}
