use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog product mirrored from the fulfillment provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    /// Article id on the fulfillment provider
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub variants: Vec<ProductVariant>,
    pub images: Vec<ProductImage>,
    pub updated_at: DateTime<Utc>,
}

/// A size/color combination of a product. `base_price_cents` is the
/// provider's price before markup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub base_price_cents: i64,
    pub stock: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductImage {
    pub id: Uuid,
    pub product_id: Uuid,
    pub url: String,
    pub position: i32,
}

/// A variant together with the product facts checkout needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRecord {
    pub variant: ProductVariant,
    pub product_name: String,
    pub product_active: bool,
}

impl VariantRecord {
    pub fn is_sellable(&self) -> bool {
        self.product_active && self.variant.is_active
    }
}
