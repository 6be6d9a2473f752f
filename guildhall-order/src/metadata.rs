//! Checkout session metadata.
//!
//! The payment provider caps metadata at 50 keys of 500 characters each, so
//! the cart snapshot is spread over one key per line instead of one blob.

use guildhall_core::CoreError;
use guildhall_shared::{ItemSnapshot, ShippingAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::checkout::MAX_CART_LINES;

pub const USER_ID_KEY: &str = "user_id";
pub const PLAN_KEY: &str = "plan";
const ITEM_COUNT_KEY: &str = "item_count";
const NAME_LIMIT: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("checkout metadata is missing `{0}`")]
    Missing(String),
    #[error("checkout metadata has an unreadable `{0}`")]
    Invalid(String),
}

impl From<MetadataError> for CoreError {
    fn from(err: MetadataError) -> Self {
        CoreError::ValidationError(err.to_string())
    }
}

/// Everything needed to create the order once payment completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderMetadata {
    pub user_id: Uuid,
    pub shipping_address: ShippingAddress,
    pub lines: Vec<ItemSnapshot>,
}

#[derive(Serialize, Deserialize)]
struct LineEntry {
    #[serde(rename = "p")]
    product_id: Uuid,
    #[serde(rename = "v")]
    variant_id: Uuid,
    #[serde(rename = "s")]
    sku: String,
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "q")]
    quantity: i32,
    #[serde(rename = "u")]
    unit_price_cents: i64,
}

fn item_key(index: usize) -> String {
    format!("item_{}", index)
}

fn truncate(value: &str, limit: usize) -> String {
    value.chars().take(limit).collect()
}

pub fn encode(user_id: Uuid, address: &ShippingAddress, lines: &[ItemSnapshot]) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert(USER_ID_KEY.to_string(), user_id.to_string());

    metadata.insert("ship_name".to_string(), address.name.clone());
    metadata.insert("ship_line1".to_string(), address.line1.clone());
    if let Some(line2) = &address.line2 {
        metadata.insert("ship_line2".to_string(), line2.clone());
    }
    metadata.insert("ship_city".to_string(), address.city.clone());
    if let Some(region) = &address.region {
        metadata.insert("ship_region".to_string(), region.clone());
    }
    metadata.insert("ship_postal_code".to_string(), address.postal_code.clone());
    metadata.insert("ship_country".to_string(), address.country.clone());

    metadata.insert(ITEM_COUNT_KEY.to_string(), lines.len().to_string());
    for (index, line) in lines.iter().enumerate() {
        let entry = LineEntry {
            product_id: line.product_id,
            variant_id: line.variant_id,
            sku: line.sku.clone(),
            name: truncate(&line.name, NAME_LIMIT),
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
        };
        // Serializing a struct of plain fields cannot fail.
        let value = serde_json::to_string(&entry).unwrap_or_default();
        metadata.insert(item_key(index), value);
    }

    metadata
}

fn required<'a>(metadata: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, MetadataError> {
    metadata
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MetadataError::Missing(key.to_string()))
}

fn optional(metadata: &BTreeMap<String, String>, key: &str) -> Option<String> {
    metadata.get(key).filter(|v| !v.is_empty()).cloned()
}

/// Read back the user id alone, used by subscription checkouts.
pub fn decode_user_id(metadata: &BTreeMap<String, String>) -> Result<Uuid, MetadataError> {
    let raw = required(metadata, USER_ID_KEY)?;
    Uuid::parse_str(raw).map_err(|_| MetadataError::Invalid(USER_ID_KEY.to_string()))
}

pub fn decode(metadata: &BTreeMap<String, String>) -> Result<OrderMetadata, MetadataError> {
    let user_id = decode_user_id(metadata)?;

    let shipping_address = ShippingAddress {
        name: required(metadata, "ship_name")?.to_string(),
        line1: required(metadata, "ship_line1")?.to_string(),
        line2: optional(metadata, "ship_line2"),
        city: required(metadata, "ship_city")?.to_string(),
        region: optional(metadata, "ship_region"),
        postal_code: required(metadata, "ship_postal_code")?.to_string(),
        country: required(metadata, "ship_country")?.to_string(),
    };

    let count: usize = required(metadata, ITEM_COUNT_KEY)?
        .parse()
        .map_err(|_| MetadataError::Invalid(ITEM_COUNT_KEY.to_string()))?;
    if count == 0 || count > MAX_CART_LINES {
        return Err(MetadataError::Invalid(ITEM_COUNT_KEY.to_string()));
    }

    let mut lines = Vec::with_capacity(count);
    for index in 0..count {
        let key = item_key(index);
        let entry: LineEntry =
            serde_json::from_str(required(metadata, &key)?).map_err(|_| MetadataError::Invalid(key.clone()))?;
        if entry.quantity <= 0 || entry.unit_price_cents < 0 {
            return Err(MetadataError::Invalid(key));
        }
        lines.push(ItemSnapshot {
            product_id: entry.product_id,
            variant_id: entry.variant_id,
            sku: entry.sku,
            name: entry.name,
            quantity: entry.quantity,
            unit_price_cents: entry.unit_price_cents,
        });
    }

    Ok(OrderMetadata {
        user_id,
        shipping_address,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Grace Hopper".to_string(),
            line1: "1 Compiler Way".to_string(),
            line2: Some("Suite 9".to_string()),
            city: "Arlington".to_string(),
            region: Some("VA".to_string()),
            postal_code: "22201".to_string(),
            country: "US".to_string(),
        }
    }

    fn line(name: &str) -> ItemSnapshot {
        ItemSnapshot {
            product_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            sku: "TEE-BLK-M".to_string(),
            name: name.to_string(),
            quantity: 2,
            unit_price_cents: 2597,
        }
    }

    #[test]
    fn test_snapshot_survives_metadata() {
        let user_id = Uuid::new_v4();
        let lines = vec![line("Guild Tee"), line("Guild Mug")];
        let metadata = encode(user_id, &address(), &lines);

        let decoded = decode(&metadata).unwrap();
        assert_eq!(decoded.user_id, user_id);
        assert_eq!(decoded.shipping_address, address());
        assert_eq!(decoded.lines, lines);
    }

    #[test]
    fn test_values_fit_provider_limits() {
        let long_name = "x".repeat(1000);
        let lines: Vec<ItemSnapshot> = (0..25).map(|_| line(&long_name)).collect();
        let metadata = encode(Uuid::new_v4(), &address(), &lines);

        assert!(metadata.len() <= 50);
        assert!(metadata.values().all(|v| v.chars().count() <= 500));
    }

    #[test]
    fn test_missing_and_invalid_keys() {
        let mut metadata = encode(Uuid::new_v4(), &address(), &[line("Guild Tee")]);
        metadata.remove("ship_city");
        assert_eq!(decode(&metadata), Err(MetadataError::Missing("ship_city".to_string())));

        let mut metadata = encode(Uuid::new_v4(), &address(), &[line("Guild Tee")]);
        metadata.insert("item_0".to_string(), "{not json".to_string());
        assert_eq!(decode(&metadata), Err(MetadataError::Invalid("item_0".to_string())));

        let mut metadata = encode(Uuid::new_v4(), &address(), &[line("Guild Tee")]);
        metadata.insert(ITEM_COUNT_KEY.to_string(), usize::MAX.to_string());
        assert_eq!(decode(&metadata), Err(MetadataError::Invalid("item_count".to_string())));

        let mut metadata = BTreeMap::new();
        metadata.insert(USER_ID_KEY.to_string(), "nope".to_string());
        assert_eq!(decode_user_id(&metadata), Err(MetadataError::Invalid("user_id".to_string())));
    }
}
