use async_trait::async_trait;
use guildhall_shared::ShippingAddress;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ProviderError;

/// Article as listed by the print-on-demand provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteArticle {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variants: Vec<RemoteVariant>,
    /// Image URLs, display order
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteVariant {
    pub sku: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Provider base price in major units, e.g. `19.98`
    pub price: Decimal,
    #[serde(default)]
    pub stock: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteStock {
    pub sku: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FulfillmentLine {
    pub sku: String,
    pub quantity: i32,
}

/// Print order submitted once payment has cleared. `reference` is our order
/// id and comes back on every webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FulfillmentOrderRequest {
    pub reference: String,
    pub recipient: ShippingAddress,
    pub items: Vec<FulfillmentLine>,
}

#[async_trait]
pub trait FulfillmentProvider: Send + Sync {
    /// Full article list with variants, stock and images
    async fn list_articles(&self) -> Result<Vec<RemoteArticle>, ProviderError>;

    async fn list_stock(&self) -> Result<Vec<RemoteStock>, ProviderError>;

    /// Submit a print order, returning the provider's order id
    async fn create_order(&self, request: &FulfillmentOrderRequest) -> Result<String, ProviderError>;
}

// ============================================================================
// Webhook payloads
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FulfillmentEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: FulfillmentEventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FulfillmentEventData {
    /// Our order id, echoed back by the provider
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentInfo {
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentEventKind {
    Processed,
    ShipmentSent(ShipmentInfo),
    Delivered,
    Cancelled,
    NeedsAction(String),
    Other(String),
}

impl FulfillmentEvent {
    pub fn kind(&self) -> FulfillmentEventKind {
        match self.event_type.as_str() {
            "order.processed" => FulfillmentEventKind::Processed,
            "shipment.sent" => FulfillmentEventKind::ShipmentSent(ShipmentInfo {
                carrier: self.data.carrier.clone(),
                tracking_number: self.data.tracking_number.clone(),
                tracking_url: self.data.tracking_url.clone(),
            }),
            "shipment.delivered" => FulfillmentEventKind::Delivered,
            "order.cancelled" => FulfillmentEventKind::Cancelled,
            "order.needs-action" => FulfillmentEventKind::NeedsAction(
                self.data
                    .reason
                    .clone()
                    .unwrap_or_else(|| "provider requested action".to_string()),
            ),
            other => FulfillmentEventKind::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipment_event() {
        let json = r#"
            {
                "type": "shipment.sent",
                "data": {
                    "reference": "7d8f1c52-0d0e-4bd6-9d55-5d7f3a0f5c11",
                    "carrier": "DHL",
                    "tracking_number": "JD0001",
                    "tracking_url": "https://track.example/JD0001"
                }
            }
        "#;
        let event: FulfillmentEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event.kind(),
            FulfillmentEventKind::ShipmentSent(ShipmentInfo {
                carrier: Some("DHL".to_string()),
                tracking_number: Some("JD0001".to_string()),
                tracking_url: Some("https://track.example/JD0001".to_string()),
            })
        );
    }

    #[test]
    fn test_needs_action_defaults_reason() {
        let event: FulfillmentEvent =
            serde_json::from_str(r#"{ "type": "order.needs-action", "data": { "reference": "x" } }"#).unwrap();
        assert!(matches!(event.kind(), FulfillmentEventKind::NeedsAction(_)));
    }

    #[test]
    fn test_remote_article_price_parses() {
        let json = r#"
            {
                "id": "art_1",
                "name": "Guild Tee",
                "variants": [ { "sku": "TEE-BLK-M", "size": "M", "color": "black", "price": "19.98", "stock": 4 } ],
                "images": [ "https://img.example/tee.png" ]
            }
        "#;
        let article: RemoteArticle = serde_json::from_str(json).unwrap();
        assert_eq!(article.variants[0].price, Decimal::new(1998, 2));
        assert_eq!(article.images.len(), 1);
    }
}
