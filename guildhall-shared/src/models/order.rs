use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Delivered and cancelled orders are frozen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Paid => 1,
            OrderStatus::Processing => 2,
            OrderStatus::Shipped => 3,
            OrderStatus::Delivered => 4,
            OrderStatus::Cancelled => 5,
        }
    }

    /// Forward-only moves. An unpaid order can only become paid or cancelled;
    /// any other open order may be cancelled, including a shipped one the
    /// carrier returned.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (OrderStatus::Pending, OrderStatus::Paid) => true,
            (OrderStatus::Pending, OrderStatus::Cancelled) => true,
            (OrderStatus::Pending, _) => false,
            (current, next) => next.rank() > current.rank(),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid state transition from {from} to {to}")]
pub struct StatusTransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2
    pub country: String,
}

/// Shipment details reported by the fulfillment provider
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tracking {
    pub carrier: Option<String>,
    pub number: Option<String>,
    pub url: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
}

/// A verified cart line frozen at checkout time. The unit price is the one the
/// customer was charged and is never re-derived from the live catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

impl ItemSnapshot {
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

/// A paid (or payment-pending) merchandise purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_cents: i64,
    pub currency: String,
    pub shipping_address: ShippingAddress,
    /// Payment-provider checkout session that produced this order. Unique.
    pub payment_session_id: String,
    pub fulfillment_reference: Option<String>,
    pub tracking: Tracking,
    pub needs_attention: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        user_id: Uuid,
        payment_session_id: String,
        currency: String,
        shipping_address: ShippingAddress,
        status: OrderStatus,
        lines: &[ItemSnapshot],
    ) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let items: Vec<OrderItem> = lines.iter().map(|line| OrderItem::from_snapshot(id, line)).collect();

        Self {
            id,
            user_id,
            status,
            total_cents: lines.iter().map(ItemSnapshot::line_total_cents).sum(),
            items,
            currency,
            shipping_address,
            payment_session_id,
            fulfillment_reference: None,
            tracking: Tracking::default(),
            needs_attention: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`. `Ok(false)` when the order is already there, which keeps
    /// redelivered provider events harmless.
    pub fn transition(&mut self, next: OrderStatus) -> Result<bool, StatusTransitionError> {
        if self.status == next {
            return Ok(false);
        }
        if !self.status.can_transition_to(next) {
            return Err(StatusTransitionError {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.updated_at = Utc::now();
        Ok(true)
    }

    /// Sum of the frozen line totals
    pub fn items_total_cents(&self) -> i64 {
        self.items.iter().map(OrderItem::line_total_cents).sum()
    }
}

/// An individual product line within an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

impl OrderItem {
    pub fn from_snapshot(order_id: Uuid, line: &ItemSnapshot) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id: line.product_id,
            variant_id: line.variant_id,
            sku: line.sku.clone(),
            name: line.name.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
        }
    }

    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Ada Lovelace".to_string(),
            line1: "12 Analytical Row".to_string(),
            line2: None,
            city: "London".to_string(),
            region: None,
            postal_code: "N1 9GU".to_string(),
            country: "GB".to_string(),
        }
    }

    fn line(quantity: i32, unit_price_cents: i64) -> ItemSnapshot {
        ItemSnapshot {
            product_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            sku: "TEE-BLK-M".to_string(),
            name: "Guild Tee".to_string(),
            quantity,
            unit_price_cents,
        }
    }

    #[test]
    fn test_total_is_sum_of_snapshots() {
        let order = Order::new(
            Uuid::new_v4(),
            "cs_test_1".to_string(),
            "usd".to_string(),
            address(),
            OrderStatus::Paid,
            &[line(2, 2597), line(1, 1000)],
        );

        assert_eq!(order.total_cents, 6194);
        assert_eq!(order.items_total_cents(), order.total_cents);
        assert!(order.items.iter().all(|i| i.order_id == order.id));
    }

    #[test]
    fn test_order_lifecycle() {
        let mut order = Order::new(
            Uuid::new_v4(),
            "cs_test_2".to_string(),
            "usd".to_string(),
            address(),
            OrderStatus::Pending,
            &[line(1, 500)],
        );

        assert_eq!(order.transition(OrderStatus::Paid), Ok(true));
        assert_eq!(order.transition(OrderStatus::Processing), Ok(true));
        assert_eq!(order.transition(OrderStatus::Processing), Ok(false));
        assert_eq!(order.transition(OrderStatus::Shipped), Ok(true));
        assert_eq!(order.transition(OrderStatus::Delivered), Ok(true));
        assert!(order.transition(OrderStatus::Cancelled).is_err());
    }

    #[test]
    fn test_invalid_transition() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("refunded".parse::<OrderStatus>().is_err());
    }
}
