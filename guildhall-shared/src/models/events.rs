use crate::models::order::OrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit record of an order status change
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OrderStatusChangedEvent {
    pub order_id: Uuid,
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    /// Provider event type or id that caused the change
    pub source: String,
    pub occurred_at: DateTime<Utc>,
}

impl OrderStatusChangedEvent {
    pub fn new(order_id: Uuid, from: Option<OrderStatus>, to: OrderStatus, source: impl Into<String>) -> Self {
        Self {
            order_id,
            from,
            to,
            source: source.into(),
            occurred_at: Utc::now(),
        }
    }
}
