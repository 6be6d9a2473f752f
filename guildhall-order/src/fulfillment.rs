use chrono::Utc;
use guildhall_core::fulfillment::{FulfillmentEvent, FulfillmentEventKind, ShipmentInfo};
use guildhall_core::repository::OrderRepository;
use guildhall_core::{CoreError, CoreResult};
use guildhall_shared::{Order, OrderStatus, OrderStatusChangedEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{concurrent_change, EventOutcome};

/// Applies print-provider progress events to orders. Status only moves
/// forward; anything else is acknowledged and dropped.
pub struct FulfillmentEventProcessor {
    orders: Arc<dyn OrderRepository>,
}

impl FulfillmentEventProcessor {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    pub async fn process(&self, event: &FulfillmentEvent) -> CoreResult<EventOutcome> {
        let kind = event.kind();
        if let FulfillmentEventKind::Other(event_type) = &kind {
            debug!(event_type = %event_type, "Ignoring fulfillment event");
            return Ok(EventOutcome::Ignored);
        }

        let reference = event
            .data
            .reference
            .as_deref()
            .ok_or_else(|| CoreError::ValidationError("fulfillment event without reference".to_string()))?;
        let order_id = Uuid::parse_str(reference.trim())
            .map_err(|_| CoreError::ValidationError(format!("malformed order reference `{}`", reference)))?;

        let Some(mut order) = self.orders.get_order(order_id).await? else {
            // Retrying will not make the order appear, so acknowledge.
            warn!(order_id = %order_id, event_type = %event.event_type, "Fulfillment event for unknown order");
            return Ok(EventOutcome::Ignored);
        };

        match kind {
            FulfillmentEventKind::Processed => self.advance(&mut order, OrderStatus::Processing, event, None).await,
            FulfillmentEventKind::ShipmentSent(shipment) => {
                self.advance(&mut order, OrderStatus::Shipped, event, Some(shipment)).await
            }
            FulfillmentEventKind::Delivered => self.advance(&mut order, OrderStatus::Delivered, event, None).await,
            FulfillmentEventKind::Cancelled => self.advance(&mut order, OrderStatus::Cancelled, event, None).await,
            FulfillmentEventKind::NeedsAction(reason) => self.flag(&mut order, reason).await,
            FulfillmentEventKind::Other(_) => Ok(EventOutcome::Ignored),
        }
    }

    async fn advance(
        &self,
        order: &mut Order,
        next: OrderStatus,
        event: &FulfillmentEvent,
        shipment: Option<ShipmentInfo>,
    ) -> CoreResult<EventOutcome> {
        let from = order.status;
        match order.transition(next) {
            Ok(true) => {}
            Ok(false) => {
                debug!(order_id = %order.id, status = %next, "Repeated fulfillment event");
                return Ok(EventOutcome::Duplicate);
            }
            Err(e) => {
                info!(order_id = %order.id, error = %e, event_type = %event.event_type, "Ignoring fulfillment event");
                return Ok(EventOutcome::Ignored);
            }
        }

        if let Some(shipment) = shipment {
            order.tracking.carrier = shipment.carrier;
            order.tracking.number = shipment.tracking_number;
            order.tracking.url = shipment.tracking_url;
            order.tracking.shipped_at = Some(Utc::now());
        }

        if !self.orders.save_order(order, from).await? {
            return Err(concurrent_change(order));
        }
        self.orders
            .add_order_change(&OrderStatusChangedEvent::new(order.id, Some(from), next, event.event_type.as_str()))
            .await?;

        info!(order_id = %order.id, from = %from, to = %next, "Order status updated by fulfillment");
        Ok(EventOutcome::Processed)
    }

    async fn flag(&self, order: &mut Order, reason: String) -> CoreResult<EventOutcome> {
        if order.status.is_terminal() {
            info!(order_id = %order.id, status = %order.status, "Ignoring action request for closed order");
            return Ok(EventOutcome::Ignored);
        }
        if order.needs_attention.as_deref() == Some(reason.as_str()) {
            return Ok(EventOutcome::Duplicate);
        }

        warn!(order_id = %order.id, reason = %reason, "Fulfillment provider needs action on order");
        order.needs_attention = Some(reason);
        order.updated_at = Utc::now();
        let current = order.status;
        if !self.orders.save_order(order, current).await? {
            return Err(concurrent_change(order));
        }
        Ok(EventOutcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildhall_shared::{ItemSnapshot, ShippingAddress};
    use guildhall_store::memory::InMemoryOrderRepository;
    use serde_json::json;

    async fn setup(status: OrderStatus) -> (FulfillmentEventProcessor, Arc<InMemoryOrderRepository>, Uuid) {
        let repo = Arc::new(InMemoryOrderRepository::default());
        let order = Order::new(
            Uuid::new_v4(),
            "cs_1".to_string(),
            "usd".to_string(),
            ShippingAddress {
                name: "Ada Lovelace".to_string(),
                line1: "12 Analytical Row".to_string(),
                line2: None,
                city: "London".to_string(),
                region: None,
                postal_code: "N1 9GU".to_string(),
                country: "GB".to_string(),
            },
            status,
            &[ItemSnapshot {
                product_id: Uuid::new_v4(),
                variant_id: Uuid::new_v4(),
                sku: "MUG".to_string(),
                name: "Guild Mug".to_string(),
                quantity: 1,
                unit_price_cents: 1560,
            }],
        );
        repo.create_order(&order).await.unwrap();
        (FulfillmentEventProcessor::new(repo.clone()), repo, order.id)
    }

    fn event(event_type: &str, data: serde_json::Value) -> FulfillmentEvent {
        serde_json::from_value(json!({ "type": event_type, "data": data })).unwrap()
    }

    #[tokio::test]
    async fn test_full_progression_with_tracking() {
        let (processor, repo, id) = setup(OrderStatus::Paid).await;

        processor
            .process(&event("order.processed", json!({ "reference": id.to_string() })))
            .await
            .unwrap();
        processor
            .process(&event(
                "shipment.sent",
                json!({
                    "reference": id.to_string(),
                    "carrier": "DHL",
                    "tracking_number": "JD0001",
                    "tracking_url": "https://track.example/JD0001"
                }),
            ))
            .await
            .unwrap();

        let order = repo.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.tracking.carrier.as_deref(), Some("DHL"));
        assert_eq!(order.tracking.number.as_deref(), Some("JD0001"));
        assert!(order.tracking.shipped_at.is_some());

        processor
            .process(&event("shipment.delivered", json!({ "reference": id.to_string() })))
            .await
            .unwrap();
        assert_eq!(repo.get_order(id).await.unwrap().unwrap().status, OrderStatus::Delivered);
        assert_eq!(repo.list_order_changes(id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_repeat_and_backward_moves_are_noops() {
        let (processor, repo, id) = setup(OrderStatus::Shipped).await;

        let outcome = processor
            .process(&event("shipment.sent", json!({ "reference": id.to_string(), "carrier": "UPS" })))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Duplicate);

        let outcome = processor
            .process(&event("order.processed", json!({ "reference": id.to_string() })))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Ignored);

        let order = repo.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.tracking.carrier, None);
    }

    #[tokio::test]
    async fn test_terminal_orders_never_change() {
        for status in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            let (processor, repo, id) = setup(status).await;
            for event_type in ["order.processed", "shipment.sent", "order.cancelled", "order.needs-action"] {
                processor
                    .process(&event(event_type, json!({ "reference": id.to_string(), "reason": "x" })))
                    .await
                    .unwrap();
            }
            let order = repo.get_order(id).await.unwrap().unwrap();
            assert_eq!(order.status, status);
            assert!(order.needs_attention.is_none());
        }
    }

    #[tokio::test]
    async fn test_needs_action_keeps_status() {
        let (processor, repo, id) = setup(OrderStatus::Processing).await;
        processor
            .process(&event(
                "order.needs-action",
                json!({ "reference": id.to_string(), "reason": "Artwork resolution too low" }),
            ))
            .await
            .unwrap();

        let order = repo.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.needs_attention.as_deref(), Some("Artwork resolution too low"));
    }

    #[tokio::test]
    async fn test_reference_handling() {
        let (processor, _repo, _id) = setup(OrderStatus::Paid).await;

        let unknown = processor
            .process(&event("order.processed", json!({ "reference": Uuid::new_v4().to_string() })))
            .await
            .unwrap();
        assert_eq!(unknown, EventOutcome::Ignored);

        let malformed = processor
            .process(&event("order.processed", json!({ "reference": "order-42" })))
            .await;
        assert!(matches!(malformed, Err(CoreError::ValidationError(_))));

        let missing = processor.process(&event("order.processed", json!({}))).await;
        assert!(matches!(missing, Err(CoreError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_cancel_before_shipping() {
        let (processor, repo, id) = setup(OrderStatus::Processing).await;
        processor
            .process(&event("order.cancelled", json!({ "reference": id.to_string() })))
            .await
            .unwrap();
        assert_eq!(repo.get_order(id).await.unwrap().unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_after_shipping() {
        let (processor, repo, id) = setup(OrderStatus::Shipped).await;
        let outcome = processor
            .process(&event("order.cancelled", json!({ "reference": id.to_string() })))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Processed);
        assert_eq!(repo.get_order(id).await.unwrap().unwrap().status, OrderStatus::Cancelled);

        let history = repo.list_order_changes(id).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.from, Some(OrderStatus::Shipped));
        assert_eq!(last.to, OrderStatus::Cancelled);
    }
}
