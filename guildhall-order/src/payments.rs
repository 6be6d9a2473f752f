use chrono::{DateTime, Duration, TimeZone, Utc};
use guildhall_core::fulfillment::{FulfillmentLine, FulfillmentOrderRequest, FulfillmentProvider};
use guildhall_core::payment::{
    CheckoutMode, CheckoutSessionObject, InvoiceObject, PaymentEvent, PaymentEventKind, SubscriptionObject,
};
use guildhall_core::repository::{LedgerClaim, OrderRepository, ProfileRepository, WebhookLedger};
use guildhall_core::{CoreError, CoreResult};
use guildhall_shared::{Order, OrderStatus, OrderStatusChangedEvent, SubscriptionStatus};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::metadata;
use crate::{concurrent_change, EventOutcome};

pub const PAYMENT_PROVIDER: &str = "stripe";

/// A claim older than this belongs to a worker that died mid-event.
const STALE_CLAIM_MINUTES: i64 = 10;

/// Applies verified payment-provider events to orders and profiles
pub struct PaymentEventProcessor {
    orders: Arc<dyn OrderRepository>,
    profiles: Arc<dyn ProfileRepository>,
    ledger: Arc<dyn WebhookLedger>,
    fulfillment: Arc<dyn FulfillmentProvider>,
    currency: String,
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

impl PaymentEventProcessor {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        profiles: Arc<dyn ProfileRepository>,
        ledger: Arc<dyn WebhookLedger>,
        fulfillment: Arc<dyn FulfillmentProvider>,
        currency: String,
    ) -> Self {
        Self {
            orders,
            profiles,
            ledger,
            fulfillment,
            currency,
        }
    }

    /// Process one event exactly once. A failure releases the ledger claim so
    /// the provider's retry gets a clean attempt.
    pub async fn process(&self, event: &PaymentEvent) -> CoreResult<EventOutcome> {
        let stale_before = Utc::now() - Duration::minutes(STALE_CLAIM_MINUTES);
        match self
            .ledger
            .claim(PAYMENT_PROVIDER, &event.id, &event.event_type, stale_before)
            .await?
        {
            LedgerClaim::Claimed => {}
            LedgerClaim::AlreadyProcessed => {
                info!(event_id = %event.id, event_type = %event.event_type, "Duplicate payment event acknowledged");
                return Ok(EventOutcome::Duplicate);
            }
            LedgerClaim::InProgress => {
                return Err(CoreError::Conflict(format!("event {} is being processed", event.id)));
            }
        }

        match self.dispatch(event).await {
            Ok(outcome) => {
                self.ledger.complete(PAYMENT_PROVIDER, &event.id).await?;
                Ok(outcome)
            }
            Err(err) => {
                error!(event_id = %event.id, event_type = %event.event_type, error = %err, "Payment event failed");
                if let Err(release_err) = self.ledger.release(PAYMENT_PROVIDER, &event.id).await {
                    error!(event_id = %event.id, error = %release_err, "Failed to release ledger claim");
                }
                Err(err)
            }
        }
    }

    async fn dispatch(&self, event: &PaymentEvent) -> CoreResult<EventOutcome> {
        let kind = event
            .kind()
            .map_err(|e| CoreError::ValidationError(format!("malformed {} payload: {}", event.event_type, e)))?;

        match kind {
            PaymentEventKind::CheckoutCompleted(session) => match session.mode {
                CheckoutMode::Payment => self.complete_order(&session, &event.event_type).await,
                CheckoutMode::Subscription => self.activate_subscription(&session).await,
            },
            PaymentEventKind::AsyncPaymentSucceeded(session) => {
                self.complete_order(&session, &event.event_type).await
            }
            PaymentEventKind::AsyncPaymentFailed(session) => self.fail_order(&session, &event.event_type).await,
            PaymentEventKind::SubscriptionUpdated(subscription) => self.update_subscription(&subscription).await,
            PaymentEventKind::SubscriptionDeleted(subscription) => self.end_subscription(&subscription).await,
            PaymentEventKind::InvoicePaymentFailed(invoice) => self.mark_past_due(&invoice).await,
            PaymentEventKind::Other(event_type) => {
                debug!(event_id = %event.id, event_type = %event_type, "Ignoring payment event");
                Ok(EventOutcome::Ignored)
            }
        }
    }

    /// Create the order for a completed session, or advance the one a previous
    /// delivery created.
    async fn complete_order(&self, session: &CheckoutSessionObject, source: &str) -> CoreResult<EventOutcome> {
        if let Some(existing) = self.orders.find_by_payment_session(&session.id).await? {
            return self.advance_existing(existing, session, source).await;
        }

        let snapshot = metadata::decode(&session.metadata)?;
        self.profiles.ensure_profile(snapshot.user_id, None).await?;
        let status = if session.is_paid() {
            OrderStatus::Paid
        } else {
            OrderStatus::Pending
        };
        let currency = session.currency.clone().unwrap_or_else(|| self.currency.clone());

        let mut order = Order::new(
            snapshot.user_id,
            session.id.clone(),
            currency,
            snapshot.shipping_address,
            status,
            &snapshot.lines,
        );

        if let Some(charged) = session.amount_total {
            if charged != order.total_cents {
                warn!(
                    order_id = %order.id,
                    charged,
                    expected = order.total_cents,
                    "Charged amount differs from the checkout snapshot"
                );
                order.needs_attention = Some(format!(
                    "charged {} but snapshot total is {}",
                    charged, order.total_cents
                ));
            }
        }

        if !self.orders.create_order(&order).await? {
            // Lost a race with a concurrent delivery of a sibling event.
            let existing = self
                .orders
                .find_by_payment_session(&session.id)
                .await?
                .ok_or_else(|| CoreError::InternalError("order vanished after conflict".to_string()))?;
            return self.advance_existing(existing, session, source).await;
        }

        self.orders
            .add_order_change(&OrderStatusChangedEvent::new(order.id, None, order.status, source))
            .await?;
        info!(order_id = %order.id, status = %order.status, total_cents = order.total_cents, "Order created");

        if order.status == OrderStatus::Paid {
            self.submit_to_fulfillment(&order).await?;
        }
        Ok(EventOutcome::Processed)
    }

    async fn advance_existing(
        &self,
        mut order: Order,
        session: &CheckoutSessionObject,
        source: &str,
    ) -> CoreResult<EventOutcome> {
        let mut changed = false;

        if order.status == OrderStatus::Pending && session.is_paid() {
            order.transition(OrderStatus::Paid).map_err(|e| CoreError::InternalError(e.to_string()))?;
            if !self.orders.save_order(&order, OrderStatus::Pending).await? {
                return Err(concurrent_change(&order));
            }
            self.orders
                .add_order_change(&OrderStatusChangedEvent::new(
                    order.id,
                    Some(OrderStatus::Pending),
                    OrderStatus::Paid,
                    source,
                ))
                .await?;
            info!(order_id = %order.id, "Pending order is now paid");
            changed = true;
        }

        if order.status == OrderStatus::Paid && order.fulfillment_reference.is_none() {
            self.submit_to_fulfillment(&order).await?;
            changed = true;
        }

        Ok(if changed {
            EventOutcome::Processed
        } else {
            EventOutcome::Duplicate
        })
    }

    /// Only the reference is written back; the provider may already have moved
    /// the order on through its own webhook while `create_order` was in flight.
    async fn submit_to_fulfillment(&self, order: &Order) -> CoreResult<()> {
        let request = FulfillmentOrderRequest {
            reference: order.id.to_string(),
            recipient: order.shipping_address.clone(),
            items: order
                .items
                .iter()
                .map(|item| FulfillmentLine {
                    sku: item.sku.clone(),
                    quantity: item.quantity,
                })
                .collect(),
        };

        let remote_id = self.fulfillment.create_order(&request).await?;
        self.orders.set_fulfillment_reference(order.id, &remote_id).await?;

        info!(order_id = %order.id, fulfillment_reference = %remote_id, "Order submitted for fulfillment");
        Ok(())
    }

    async fn fail_order(&self, session: &CheckoutSessionObject, source: &str) -> CoreResult<EventOutcome> {
        let Some(mut order) = self.orders.find_by_payment_session(&session.id).await? else {
            warn!(session_id = %session.id, "Async payment failed for a session without an order");
            return Ok(EventOutcome::Ignored);
        };

        let from = order.status;
        match order.transition(OrderStatus::Cancelled) {
            Ok(true) => {
                if !self.orders.save_order(&order, from).await? {
                    return Err(concurrent_change(&order));
                }
                self.orders
                    .add_order_change(&OrderStatusChangedEvent::new(
                        order.id,
                        Some(from),
                        OrderStatus::Cancelled,
                        source,
                    ))
                    .await?;
                info!(order_id = %order.id, "Order cancelled after failed payment");
                Ok(EventOutcome::Processed)
            }
            Ok(false) => Ok(EventOutcome::Duplicate),
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Ignoring payment failure for order");
                Ok(EventOutcome::Ignored)
            }
        }
    }

    async fn activate_subscription(&self, session: &CheckoutSessionObject) -> CoreResult<EventOutcome> {
        let user_id = match metadata::decode_user_id(&session.metadata) {
            Ok(id) => id,
            Err(err) => session
                .client_reference_id
                .as_deref()
                .and_then(|r| uuid::Uuid::parse_str(r).ok())
                .ok_or(err)?,
        };

        let mut profile = self.profiles.ensure_profile(user_id, None).await?;
        if session.customer.is_some() {
            profile.customer_id = session.customer.clone();
        }
        profile.subscription_id = session.subscription.clone();
        profile.subscription_status = SubscriptionStatus::Active;
        if let Some(plan) = session.metadata.get(metadata::PLAN_KEY) {
            profile.subscription_plan = Some(plan.clone());
        }
        profile.updated_at = Utc::now();
        self.profiles.save_profile(&profile).await?;

        info!(user_id = %user_id, "Membership subscription activated");
        Ok(EventOutcome::Processed)
    }

    async fn update_subscription(&self, subscription: &SubscriptionObject) -> CoreResult<EventOutcome> {
        let Some(mut profile) = self.profiles.find_by_customer(&subscription.customer).await? else {
            warn!(subscription_id = %subscription.id, "Subscription update for an unknown customer");
            return Ok(EventOutcome::Ignored);
        };

        profile.subscription_status = SubscriptionStatus::from_remote(&subscription.status);
        profile.subscription_id = Some(subscription.id.clone());
        if let Some(plan) = subscription.plan() {
            profile.subscription_plan = Some(plan);
        }
        profile.current_period_end = subscription.period_end().and_then(timestamp);
        profile.updated_at = Utc::now();
        self.profiles.save_profile(&profile).await?;

        info!(
            user_id = %profile.id,
            remote_status = %subscription.status,
            status = %profile.subscription_status,
            "Subscription updated"
        );
        Ok(EventOutcome::Processed)
    }

    async fn end_subscription(&self, subscription: &SubscriptionObject) -> CoreResult<EventOutcome> {
        let Some(mut profile) = self.profiles.find_by_customer(&subscription.customer).await? else {
            warn!(subscription_id = %subscription.id, "Subscription deletion for an unknown customer");
            return Ok(EventOutcome::Ignored);
        };

        profile.clear_subscription();
        self.profiles.save_profile(&profile).await?;
        info!(user_id = %profile.id, "Subscription ended");
        Ok(EventOutcome::Processed)
    }

    async fn mark_past_due(&self, invoice: &InvoiceObject) -> CoreResult<EventOutcome> {
        let Some(customer) = invoice.customer.as_deref() else {
            debug!(invoice_id = %invoice.id, "Failed invoice without a customer");
            return Ok(EventOutcome::Ignored);
        };
        let Some(mut profile) = self.profiles.find_by_customer(customer).await? else {
            warn!(invoice_id = %invoice.id, "Failed invoice for an unknown customer");
            return Ok(EventOutcome::Ignored);
        };

        profile.subscription_status = SubscriptionStatus::PastDue;
        profile.updated_at = Utc::now();
        self.profiles.save_profile(&profile).await?;
        warn!(user_id = %profile.id, invoice_id = %invoice.id, "Membership payment failed");
        Ok(EventOutcome::Processed)
    }
}
