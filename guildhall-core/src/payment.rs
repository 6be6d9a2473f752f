use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ProviderError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMode::Payment => "payment",
            CheckoutMode::Subscription => "subscription",
        }
    }
}

/// One priced line of a hosted checkout page
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckoutLine {
    pub name: String,
    pub unit_amount_cents: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSessionRequest {
    pub mode: CheckoutMode,
    pub currency: String,
    /// Ad-hoc priced lines (payment mode)
    pub lines: Vec<CheckoutLine>,
    /// Recurring price (subscription mode)
    pub price_id: Option<String>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub client_reference_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortalSession {
    pub url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError>;

    /// Create a self-service billing portal session for a customer
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, ProviderError>;
}

// ============================================================================
// Webhook payloads
// ============================================================================

/// Envelope of every payment-provider webhook event
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    pub data: PaymentEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub mode: CheckoutMode,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutSessionObject {
    pub fn is_paid(&self) -> bool {
        matches!(self.payment_status.as_deref(), Some("paid") | Some("no_payment_required"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

impl SubscriptionObject {
    /// Price id of the first subscription item, used as the plan name
    pub fn plan(&self) -> Option<String> {
        self.items.data.first().map(|item| item.price.id.clone())
    }

    /// Newer API versions report the period end per item.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|item| item.current_period_end))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: PriceRef,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// Typed view of the events we act on
#[derive(Debug, Clone)]
pub enum PaymentEventKind {
    CheckoutCompleted(CheckoutSessionObject),
    AsyncPaymentSucceeded(CheckoutSessionObject),
    AsyncPaymentFailed(CheckoutSessionObject),
    SubscriptionUpdated(SubscriptionObject),
    SubscriptionDeleted(SubscriptionObject),
    InvoicePaymentFailed(InvoiceObject),
    Other(String),
}

impl PaymentEvent {
    pub fn kind(&self) -> Result<PaymentEventKind, serde_json::Error> {
        let object = self.data.object.clone();
        let kind = match self.event_type.as_str() {
            "checkout.session.completed" => {
                PaymentEventKind::CheckoutCompleted(serde_json::from_value(object)?)
            }
            "checkout.session.async_payment_succeeded" => {
                PaymentEventKind::AsyncPaymentSucceeded(serde_json::from_value(object)?)
            }
            "checkout.session.async_payment_failed" => {
                PaymentEventKind::AsyncPaymentFailed(serde_json::from_value(object)?)
            }
            "customer.subscription.updated" => {
                PaymentEventKind::SubscriptionUpdated(serde_json::from_value(object)?)
            }
            "customer.subscription.deleted" => {
                PaymentEventKind::SubscriptionDeleted(serde_json::from_value(object)?)
            }
            "invoice.payment_failed" => {
                PaymentEventKind::InvoicePaymentFailed(serde_json::from_value(object)?)
            }
            other => PaymentEventKind::Other(other.to_string()),
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_completed_deserialization() {
        let json = r#"
            {
                "id": "evt_1",
                "type": "checkout.session.completed",
                "created": 1700000000,
                "data": {
                    "object": {
                        "id": "cs_test_1",
                        "object": "checkout.session",
                        "mode": "payment",
                        "payment_status": "paid",
                        "customer": null,
                        "amount_total": 5194,
                        "currency": "usd",
                        "metadata": { "user_id": "abc" }
                    }
                }
            }
        "#;
        let event: PaymentEvent = serde_json::from_str(json).expect("Failed to deserialize");
        match event.kind().unwrap() {
            PaymentEventKind::CheckoutCompleted(session) => {
                assert_eq!(session.id, "cs_test_1");
                assert_eq!(session.mode, CheckoutMode::Payment);
                assert!(session.is_paid());
                assert_eq!(session.metadata.get("user_id").map(String::as_str), Some("abc"));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_subscription_plan_and_period_end() {
        let json = r#"
            {
                "id": "sub_1",
                "customer": "cus_1",
                "status": "past_due",
                "items": { "data": [ { "price": { "id": "price_member" }, "current_period_end": 1800000000 } ] }
            }
        "#;
        let sub: SubscriptionObject = serde_json::from_str(json).unwrap();
        assert_eq!(sub.plan().as_deref(), Some("price_member"));
        assert_eq!(sub.period_end(), Some(1800000000));
    }

    #[test]
    fn test_unknown_event_is_other() {
        let json = r#"{ "id": "evt_2", "type": "charge.refunded", "data": { "object": {} } }"#;
        let event: PaymentEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event.kind().unwrap(), PaymentEventKind::Other(t) if t == "charge.refunded"));
    }
}
