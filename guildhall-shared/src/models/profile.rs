use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Local subscription vocabulary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Inactive,
}

impl SubscriptionStatus {
    /// Collapse the payment provider's subscription states onto ours.
    pub fn from_remote(status: &str) -> Self {
        match status {
            "active" | "trialing" => SubscriptionStatus::Active,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            "canceled" | "incomplete_expired" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Inactive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "inactive" => Some(SubscriptionStatus::Inactive),
            _ => None,
        }
    }

    /// Has a live subscription record (possibly needing a payment fix).
    pub fn is_subscribed(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::PastDue)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Member profile, 1:1 with the auth identity. Subscription fields are written
/// only by payment webhook processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
    pub subscription_status: SubscriptionStatus,
    pub subscription_plan: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: Uuid, email: Option<String>) -> Self {
        Self {
            id,
            email,
            display_name: None,
            role: Role::Member,
            subscription_status: SubscriptionStatus::Inactive,
            subscription_plan: None,
            customer_id: None,
            subscription_id: None,
            current_period_end: None,
            updated_at: Utc::now(),
        }
    }

    pub fn clear_subscription(&mut self) {
        self.subscription_status = SubscriptionStatus::Canceled;
        self.subscription_plan = None;
        self.subscription_id = None;
        self.current_period_end = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_status_mapping() {
        assert_eq!(SubscriptionStatus::from_remote("active"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_remote("trialing"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_remote("past_due"), SubscriptionStatus::PastDue);
        assert_eq!(SubscriptionStatus::from_remote("unpaid"), SubscriptionStatus::PastDue);
        assert_eq!(SubscriptionStatus::from_remote("canceled"), SubscriptionStatus::Canceled);
        assert_eq!(
            SubscriptionStatus::from_remote("incomplete_expired"),
            SubscriptionStatus::Canceled
        );
        assert_eq!(SubscriptionStatus::from_remote("incomplete"), SubscriptionStatus::Inactive);
        assert_eq!(SubscriptionStatus::from_remote("paused"), SubscriptionStatus::Inactive);
    }

    #[test]
    fn test_clear_subscription() {
        let mut profile = Profile::new(Uuid::new_v4(), None);
        profile.subscription_status = SubscriptionStatus::Active;
        profile.subscription_id = Some("sub_123".to_string());
        profile.subscription_plan = Some("price_member".to_string());
        profile.customer_id = Some("cus_123".to_string());

        profile.clear_subscription();

        assert_eq!(profile.subscription_status, SubscriptionStatus::Canceled);
        assert!(profile.subscription_id.is_none());
        assert!(profile.subscription_plan.is_none());
        // the customer survives so they can resubscribe through the portal
        assert_eq!(profile.customer_id.as_deref(), Some("cus_123"));
    }
}
