use guildhall_core::payment::{CheckoutMode, CheckoutSessionRequest, PaymentProvider, PortalSession};
use guildhall_core::policy::{authorize, Principal, Requirement};
use guildhall_core::repository::ProfileRepository;
use guildhall_core::{CoreError, CoreResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::metadata::{PLAN_KEY, USER_ID_KEY};

#[derive(Debug, Clone)]
pub struct BillingUrls {
    pub success_url: String,
    pub cancel_url: String,
    pub portal_return_url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubscribeRedirect {
    pub session_id: String,
    pub url: String,
}

/// Membership subscription checkout and the self-service billing portal
pub struct BillingService {
    profiles: Arc<dyn ProfileRepository>,
    payments: Arc<dyn PaymentProvider>,
    membership_price_id: String,
    currency: String,
    urls: BillingUrls,
}

impl BillingService {
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        payments: Arc<dyn PaymentProvider>,
        membership_price_id: String,
        currency: String,
        urls: BillingUrls,
    ) -> Self {
        Self {
            profiles,
            payments,
            membership_price_id,
            currency,
            urls,
        }
    }

    pub async fn subscribe(&self, principal: &Principal) -> CoreResult<SubscribeRedirect> {
        let profile = self
            .profiles
            .ensure_profile(principal.user_id, principal.email.as_deref())
            .await?;

        if profile.subscription_status.is_subscribed() {
            return Err(CoreError::Conflict("membership is already active".to_string()));
        }

        let mut metadata = BTreeMap::new();
        metadata.insert(USER_ID_KEY.to_string(), principal.user_id.to_string());
        metadata.insert(PLAN_KEY.to_string(), self.membership_price_id.clone());

        let request = CheckoutSessionRequest {
            mode: CheckoutMode::Subscription,
            currency: self.currency.clone(),
            lines: Vec::new(),
            price_id: Some(self.membership_price_id.clone()),
            // Returning members keep their customer record.
            customer_email: if profile.customer_id.is_none() {
                profile.email.clone()
            } else {
                None
            },
            customer_id: profile.customer_id.clone(),
            client_reference_id: Some(principal.user_id.to_string()),
            success_url: self.urls.success_url.clone(),
            cancel_url: self.urls.cancel_url.clone(),
            metadata,
        };

        let session = self.payments.create_checkout_session(&request).await?;
        info!(user_id = %principal.user_id, session_id = %session.id, "Membership checkout created");

        Ok(SubscribeRedirect {
            session_id: session.id,
            url: session.url,
        })
    }

    pub async fn portal(&self, principal: &Principal) -> CoreResult<PortalSession> {
        let profile = self.profiles.get_profile(principal.user_id).await?;
        let status = profile.as_ref().map(|p| p.subscription_status);
        authorize(Some(principal), status, Requirement::Subscriber)?;

        let customer_id = profile
            .and_then(|p| p.customer_id)
            .ok_or_else(|| CoreError::NotFoundError("no billing customer on file".to_string()))?;

        let session = self
            .payments
            .create_portal_session(&customer_id, &self.urls.portal_return_url)
            .await?;
        info!(user_id = %principal.user_id, "Billing portal session created");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildhall_shared::{Role, SubscriptionStatus};
    use guildhall_store::memory::InMemoryProfileRepository;
    use guildhall_store::mock::MockPaymentProvider;
    use uuid::Uuid;

    fn service() -> (BillingService, Arc<InMemoryProfileRepository>, Arc<MockPaymentProvider>) {
        let profiles = Arc::new(InMemoryProfileRepository::default());
        let payments = Arc::new(MockPaymentProvider::default());
        let service = BillingService::new(
            profiles.clone(),
            payments.clone(),
            "price_member".to_string(),
            "usd".to_string(),
            BillingUrls {
                success_url: "https://guild.example/welcome".to_string(),
                cancel_url: "https://guild.example/join".to_string(),
                portal_return_url: "https://guild.example/account".to_string(),
            },
        );
        (service, profiles, payments)
    }

    fn principal() -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: Some("member@example.com".to_string()),
            role: Role::Member,
        }
    }

    #[tokio::test]
    async fn test_subscribe_creates_subscription_session() {
        let (service, _profiles, payments) = service();
        let who = principal();

        service.subscribe(&who).await.unwrap();

        let requests = payments.checkout_requests();
        assert_eq!(requests[0].mode, CheckoutMode::Subscription);
        assert_eq!(requests[0].price_id.as_deref(), Some("price_member"));
        assert_eq!(requests[0].metadata.get("user_id"), Some(&who.user_id.to_string()));
        assert_eq!(requests[0].customer_email.as_deref(), Some("member@example.com"));
    }

    #[tokio::test]
    async fn test_subscribe_reuses_customer() {
        let (service, profiles, payments) = service();
        let who = principal();
        let mut profile = profiles.ensure_profile(who.user_id, None).await.unwrap();
        profile.customer_id = Some("cus_old".to_string());
        profile.subscription_status = SubscriptionStatus::Canceled;
        profiles.save_profile(&profile).await.unwrap();

        service.subscribe(&who).await.unwrap();
        let requests = payments.checkout_requests();
        assert_eq!(requests[0].customer_id.as_deref(), Some("cus_old"));
        assert_eq!(requests[0].customer_email, None);
    }

    #[tokio::test]
    async fn test_active_member_cannot_subscribe_twice() {
        let (service, profiles, _payments) = service();
        let who = principal();
        let mut profile = profiles.ensure_profile(who.user_id, None).await.unwrap();
        profile.subscription_status = SubscriptionStatus::Active;
        profiles.save_profile(&profile).await.unwrap();

        assert!(matches!(service.subscribe(&who).await, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_portal_requires_subscription() {
        let (service, profiles, payments) = service();
        let who = principal();

        assert!(matches!(service.portal(&who).await, Err(CoreError::Forbidden(_))));

        let mut profile = profiles.ensure_profile(who.user_id, None).await.unwrap();
        profile.customer_id = Some("cus_1".to_string());
        profile.subscription_status = SubscriptionStatus::PastDue;
        profiles.save_profile(&profile).await.unwrap();

        let session = service.portal(&who).await.unwrap();
        assert!(!session.url.is_empty());
        assert_eq!(payments.portal_customers(), vec!["cus_1".to_string()]);
    }
}
