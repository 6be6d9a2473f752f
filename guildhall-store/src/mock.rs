//! Recording stand-ins for the payment and fulfillment providers, used by
//! tests and the offline dev mode.

use async_trait::async_trait;
use guildhall_core::fulfillment::{FulfillmentOrderRequest, FulfillmentProvider, RemoteArticle, RemoteStock};
use guildhall_core::payment::{CheckoutSession, CheckoutSessionRequest, PaymentProvider, PortalSession};
use guildhall_core::ProviderError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unavailable() -> ProviderError {
    ProviderError::Api {
        status: 503,
        message: "provider unavailable".to_string(),
    }
}

#[derive(Default)]
pub struct MockPaymentProvider {
    failing: AtomicBool,
    checkout_requests: Mutex<Vec<CheckoutSessionRequest>>,
    portal_customers: Mutex<Vec<String>>,
}

impl MockPaymentProvider {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn checkout_requests(&self) -> Vec<CheckoutSessionRequest> {
        lock(&self.checkout_requests).clone()
    }

    pub fn portal_customers(&self) -> Vec<String> {
        lock(&self.portal_customers).clone()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        lock(&self.checkout_requests).push(request.clone());
        let id = format!("cs_mock_{}", Uuid::new_v4().simple());
        Ok(CheckoutSession {
            url: format!("https://checkout.mock/pay/{}", id),
            id,
        })
    }

    async fn create_portal_session(&self, customer_id: &str, _return_url: &str) -> Result<PortalSession, ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        lock(&self.portal_customers).push(customer_id.to_string());
        Ok(PortalSession {
            url: format!("https://billing.mock/session/{}", customer_id),
        })
    }
}

#[derive(Default)]
pub struct MockFulfillmentProvider {
    failing: AtomicBool,
    articles: Mutex<Vec<RemoteArticle>>,
    stock: Mutex<Vec<RemoteStock>>,
    submitted: Mutex<Vec<FulfillmentOrderRequest>>,
}

impl MockFulfillmentProvider {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_articles(&self, articles: Vec<RemoteArticle>) {
        *lock(&self.articles) = articles;
    }

    pub fn set_stock(&self, stock: Vec<RemoteStock>) {
        *lock(&self.stock) = stock;
    }

    pub fn submitted_orders(&self) -> Vec<FulfillmentOrderRequest> {
        lock(&self.submitted).clone()
    }
}

#[async_trait]
impl FulfillmentProvider for MockFulfillmentProvider {
    async fn list_articles(&self) -> Result<Vec<RemoteArticle>, ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(lock(&self.articles).clone())
    }

    async fn list_stock(&self) -> Result<Vec<RemoteStock>, ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(lock(&self.stock).clone())
    }

    async fn create_order(&self, request: &FulfillmentOrderRequest) -> Result<String, ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut submitted = lock(&self.submitted);
        submitted.push(request.clone());
        Ok(format!("pod_{}", submitted.len()))
    }
}
