//! Stripe REST client (form-encoded requests, bearer secret key).

use async_trait::async_trait;
use guildhall_core::payment::{CheckoutMode, CheckoutSession, CheckoutSessionRequest, PaymentProvider, PortalSession};
use guildhall_core::ProviderError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error};

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Flatten a checkout request into Stripe's bracketed form fields.
pub fn checkout_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), request.mode.as_str().into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
    ];

    if let Some(reference) = &request.client_reference_id {
        form.push(("client_reference_id".into(), reference.clone()));
    }
    match (&request.customer_id, &request.customer_email) {
        (Some(customer), _) => form.push(("customer".into(), customer.clone())),
        (None, Some(email)) => form.push(("customer_email".into(), email.clone())),
        (None, None) => {}
    }

    match request.mode {
        CheckoutMode::Payment => {
            for (i, line) in request.lines.iter().enumerate() {
                let prefix = format!("line_items[{}]", i);
                form.push((format!("{}[price_data][currency]", prefix), request.currency.clone()));
                form.push((format!("{}[price_data][product_data][name]", prefix), line.name.clone()));
                form.push((
                    format!("{}[price_data][unit_amount]", prefix),
                    line.unit_amount_cents.to_string(),
                ));
                form.push((format!("{}[quantity]", prefix), line.quantity.to_string()));
            }
        }
        CheckoutMode::Subscription => {
            if let Some(price) = &request.price_id {
                form.push(("line_items[0][price]".into(), price.clone()));
                form.push(("line_items[0][quantity]".into(), "1".into()));
            }
            // Subscription events only see the subscription's own metadata.
            for (key, value) in &request.metadata {
                form.push((format!("subscription_data[metadata][{}]", key), value.clone()));
            }
        }
    }

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{}]", key), value.clone()));
    }

    form
}

impl StripeClient {
    pub fn new(client: Client, api_base: &str, secret_key: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    async fn post_form<T: DeserializeOwned>(&self, path: &str, form: &[(String, String)]) -> Result<T, ProviderError> {
        let response = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| status.to_string());
            error!(status = status.as_u16(), path, message = %message, "Stripe request failed");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, ProviderError> {
        let session: CheckoutSession = self.post_form("/v1/checkout/sessions", &checkout_form(request)).await?;
        debug!(session_id = %session.id, mode = request.mode.as_str(), "Stripe checkout session created");
        Ok(session)
    }

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<PortalSession, ProviderError> {
        let form = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), return_url.to_string()),
        ];
        self.post_form("/v1/billing_portal/sessions", &form).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildhall_core::payment::CheckoutLine;
    use std::collections::BTreeMap;

    fn request(mode: CheckoutMode) -> CheckoutSessionRequest {
        let mut metadata = BTreeMap::new();
        metadata.insert("user_id".to_string(), "u-1".to_string());
        CheckoutSessionRequest {
            mode,
            currency: "usd".to_string(),
            lines: vec![CheckoutLine {
                name: "Guild Tee".to_string(),
                unit_amount_cents: 2597,
                quantity: 2,
            }],
            price_id: Some("price_member".to_string()),
            customer_id: None,
            customer_email: Some("ada@example.com".to_string()),
            client_reference_id: Some("u-1".to_string()),
            success_url: "https://guild.example/ok".to_string(),
            cancel_url: "https://guild.example/cart".to_string(),
            metadata,
        }
    }

    fn field<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_payment_form() {
        let form = checkout_form(&request(CheckoutMode::Payment));
        assert_eq!(field(&form, "mode"), Some("payment"));
        assert_eq!(field(&form, "line_items[0][price_data][unit_amount]"), Some("2597"));
        assert_eq!(field(&form, "line_items[0][quantity]"), Some("2"));
        assert_eq!(field(&form, "customer_email"), Some("ada@example.com"));
        assert_eq!(field(&form, "metadata[user_id]"), Some("u-1"));
        assert_eq!(field(&form, "line_items[0][price]"), None);
    }

    #[test]
    fn test_subscription_form_prefers_customer() {
        let mut req = request(CheckoutMode::Subscription);
        req.customer_id = Some("cus_1".to_string());
        let form = checkout_form(&req);
        assert_eq!(field(&form, "line_items[0][price]"), Some("price_member"));
        assert_eq!(field(&form, "customer"), Some("cus_1"));
        assert_eq!(field(&form, "customer_email"), None);
        assert_eq!(field(&form, "subscription_data[metadata][user_id]"), Some("u-1"));
    }
}
