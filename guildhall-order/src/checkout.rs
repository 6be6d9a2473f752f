use guildhall_catalog::{check_availability, MarkupSettings, PricingEngine};
use guildhall_core::payment::{CheckoutLine, CheckoutMode, CheckoutSessionRequest, PaymentProvider};
use guildhall_core::policy::Principal;
use guildhall_core::repository::ProductRepository;
use guildhall_core::{CoreError, CoreResult};
use guildhall_shared::{ItemSnapshot, Masked, ShippingAddress};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::metadata;

pub const MAX_LINE_QUANTITY: i32 = 20;
pub const MAX_CART_LINES: usize = 25;

/// One cart line as submitted by the browser. Any price the client sends is
/// dropped during deserialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartLine {
    pub variant_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CartLine>,
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckoutRedirect {
    pub session_id: String,
    pub url: String,
    pub total_cents: i64,
    pub currency: String,
}

/// Server-priced cart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutQuote {
    pub lines: Vec<ItemSnapshot>,
    pub total_cents: i64,
}

/// Where the hosted checkout page sends the customer afterwards
#[derive(Debug, Clone)]
pub struct ReturnUrls {
    pub success_url: String,
    pub cancel_url: String,
}

/// Validate quantities and fold repeated variants into one line, keeping the
/// order of first appearance.
pub fn merge_lines(items: &[CartLine]) -> CoreResult<Vec<CartLine>> {
    if items.is_empty() {
        return Err(CoreError::ValidationError("cart is empty".to_string()));
    }

    let mut merged: Vec<CartLine> = Vec::new();
    for item in items {
        if !(1..=MAX_LINE_QUANTITY).contains(&item.quantity) {
            return Err(CoreError::ValidationError(format!(
                "quantity for {} must be between 1 and {}",
                item.variant_id, MAX_LINE_QUANTITY
            )));
        }
        match merged.iter_mut().find(|line| line.variant_id == item.variant_id) {
            Some(line) => line.quantity += item.quantity,
            None => merged.push(*item),
        }
    }

    if let Some(line) = merged.iter().find(|line| line.quantity > MAX_LINE_QUANTITY) {
        return Err(CoreError::ValidationError(format!(
            "quantity for {} must be between 1 and {}",
            line.variant_id, MAX_LINE_QUANTITY
        )));
    }
    if merged.len() > MAX_CART_LINES {
        return Err(CoreError::ValidationError(format!(
            "cart may hold at most {} different items",
            MAX_CART_LINES
        )));
    }

    Ok(merged)
}

fn required_field(value: &str, field: &str, max_len: usize) -> CoreResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::ValidationError(format!("shipping address {} is required", field)));
    }
    if value.chars().count() > max_len {
        return Err(CoreError::ValidationError(format!(
            "shipping address {} is longer than {} characters",
            field, max_len
        )));
    }
    Ok(value.to_string())
}

fn optional_field(value: Option<&str>, field: &str, max_len: usize) -> CoreResult<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => required_field(v, field, max_len).map(Some),
        None => Ok(None),
    }
}

/// Trim and bound every field; country must be a two-letter code.
pub fn validate_address(address: &ShippingAddress) -> CoreResult<ShippingAddress> {
    let country = required_field(&address.country, "country", 2)?.to_ascii_uppercase();
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CoreError::ValidationError(
            "shipping address country must be a two-letter code".to_string(),
        ));
    }

    Ok(ShippingAddress {
        name: required_field(&address.name, "name", 100)?,
        line1: required_field(&address.line1, "line1", 200)?,
        line2: optional_field(address.line2.as_deref(), "line2", 200)?,
        city: required_field(&address.city, "city", 100)?,
        region: optional_field(address.region.as_deref(), "region", 100)?,
        postal_code: required_field(&address.postal_code, "postal_code", 20)?,
        country,
    })
}

/// Turns a cart into a hosted payment session. No order exists until the
/// payment provider reports the session complete.
pub struct CheckoutService {
    catalog: Arc<dyn ProductRepository>,
    payments: Arc<dyn PaymentProvider>,
    markup: MarkupSettings,
    urls: ReturnUrls,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        catalog: Arc<dyn ProductRepository>,
        payments: Arc<dyn PaymentProvider>,
        markup: MarkupSettings,
        urls: ReturnUrls,
        currency: String,
    ) -> Self {
        Self {
            catalog,
            payments,
            markup,
            urls,
            currency,
        }
    }

    /// Price the cart against the live catalog and current markup.
    pub async fn quote(&self, items: &[CartLine]) -> CoreResult<CheckoutQuote> {
        let merged = merge_lines(items)?;
        let engine: PricingEngine = self.markup.engine().await?;

        let mut lines = Vec::with_capacity(merged.len());
        let mut total_cents: i64 = 0;
        for item in &merged {
            let record = self.catalog.get_variant(item.variant_id).await?;
            let record = check_availability(item.variant_id, record.as_ref(), item.quantity)?;

            let unit_price_cents = engine.unit_price(&record.variant)?;
            total_cents += engine.line_total(unit_price_cents, item.quantity)?;
            lines.push(ItemSnapshot {
                product_id: record.variant.product_id,
                variant_id: record.variant.id,
                sku: record.variant.sku.clone(),
                name: record.product_name.clone(),
                quantity: item.quantity,
                unit_price_cents,
            });
        }

        Ok(CheckoutQuote { lines, total_cents })
    }

    pub async fn start_checkout(
        &self,
        principal: &Principal,
        request: &CheckoutRequest,
    ) -> CoreResult<CheckoutRedirect> {
        let address = validate_address(&request.shipping_address)?;
        let quote = self.quote(&request.items).await?;

        let session_request = CheckoutSessionRequest {
            mode: CheckoutMode::Payment,
            currency: self.currency.clone(),
            lines: quote
                .lines
                .iter()
                .map(|line| CheckoutLine {
                    name: line.name.clone(),
                    unit_amount_cents: line.unit_price_cents,
                    quantity: line.quantity,
                })
                .collect(),
            price_id: None,
            customer_id: None,
            customer_email: principal.email.clone(),
            client_reference_id: Some(principal.user_id.to_string()),
            success_url: self.urls.success_url.clone(),
            cancel_url: self.urls.cancel_url.clone(),
            metadata: metadata::encode(principal.user_id, &address, &quote.lines),
        };

        let session = self.payments.create_checkout_session(&session_request).await?;

        info!(
            user_id = %principal.user_id,
            session_id = %session.id,
            total_cents = quote.total_cents,
            recipient = %Masked(&address.name),
            "Checkout session created"
        );

        Ok(CheckoutRedirect {
            session_id: session.id,
            url: session.url,
            total_cents: quote.total_cents,
            currency: self.currency.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildhall_catalog::Markup;
    use guildhall_shared::{Product, ProductVariant, Role};
    use guildhall_store::memory::{InMemoryProductRepository, InMemorySettingsRepository};
    use guildhall_store::mock::MockPaymentProvider;
    use rust_decimal::Decimal;

    struct Fixture {
        service: CheckoutService,
        payments: Arc<MockPaymentProvider>,
        tee: ProductVariant,
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "  Ada Lovelace ".to_string(),
            line1: "12 Analytical Row".to_string(),
            line2: Some("   ".to_string()),
            city: "London".to_string(),
            region: None,
            postal_code: "N1 9GU".to_string(),
            country: "gb".to_string(),
        }
    }

    fn principal() -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: Some("ada@example.com".to_string()),
            role: Role::Member,
        }
    }

    async fn fixture(stock: i32) -> Fixture {
        let catalog = Arc::new(InMemoryProductRepository::default());
        let product_id = Uuid::new_v4();
        let tee = ProductVariant {
            id: Uuid::new_v4(),
            product_id,
            sku: "TEE-BLK-M".to_string(),
            size: Some("M".to_string()),
            color: Some("black".to_string()),
            base_price_cents: 1998,
            stock,
            is_active: true,
        };
        catalog
            .upsert_product(&Product {
                id: product_id,
                external_id: "art_tee".to_string(),
                name: "Guild Tee".to_string(),
                description: None,
                is_active: true,
                variants: vec![tee.clone()],
                images: vec![],
                updated_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let payments = Arc::new(MockPaymentProvider::default());
        let markup = MarkupSettings::new(
            Arc::new(InMemorySettingsRepository::default()),
            Markup::new(Decimal::from(30)).unwrap(),
        );
        let service = CheckoutService::new(
            catalog,
            payments.clone(),
            markup,
            ReturnUrls {
                success_url: "https://guild.example/orders/success".to_string(),
                cancel_url: "https://guild.example/cart".to_string(),
            },
            "usd".to_string(),
        );

        Fixture { service, payments, tee }
    }

    #[test]
    fn test_merge_lines() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_lines(&[
            CartLine { variant_id: a, quantity: 1 },
            CartLine { variant_id: b, quantity: 3 },
            CartLine { variant_id: a, quantity: 2 },
        ])
        .unwrap();
        assert_eq!(
            merged,
            vec![CartLine { variant_id: a, quantity: 3 }, CartLine { variant_id: b, quantity: 3 }]
        );
    }

    #[test]
    fn test_merge_rejects_bad_quantities() {
        let a = Uuid::new_v4();
        assert!(merge_lines(&[]).is_err());
        assert!(merge_lines(&[CartLine { variant_id: a, quantity: 0 }]).is_err());
        assert!(merge_lines(&[CartLine { variant_id: a, quantity: 21 }]).is_err());
        assert!(merge_lines(&[
            CartLine { variant_id: a, quantity: 15 },
            CartLine { variant_id: a, quantity: 15 },
        ])
        .is_err());
    }

    #[test]
    fn test_validate_address_normalizes() {
        let address = validate_address(&address()).unwrap();
        assert_eq!(address.name, "Ada Lovelace");
        assert_eq!(address.line2, None);
        assert_eq!(address.country, "GB");

        let mut bad = address.clone();
        bad.city = " ".to_string();
        assert!(matches!(validate_address(&bad), Err(CoreError::ValidationError(_))));

        let mut bad = address.clone();
        bad.country = "GBR".to_string();
        assert!(validate_address(&bad).is_err());
    }

    #[tokio::test]
    async fn test_checkout_prices_server_side() {
        let f = fixture(10).await;
        let request = CheckoutRequest {
            items: vec![CartLine { variant_id: f.tee.id, quantity: 2 }],
            shipping_address: address(),
        };

        let redirect = f.service.start_checkout(&principal(), &request).await.unwrap();
        assert_eq!(redirect.total_cents, 5194);

        let sessions = f.payments.checkout_requests();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].mode, CheckoutMode::Payment);
        assert_eq!(sessions[0].lines[0].unit_amount_cents, 2597);
        assert_eq!(sessions[0].lines[0].quantity, 2);

        let decoded = metadata::decode(&sessions[0].metadata).unwrap();
        assert_eq!(decoded.lines[0].sku, "TEE-BLK-M");
        assert_eq!(decoded.shipping_address.country, "GB");
    }

    #[tokio::test]
    async fn test_client_price_is_ignored() {
        let f = fixture(10).await;
        let body = serde_json::json!({
            "items": [ { "variant_id": f.tee.id, "quantity": 1, "unit_price_cents": 1 } ],
            "shipping_address": address(),
        });
        let request: CheckoutRequest = serde_json::from_value(body).unwrap();
        let redirect = f.service.start_checkout(&principal(), &request).await.unwrap();
        assert_eq!(redirect.total_cents, 2597);
    }

    #[tokio::test]
    async fn test_out_of_stock_creates_no_session() {
        let f = fixture(1).await;
        let request = CheckoutRequest {
            items: vec![CartLine { variant_id: f.tee.id, quantity: 2 }],
            shipping_address: address(),
        };

        let err = f.service.start_checkout(&principal(), &request).await.unwrap_err();
        assert!(matches!(err, CoreError::OutOfStockError(_)));
        assert!(f.payments.checkout_requests().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_variant() {
        let f = fixture(1).await;
        let request = CheckoutRequest {
            items: vec![CartLine { variant_id: Uuid::new_v4(), quantity: 1 }],
            shipping_address: address(),
        };
        let err = f.service.start_checkout(&principal(), &request).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFoundError(_)));
    }

    #[tokio::test]
    async fn test_provider_failure_is_upstream() {
        let f = fixture(5).await;
        f.payments.set_failing(true);
        let request = CheckoutRequest {
            items: vec![CartLine { variant_id: f.tee.id, quantity: 1 }],
            shipping_address: address(),
        };
        let err = f.service.start_checkout(&principal(), &request).await.unwrap_err();
        assert!(matches!(err, CoreError::UpstreamError(_)));
    }
}
