use guildhall_core::repository::SettingsRepository;
use guildhall_core::{CoreError, CoreResult};
use guildhall_shared::ProductVariant;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Settings key holding the store-wide markup percentage
pub const MARKUP_SETTING_KEY: &str = "markup_percentage";

/// Upper bound accepted for the markup, in percent
pub const MAX_MARKUP_PERCENT: i64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("Markup must be between 0 and 500 percent, got {0}")]
    MarkupOutOfRange(Decimal),

    #[error("Price {0} cannot be represented in cents")]
    Unrepresentable(Decimal),
}

impl From<PricingError> for CoreError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::MarkupOutOfRange(_) => CoreError::ValidationError(err.to_string()),
            PricingError::Unrepresentable(_) => CoreError::InternalError(err.to_string()),
        }
    }
}

/// Percentage added on top of the provider's base price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markup(Decimal);

impl Markup {
    pub fn new(percent: Decimal) -> Result<Self, PricingError> {
        if percent.is_sign_negative() || percent > Decimal::from(MAX_MARKUP_PERCENT) {
            return Err(PricingError::MarkupOutOfRange(percent));
        }
        Ok(Self(percent.normalize()))
    }

    pub fn percent(&self) -> Decimal {
        self.0
    }

    /// base × (1 + markup/100), rounded half away from zero to the cent
    pub fn apply(&self, base_cents: i64) -> Result<i64, PricingError> {
        let factor = Decimal::ONE + self.0 / Decimal::ONE_HUNDRED;
        let retail = (Decimal::from(base_cents) * factor)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        retail.to_i64().ok_or(PricingError::Unrepresentable(retail))
    }
}

/// Convert a major-unit amount such as `19.98` into cents.
pub fn cents_from_major(amount: Decimal) -> Result<i64, PricingError> {
    let cents = (amount * Decimal::ONE_HUNDRED).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    cents.to_i64().ok_or(PricingError::Unrepresentable(amount))
}

/// Server-side price authority. Client-submitted prices never reach it.
#[derive(Debug, Clone, Copy)]
pub struct PricingEngine {
    markup: Markup,
}

impl PricingEngine {
    pub fn new(markup: Markup) -> Self {
        Self { markup }
    }

    pub fn markup(&self) -> Markup {
        self.markup
    }

    pub fn unit_price(&self, variant: &ProductVariant) -> CoreResult<i64> {
        Ok(self.markup.apply(variant.base_price_cents)?)
    }

    pub fn line_total(&self, unit_price_cents: i64, quantity: i32) -> CoreResult<i64> {
        unit_price_cents
            .checked_mul(i64::from(quantity))
            .ok_or_else(|| CoreError::ValidationError("line total overflows".to_string()))
    }
}

/// Markup lookup backed by the settings table, falling back to the configured
/// default when no row exists.
pub struct MarkupSettings {
    settings: Arc<dyn SettingsRepository>,
    default: Markup,
}

impl MarkupSettings {
    pub fn new(settings: Arc<dyn SettingsRepository>, default: Markup) -> Self {
        Self { settings, default }
    }

    pub async fn current(&self) -> CoreResult<Markup> {
        let stored = self.settings.get_setting(MARKUP_SETTING_KEY).await?;

        let Some(value) = stored.as_ref().and_then(|v| v.get("value")) else {
            return Ok(self.default);
        };

        let percent = match value {
            serde_json::Value::String(s) => Decimal::from_str(s).ok(),
            serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            _ => None,
        };

        match percent.map(Markup::new) {
            Some(Ok(markup)) => Ok(markup),
            _ => {
                tracing::warn!(?stored, "Ignoring unreadable markup setting, using default");
                Ok(self.default)
            }
        }
    }

    pub async fn update(&self, percent: Decimal) -> CoreResult<Markup> {
        let markup = Markup::new(percent)?;
        self.settings
            .put_setting(MARKUP_SETTING_KEY, serde_json::json!({ "value": markup.percent().to_string() }))
            .await?;
        tracing::info!(markup = %markup.percent(), "Markup percentage updated");
        Ok(markup)
    }

    pub async fn engine(&self) -> CoreResult<PricingEngine> {
        Ok(PricingEngine::new(self.current().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildhall_store::memory::InMemorySettingsRepository;

    fn pct(value: i64) -> Markup {
        Markup::new(Decimal::from(value)).unwrap()
    }

    #[test]
    fn test_markup_rounds_half_away_from_zero() {
        // $19.98 with 30% markup is $25.974
        assert_eq!(pct(30).apply(1998).unwrap(), 2597);
        // $10.05 with 50% markup is $15.075
        assert_eq!(pct(50).apply(1005).unwrap(), 1508);
        assert_eq!(pct(0).apply(1998).unwrap(), 1998);
    }

    #[test]
    fn test_line_total_example() {
        let engine = PricingEngine::new(pct(30));
        let unit = engine.markup().apply(1998).unwrap();
        assert_eq!(engine.line_total(unit, 2).unwrap(), 5194);
    }

    #[test]
    fn test_markup_bounds() {
        assert!(Markup::new(Decimal::from(-1)).is_err());
        assert!(Markup::new(Decimal::from(501)).is_err());
        assert!(Markup::new(Decimal::new(125, 1)).is_ok());
    }

    #[test]
    fn test_cents_from_major() {
        assert_eq!(cents_from_major(Decimal::new(1998, 2)).unwrap(), 1998);
        assert_eq!(cents_from_major(Decimal::new(19985, 3)).unwrap(), 1999);
        assert_eq!(cents_from_major(Decimal::from(7)).unwrap(), 700);
    }

    #[tokio::test]
    async fn test_settings_fall_back_to_default() {
        let repo = Arc::new(InMemorySettingsRepository::default());
        let settings = MarkupSettings::new(repo.clone(), pct(30));
        assert_eq!(settings.current().await.unwrap(), pct(30));

        settings.update(Decimal::from(45)).await.unwrap();
        assert_eq!(settings.current().await.unwrap(), pct(45));

        repo.put_setting(MARKUP_SETTING_KEY, serde_json::json!({ "value": 12 }))
            .await
            .unwrap();
        assert_eq!(settings.current().await.unwrap(), pct(12));

        repo.put_setting(MARKUP_SETTING_KEY, serde_json::json!({ "value": "lots" }))
            .await
            .unwrap();
        assert_eq!(settings.current().await.unwrap(), pct(30));
    }

    #[tokio::test]
    async fn test_update_rejects_out_of_range() {
        let settings = MarkupSettings::new(Arc::new(InMemorySettingsRepository::default()), pct(30));
        let err = settings.update(Decimal::from(900)).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }
}
