pub mod billing;
pub mod checkout;
pub mod fulfillment;
pub mod metadata;
pub mod payments;

pub use billing::{BillingService, BillingUrls, SubscribeRedirect};
pub use checkout::{CartLine, CheckoutQuote, CheckoutRedirect, CheckoutRequest, CheckoutService, ReturnUrls};
pub use fulfillment::FulfillmentEventProcessor;
pub use payments::PaymentEventProcessor;

/// What a webhook delivery amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// State changed
    Processed,
    /// Seen before, nothing to do
    Duplicate,
    /// Acknowledged without acting on it
    Ignored,
}

/// The stored status moved between read and write. Surfaced as a conflict so
/// the provider redelivers against the fresh row.
pub(crate) fn concurrent_change(order: &guildhall_shared::Order) -> guildhall_core::CoreError {
    guildhall_core::CoreError::Conflict(format!("order {} changed while the event was applied", order.id))
}
