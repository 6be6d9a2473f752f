use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use guildhall_core::fulfillment::FulfillmentEvent;
use guildhall_core::payment::PaymentEvent;
use guildhall_core::signature::{tokens_match, verify_body_signature, verify_payment_signature, DEFAULT_TOLERANCE_SECS};
use guildhall_core::CoreError;
use guildhall_order::EventOutcome;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

pub const PAYMENT_SIGNATURE_HEADER: &str = "stripe-signature";
pub const FULFILLMENT_SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: EventOutcome,
}

fn ack(outcome: EventOutcome) -> Json<WebhookAck> {
    Json(WebhookAck {
        received: true,
        outcome,
    })
}

/// Anything the provider can fix by retrying is answered with 500.
fn processing_failure(err: CoreError) -> AppError {
    match err {
        CoreError::ValidationError(msg) => AppError::Validation(msg),
        CoreError::InvalidSignature(msg) => AppError::InvalidSignature(msg),
        CoreError::Conflict(msg) => AppError::Conflict(msg),
        other => AppError::Internal(other.to_string()),
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// POST /api/webhooks/payments
/// Signed Stripe events; the raw body is verified before it is parsed
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = header(&headers, PAYMENT_SIGNATURE_HEADER)
        .ok_or_else(|| AppError::InvalidSignature("missing Stripe-Signature header".to_string()))?;

    verify_payment_signature(
        &body,
        signature,
        &state.webhooks.payments_secret,
        chrono::Utc::now().timestamp(),
        DEFAULT_TOLERANCE_SECS,
    )
    .map_err(|e| AppError::InvalidSignature(e.to_string()))?;

    let event: PaymentEvent =
        serde_json::from_slice(&body).map_err(|e| AppError::Validation(format!("malformed event: {}", e)))?;

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Received payment webhook");

    let outcome = state
        .payment_events
        .process(&event)
        .await
        .map_err(processing_failure)?;

    Ok(ack(outcome))
}

/// POST /api/webhooks/fulfillment/{token}
pub async fn fulfillment_webhook(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    if !tokens_match(&token, &state.webhooks.fulfillment_token) {
        return Err(AppError::NotFound("no such webhook".to_string()));
    }

    if let Some(secret) = state.webhooks.fulfillment_secret.as_deref() {
        let signature = header(&headers, FULFILLMENT_SIGNATURE_HEADER)
            .ok_or_else(|| AppError::InvalidSignature("missing X-Webhook-Signature header".to_string()))?;
        verify_body_signature(&body, signature, secret).map_err(|e| AppError::InvalidSignature(e.to_string()))?;
    }

    let event: FulfillmentEvent =
        serde_json::from_slice(&body).map_err(|e| AppError::Validation(format!("malformed event: {}", e)))?;

    tracing::info!(
        event_type = %event.event_type,
        reference = event.data.reference.as_deref().unwrap_or("-"),
        "Received fulfillment webhook"
    );

    let outcome = state
        .fulfillment_events
        .process(&event)
        .await
        .map_err(processing_failure)?;

    Ok(ack(outcome))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/webhooks/payments", post(payment_webhook))
        .route("/api/webhooks/fulfillment/{token}", post(fulfillment_webhook))
}
