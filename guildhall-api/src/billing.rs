use axum::{extract::State, routing::post, Json, Router};
use guildhall_core::payment::PortalSession;
use guildhall_core::policy::Requirement;
use guildhall_order::SubscribeRedirect;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

/// POST /api/billing/subscribe
/// Start a membership checkout in subscription mode
pub async fn subscribe(State(state): State<AppState>, user: CurrentUser) -> Result<Json<SubscribeRedirect>, AppError> {
    let principal = user.require(Requirement::Authenticated)?;
    Ok(Json(state.billing.subscribe(principal).await?))
}

/// POST /api/billing/portal
/// Subscription gating happens inside the billing service, which knows the
/// caller's current status.
pub async fn portal(State(state): State<AppState>, user: CurrentUser) -> Result<Json<PortalSession>, AppError> {
    let principal = user.require(Requirement::Authenticated)?;
    Ok(Json(state.billing.portal(principal).await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/billing/subscribe", post(subscribe))
        .route("/api/billing/portal", post(portal))
}
