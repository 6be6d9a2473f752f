use axum::{extract::State, routing::post, Json, Router};
use axum_extra::extract::WithRejection;
use guildhall_catalog::StockReport;
use guildhall_core::policy::Requirement;
use guildhall_order::{CheckoutRedirect, CheckoutRequest};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

/// POST /api/checkout
/// Price the cart server-side and open a hosted payment session
pub async fn create_checkout(
    State(state): State<AppState>,
    user: CurrentUser,
    WithRejection(Json(request), _): WithRejection<Json<CheckoutRequest>, AppError>,
) -> Result<Json<CheckoutRedirect>, AppError> {
    let principal = user.require(Requirement::Authenticated)?;
    let redirect = state.checkout.start_checkout(principal, &request).await?;
    Ok(Json(redirect))
}

/// POST /api/stock/refresh
pub async fn refresh_stock(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<StockReport>, AppError> {
    let principal = user.require(Requirement::Authenticated)?;
    tracing::debug!(user_id = %principal.user_id, "Stock refresh requested");
    Ok(Json(state.catalog_sync.refresh_stock().await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/checkout", post(create_checkout))
        .route("/api/stock/refresh", post(refresh_stock))
}
