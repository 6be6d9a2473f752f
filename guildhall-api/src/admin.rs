use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use guildhall_catalog::SyncReport;
use guildhall_core::policy::Requirement;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsBody {
    pub markup_percentage: Decimal,
}

/// GET /api/admin/settings
pub async fn get_settings(State(state): State<AppState>, user: CurrentUser) -> Result<Json<SettingsBody>, AppError> {
    user.require(Requirement::Admin)?;
    let markup = state.markup.current().await?;
    Ok(Json(SettingsBody {
        markup_percentage: markup.percent(),
    }))
}

/// PUT /api/admin/settings
pub async fn update_settings(
    State(state): State<AppState>,
    user: CurrentUser,
    WithRejection(Json(body), _): WithRejection<Json<SettingsBody>, AppError>,
) -> Result<Json<SettingsBody>, AppError> {
    let principal = user.require(Requirement::Admin)?;
    let markup = state.markup.update(body.markup_percentage).await?;
    tracing::info!(admin = %principal.user_id, markup = %markup.percent(), "Settings updated");
    Ok(Json(SettingsBody {
        markup_percentage: markup.percent(),
    }))
}

/// POST /api/admin/sync
/// Full catalog refresh from the fulfillment provider
pub async fn run_sync(State(state): State<AppState>, user: CurrentUser) -> Result<Json<SyncReport>, AppError> {
    let principal = user.require(Requirement::Admin)?;
    tracing::info!(admin = %principal.user_id, "Catalog sync triggered");
    Ok(Json(state.catalog_sync.run().await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/settings", get(get_settings).put(update_settings))
        .route("/api/admin/sync", post(run_sync))
}
