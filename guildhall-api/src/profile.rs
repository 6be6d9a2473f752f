use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use guildhall_core::policy::Requirement;
use guildhall_shared::{Role, SubscriptionStatus};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    /// Returned to its owner unmasked
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
    pub subscription_status: SubscriptionStatus,
    pub subscription_plan: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    /// Whether the billing portal is available
    pub has_billing_account: bool,
}

/// GET /api/profile
pub async fn get_profile(State(state): State<AppState>, user: CurrentUser) -> Result<Json<ProfileResponse>, AppError> {
    let principal = user.require(Requirement::Authenticated)?;
    let profile = state
        .profiles
        .ensure_profile(principal.user_id, principal.email.as_deref())
        .await?;

    Ok(Json(ProfileResponse {
        id: profile.id,
        email: profile.email,
        display_name: profile.display_name,
        role: principal.role,
        subscription_status: profile.subscription_status,
        subscription_plan: profile.subscription_plan,
        current_period_end: profile.current_period_end,
        has_billing_account: profile.customer_id.is_some(),
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/profile", get(get_profile))
}
