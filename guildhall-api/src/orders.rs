use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use guildhall_core::policy::Requirement;
use guildhall_shared::{Order, OrderStatusChangedEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: Order,
    pub history: Vec<OrderStatusChangedEvent>,
}

/// GET /api/orders
/// Caller's own orders; admins may ask for every order with `?all=true`
pub async fn list_orders(
    State(state): State<AppState>,
    user: CurrentUser,
    WithRejection(Query(query), _): WithRejection<Query<ListOrdersQuery>, AppError>,
) -> Result<Json<Vec<Order>>, AppError> {
    let owner = if query.all {
        user.require(Requirement::Admin)?;
        None
    } else {
        Some(user.require(Requirement::Authenticated)?.user_id)
    };

    let orders = state.orders.list_orders(owner).await?;
    Ok(Json(orders))
}

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    user: CurrentUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Json<OrderDetailResponse>, AppError> {
    user.require(Requirement::Authenticated)?;

    let order = state
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {}", id)))?;

    user.require(Requirement::OwnerOrAdmin(order.user_id))?;

    let history = state.orders.list_order_changes(id).await?;

    Ok(Json(OrderDetailResponse { order, history }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/orders", get(list_orders))
        .route("/api/orders/{id}", get(get_order))
}
