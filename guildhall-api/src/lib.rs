use axum::{http::Method, middleware::from_fn_with_state, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod billing;
pub mod checkout;
pub mod error;
pub mod middleware;
pub mod orders;
pub mod products;
pub mod profile;
pub mod state;
pub mod webhooks;

pub use error::AppError;
pub use state::{AppState, Repositories};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    // Signed webhooks stay outside the per-IP limit
    let limited = Router::new()
        .merge(checkout::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(products::routes())
        .merge(orders::routes())
        .merge(profile::routes())
        .merge(billing::routes())
        .merge(admin::routes())
        .merge(webhooks::routes())
        .merge(limited)
        .layer(from_fn_with_state(state.clone(), middleware::session_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
