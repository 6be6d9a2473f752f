use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;

use crate::state::AppState;

const WINDOW_SECONDS: i64 = 60;

/// Fixed-window limit per client IP. Skipped when Redis is not configured or
/// the peer address is unknown; Redis failures let the request through.
pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(limit) = state.rate_limit.as_ref() else {
        return next.run(req).await;
    };
    let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>().copied() else {
        return next.run(req).await;
    };

    let key = format!("ratelimit:{}", addr.ip());
    match limit.redis.check_rate_limit(&key, limit.per_minute, WINDOW_SECONDS).await {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::warn!(ip = %addr.ip(), "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "Rate limit exceeded", "code": "rate_limited" })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, failing open: {}", e);
            next.run(req).await
        }
    }
}
