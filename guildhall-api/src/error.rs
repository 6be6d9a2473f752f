use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use guildhall_core::repository::RepoError;
use guildhall_core::CoreError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    Forbidden(String),
    Validation(String),
    NotFound(String),
    OutOfStock(String),
    Conflict(String),
    Upstream(String),
    InvalidSignature(String),
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::OutOfStock(_) => (StatusCode::CONFLICT, "out_of_stock"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            AppError::InvalidSignature(_) => (StatusCode::BAD_REQUEST, "invalid_signature"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match self {
            AppError::Unauthorized => "Authentication required".to_string(),
            AppError::Forbidden(msg)
            | AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::OutOfStock(msg)
            | AppError::Conflict(msg) => msg,
            AppError::InvalidSignature(msg) => {
                tracing::warn!("Rejected webhook signature: {}", msg);
                "Invalid signature".to_string()
            }
            AppError::Upstream(msg) => {
                tracing::error!("Upstream provider error: {}", msg);
                "Upstream service unavailable".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unauthorized => AppError::Unauthorized,
            CoreError::Forbidden(msg) => AppError::Forbidden(msg),
            CoreError::ValidationError(msg) => AppError::Validation(msg),
            CoreError::NotFoundError(msg) => AppError::NotFound(msg),
            CoreError::OutOfStockError(msg) => AppError::OutOfStock(msg),
            CoreError::Conflict(msg) => AppError::Conflict(msg),
            CoreError::UpstreamError(msg) => AppError::Upstream(msg),
            CoreError::InvalidSignature(msg) => AppError::InvalidSignature(msg),
            CoreError::InternalError(msg) => AppError::Internal(msg),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        AppError::Internal(err.to_string())
    }
}

// Extractor rejections become validation errors so malformed requests get
// the same JSON body as every other failure.

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_statuses() {
        let cases = vec![
            (CoreError::Unauthorized, StatusCode::UNAUTHORIZED),
            (CoreError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (CoreError::ValidationError("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::NotFoundError("x".into()), StatusCode::NOT_FOUND),
            (CoreError::OutOfStockError("x".into()), StatusCode::CONFLICT),
            (CoreError::Conflict("x".into()), StatusCode::CONFLICT),
            (CoreError::UpstreamError("x".into()), StatusCode::BAD_GATEWAY),
            (CoreError::InvalidSignature("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::InternalError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }
}
