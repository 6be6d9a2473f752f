pub mod fulfillment;
pub mod payment;
pub mod policy;
pub mod repository;
pub mod signature;

/// Error taxonomy shared by every service. The API layer maps each variant
/// onto an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFoundError(String),
    #[error("Out of stock: {0}")]
    OutOfStockError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Upstream service error: {0}")]
    UpstreamError(String),
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Failure talking to the payment or fulfillment provider
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("provider answered {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl From<repository::RepoError> for CoreError {
    fn from(err: repository::RepoError) -> Self {
        CoreError::InternalError(err.to_string())
    }
}

impl From<ProviderError> for CoreError {
    fn from(err: ProviderError) -> Self {
        CoreError::UpstreamError(err.to_string())
    }
}

impl From<signature::SignatureError> for CoreError {
    fn from(err: signature::SignatureError) -> Self {
        CoreError::InvalidSignature(err.to_string())
    }
}
