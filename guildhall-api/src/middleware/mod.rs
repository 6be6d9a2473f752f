pub mod auth;
pub mod rate_limit;

pub use auth::{decode_session, encode_session, session_middleware, CurrentUser, SessionClaims, SESSION_COOKIE};
pub use rate_limit::rate_limit_middleware;
