use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use guildhall_core::policy::{authorize, Principal, Requirement};
use guildhall_shared::Role;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
    pub exp: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("session subject is not a user id")]
    Subject,
    #[error("unknown role {0}")]
    Role(String),
}

/// Validate an HS256 session token and turn its claims into a principal.
pub fn decode_session(token: &str, secret: &str) -> Result<Principal, SessionError> {
    let token_data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    let claims = token_data.claims;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| SessionError::Subject)?;
    let role = Role::parse(&claims.role).ok_or(SessionError::Role(claims.role.clone()))?;

    Ok(Principal {
        user_id,
        email: claims.email,
        role,
    })
}

/// Sign a session token for `principal`, valid for `ttl_secs`.
pub fn encode_session(principal: &Principal, secret: &str, ttl_secs: i64) -> Result<String, SessionError> {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let claims = SessionClaims {
        sub: principal.user_id.to_string(),
        email: principal.email.clone(),
        role: principal.role.as_str().to_string(),
        exp: usize::try_from(exp).unwrap_or(0),
    };
    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Session cookie first, then `Authorization: Bearer`.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

// ============================================================================
// Session Middleware
// ============================================================================

/// Attach the caller's [`Principal`] to the request when a valid session is
/// presented. Anonymous requests pass through; handlers decide via the policy.
pub async fn session_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(token) = session_token(req.headers()) {
        match decode_session(&token, &state.auth.secret) {
            Ok(principal) => {
                req.extensions_mut().insert(principal);
            }
            Err(e) => tracing::debug!("Ignoring session token: {}", e),
        }
    }

    next.run(req).await
}

/// The signed-in caller, if any
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<Principal>);

impl CurrentUser {
    pub fn require(&self, requirement: Requirement) -> Result<&Principal, AppError> {
        Ok(authorize(self.0.as_ref(), None, requirement)?)
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentUser(parts.extensions.get::<Principal>().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: Some("ada@example.com".to_string()),
            role,
        }
    }

    #[test]
    fn test_session_round_trip() {
        let p = principal(Role::Admin);
        let token = encode_session(&p, "secret", 3600).unwrap();
        assert_eq!(decode_session(&token, "secret").unwrap(), p);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = encode_session(&principal(Role::Member), "secret", 3600).unwrap();
        assert!(matches!(decode_session(&token, "other"), Err(SessionError::Token(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = encode_session(&principal(Role::Member), "secret", -3600).unwrap();
        assert!(decode_session(&token, "secret").is_err());
    }

    #[test]
    fn test_cookie_preferred_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; session=from-cookie".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(session_token(&headers).as_deref(), Some("from-cookie"));

        headers.remove(header::COOKIE);
        assert_eq!(session_token(&headers).as_deref(), Some("from-header"));
    }
}
