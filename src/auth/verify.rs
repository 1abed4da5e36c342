//! Bearer authentication for incoming requests.
//!
//! Every request outside the public paths must carry
//! `Authorization: Bearer <access token>`. The verified [`Claims`] are
//! stored in the request extensions and read back by [`Authenticated`].

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};

use super::tokens::{Claims, TokenIssuer, TokenKind};
use crate::error::AuthError;
use crate::SharedState;

/// Paths served without authentication.
pub const PUBLIC_PATHS: &[&str] = &["/", "/health", "/openapi.json", "/auth/refresh"];

pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || path.starts_with("/docs")
}

/// Pull the raw token out of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MissingToken)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::EmptyToken);
    }
    Ok(token)
}

/// Validate the bearer token in `headers` as an access credential.
pub fn authenticate(tokens: &TokenIssuer, headers: &HeaderMap) -> Result<Claims, AuthError> {
    let token = bearer_token(headers)?;
    Ok(tokens.validate(token, TokenKind::Access)?)
}

/// Middleware guarding every non-public route.
pub async fn require_bearer(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if is_public(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    info!("Authenticating request to: {}", req.uri().path());

    let claims = authenticate(&state.tokens, req.headers()).map_err(|e| {
        warn!("Authentication failed for {}: {e}", req.uri().path());
        e
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Claims of the access token that authenticated this request.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Claims);

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(Authenticated)
            .ok_or(AuthError::MissingToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public("/"));
        assert!(is_public("/health"));
        assert!(is_public("/docs"));
        assert!(is_public("/docs/oauth2-redirect"));
        assert!(is_public("/auth/refresh"));
        assert!(!is_public("/auth/me"));
        assert!(!is_public("/healthz"));
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(bearer_token(&HeaderMap::new()), Err(AuthError::MissingToken)));
    }

    #[test]
    fn test_wrong_scheme() {
        assert!(matches!(
            bearer_token(&headers("Basic dXNlcjpwYXNz")),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn test_empty_token() {
        assert!(matches!(bearer_token(&headers("Bearer ")), Err(AuthError::EmptyToken)));
    }

    #[test]
    fn test_extracts_token() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
    }
}
