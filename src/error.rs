use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::auth::TokenError;
use crate::store::PoolError;

/// Unified error type for the HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    // ── Auth Errors ─────────────────────────────────────────────────────
    #[error("No authentication token provided")]
    MissingToken,

    #[error("Empty token")]
    EmptyToken,

    #[error("{0}")]
    InvalidToken(String),

    #[error("Token has expired")]
    TokenExpired,

    // ── Resource Errors ─────────────────────────────────────────────────
    #[error("Not Found")]
    NotFound,

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::WrongKind { .. } => AuthError::InvalidToken("Invalid token type".into()),
            TokenError::InvalidSignature | TokenError::Malformed(_) => {
                AuthError::InvalidToken("Invalid token".into())
            }
            TokenError::Signing(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<PoolError> for AuthError {
    fn from(e: PoolError) -> Self {
        tracing::error!("Database error: {e}");
        AuthError::Unavailable(e.to_string())
    }
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingToken
            | AuthError::EmptyToken
            | AuthError::InvalidToken(_)
            | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let AuthError::Internal(detail) = &self {
            tracing::error!("Unexpected error: {detail}");
        }

        let body = json!({ "detail": self.to_string() });
        let mut response = (status, axum::Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
