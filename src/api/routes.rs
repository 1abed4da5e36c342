//! API route handlers.
//!
//! All handlers receive `SharedState` via Axum state extraction. Requests
//! reaching `/auth/me` have already passed the bearer gate.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{Authenticated, TokenKind, TokenPair};
use crate::error::AuthError;
use crate::SharedState;

pub fn routes() -> Router<SharedState> {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/", get(root))
        .route("/health", get(health))
        // ── Auth ─────────────────────────────────────────────────────────
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(me))
}

// =============================================================================
// Health
// =============================================================================

async fn root() -> impl IntoResponse {
    Json(json!({
        "message": env!("CARGO_PKG_NAME"),
        "docs": "/docs",
    }))
}

/// GET /health: reports whether a pooled connection answers `SELECT 1`.
async fn health(State(state): State<SharedState>) -> Response {
    match state.db.check().await {
        Ok(()) => Json(json!({
            "status": "healthy",
            "database": "connected",
            "api": "ok",
        }))
        .into_response(),
        Err(e) => {
            warn!("Health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "database": "disconnected",
                    "api": "ok",
                })),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Auth Endpoints
// =============================================================================

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

/// POST /auth/refresh: trade a valid refresh token for a fresh pair.
async fn refresh(
    State(state): State<SharedState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    let claims = state.tokens.validate(&body.refresh_token, TokenKind::Refresh)?;
    if claims.sub.is_empty() {
        return Err(AuthError::InvalidToken("Invalid token payload".into()));
    }

    let pair = state.tokens.issue_pair(&claims.sub)?;
    info!("Issued refreshed token pair for {}", claims.sub);
    Ok(Json(pair))
}

/// GET /auth/me: identity carried by the access token.
async fn me(Authenticated(claims): Authenticated) -> impl IntoResponse {
    Json(json!({
        "subject": claims.sub,
        "issued_at": claims.issued_at(),
        "expires_at": claims.expires_at(),
    }))
}

pub async fn not_found() -> AuthError {
    AuthError::NotFound
}
