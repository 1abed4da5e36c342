//! HTTP router.
//!
//! - / - service banner
//! - /health - database connectivity check
//! - /auth/refresh - exchange a refresh token for a new pair
//! - /auth/me - claims of the presented access token
//!
//! Everything except the public paths goes through the bearer gate.

pub mod routes;

use crate::auth::require_bearer;
use crate::SharedState;
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::routes()
        .fallback(routes::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
