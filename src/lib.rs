pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod store;

pub use config::Config;
pub use error::AuthError;

use std::sync::Arc;

use auth::TokenIssuer;
use store::ConnectionProbe;

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub tokens: TokenIssuer,
    pub db: Arc<dyn ConnectionProbe>,
}

impl AppState {
    pub fn new(config: Config, db: Arc<dyn ConnectionProbe>) -> Self {
        let tokens = TokenIssuer::new(&config.tokens);
        Self { config, tokens, db }
    }
}

pub type SharedState = Arc<AppState>;
