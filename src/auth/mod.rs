pub mod tokens;
pub mod verify;

pub use tokens::{Claims, IssuedToken, TokenError, TokenIssuer, TokenKind, TokenPair};
pub use verify::{require_bearer, Authenticated};
