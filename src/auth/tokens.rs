//! Signed, time-limited credentials.
//!
//! Two tiers share one signing key:
//! - `access`: short-lived, presented as a bearer token on every request
//! - `refresh`: long-lived, only exchanged for a new pair

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::config::TokenConfig;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("expected {expected} token, got {got}")]
    WrongKind { expected: TokenKind, got: TokenKind },

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Credential tier, carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jti: String,
}

impl Claims {
    pub fn subject(&self) -> &str {
        &self.sub
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// An encoded token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Access + refresh credentials for one subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

/// Issues and validates credentials with a shared HMAC secret.
pub struct TokenIssuer {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &TokenConfig) -> Self {
        let secret = config.secret_key.as_bytes();
        Self {
            algorithm: config.algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Lifetime of a credential of the given kind.
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    pub fn issue(&self, subject: &str, kind: TokenKind) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, kind, Utc::now())
    }

    /// Issue a credential as if the current time were `now`.
    pub fn issue_at(
        &self,
        subject: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires = now
            .checked_add_signed(self.ttl(kind))
            .ok_or_else(|| TokenError::Signing("expiry is out of range".into()))?;
        let claims = Claims {
            sub: subject.to_string(),
            kind,
            iat: now.timestamp(),
            exp: expires.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken { token, claims })
    }

    pub fn issue_pair(&self, subject: &str) -> Result<TokenPair, TokenError> {
        let now = Utc::now();
        let access = self.issue_at(subject, TokenKind::Access, now)?;
        let refresh = self.issue_at(subject, TokenKind::Refresh, now)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "bearer".into(),
        })
    }

    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        self.validate_at(token, expected, Utc::now())
    }

    /// Validate a credential against the clock value `now`.
    ///
    /// Signature is checked before expiry, so a forged token never reports
    /// `Expired`.
    pub fn validate_at(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                _ => TokenError::Malformed(e.to_string()),
            })?
            .claims;

        if claims.exp <= claims.iat {
            return Err(TokenError::Malformed("expiry does not follow issuance".into()));
        }
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                got: claims.kind,
            });
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str, algorithm: Algorithm) -> TokenConfig {
        TokenConfig {
            secret_key: secret.into(),
            algorithm,
            access_ttl: Duration::minutes(60),
            refresh_ttl: Duration::days(7),
        }
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&config("test-secret", Algorithm::HS256))
    }

    #[test]
    fn test_access_expires_after_sixty_minutes() {
        let issuer = issuer();
        let now = Utc::now();
        let issued = issuer.issue_at("ada@example.com", TokenKind::Access, now).unwrap();
        assert_eq!(issued.claims.iat, now.timestamp());
        assert_eq!(issued.claims.exp, now.timestamp() + 60 * 60);
        assert_eq!(issued.claims.kind, TokenKind::Access);
    }

    #[test]
    fn test_refresh_expires_after_seven_days() {
        let issuer = issuer();
        let now = Utc::now();
        let issued = issuer.issue_at("ada@example.com", TokenKind::Refresh, now).unwrap();
        assert_eq!(issued.claims.exp, now.timestamp() + 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_validate_returns_subject() {
        let issuer = issuer();
        let issued = issuer.issue("ada@example.com", TokenKind::Access).unwrap();
        let claims = issuer.validate(&issued.token, TokenKind::Access).unwrap();
        assert_eq!(claims.subject(), "ada@example.com");
        assert_eq!(claims, issued.claims);
    }

    #[test]
    fn test_expired_token_fails() {
        let issuer = issuer();
        let issued_at = Utc::now() - Duration::hours(2);
        let issued = issuer.issue_at("ada@example.com", TokenKind::Access, issued_at).unwrap();
        assert!(matches!(
            issuer.validate(&issued.token, TokenKind::Access),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_expiry_boundary() {
        let issuer = issuer();
        let now = Utc::now();
        let issued = issuer.issue_at("ada@example.com", TokenKind::Access, now).unwrap();
        let exp = DateTime::from_timestamp(issued.claims.exp, 0).unwrap();

        let just_before = exp - Duration::seconds(1);
        assert!(issuer.validate_at(&issued.token, TokenKind::Access, just_before).is_ok());
        assert!(matches!(
            issuer.validate_at(&issued.token, TokenKind::Access, exp),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_foreign_secret_is_invalid_signature() {
        let other = TokenIssuer::new(&config("another-secret", Algorithm::HS256));
        let forged = other.issue("ada@example.com", TokenKind::Access).unwrap();
        assert!(matches!(
            issuer().validate(&forged.token, TokenKind::Access),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_forged_expired_token_reports_signature() {
        let other = TokenIssuer::new(&config("another-secret", Algorithm::HS256));
        let forged = other
            .issue_at("ada@example.com", TokenKind::Access, Utc::now() - Duration::days(1))
            .unwrap();
        assert!(matches!(
            issuer().validate(&forged.token, TokenKind::Access),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_spliced_payload_is_rejected() {
        let issuer = issuer();
        let ada = issuer.issue("ada@example.com", TokenKind::Access).unwrap().token;
        let eve = issuer.issue("eve@example.com", TokenKind::Access).unwrap().token;

        let ada_parts: Vec<&str> = ada.split('.').collect();
        let eve_parts: Vec<&str> = eve.split('.').collect();
        let spliced = format!("{}.{}.{}", ada_parts[0], eve_parts[1], ada_parts[2]);

        assert!(matches!(
            issuer.validate(&spliced, TokenKind::Access),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_algorithm_mismatch_is_invalid_signature() {
        let hs512 = TokenIssuer::new(&config("test-secret", Algorithm::HS512));
        let token = hs512.issue("ada@example.com", TokenKind::Access).unwrap();
        assert!(matches!(
            issuer().validate(&token.token, TokenKind::Access),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let issuer = issuer();
        let refresh = issuer.issue("ada@example.com", TokenKind::Refresh).unwrap();
        match issuer.validate(&refresh.token, TokenKind::Access) {
            Err(TokenError::WrongKind { expected, got }) => {
                assert_eq!(expected, TokenKind::Access);
                assert_eq!(got, TokenKind::Refresh);
            }
            other => panic!("expected WrongKind, got {other:?}"),
        }
        assert!(issuer.validate(&refresh.token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            issuer().validate("not-a-token", TokenKind::Access),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_unrepresentable_expiry_is_signing_error() {
        let issuer = TokenIssuer::new(&TokenConfig {
            refresh_ttl: Duration::days(1_000_000_000),
            ..config("test-secret", Algorithm::HS256)
        });
        assert!(matches!(
            issuer.issue("ada@example.com", TokenKind::Refresh),
            Err(TokenError::Signing(_))
        ));
        assert!(matches!(issuer.issue_pair("ada@example.com"), Err(TokenError::Signing(_))));
        assert!(issuer.issue("ada@example.com", TokenKind::Access).is_ok());
    }

    #[test]
    fn test_pair_shares_subject() {
        let issuer = issuer();
        let pair = issuer.issue_pair("ada@example.com").unwrap();
        assert_eq!(pair.token_type, "bearer");

        let access = issuer.validate(&pair.access_token, TokenKind::Access).unwrap();
        let refresh = issuer.validate(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(access.sub, refresh.sub);
        assert_ne!(access.jti, refresh.jti);
        assert!(refresh.exp > access.exp);
    }
}
