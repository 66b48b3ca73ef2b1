/// JWT Token Issuance and Verification
///
/// Access tokens live 15 minutes, refresh tokens 7 days; both are HS256
/// signed with the configured secret. Verification never fails with an
/// error: it reports `Verified`, `Invalid` or `Expired` so callers can tell a
/// refreshable credential from a forged one.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;

use crate::auth::claims::{Claims, TokenKind, CLAIMS_VERSION};
use crate::clock::Clock;
use crate::configuration::JwtSettings;
use crate::error::{AppError, ConfigError};
use crate::storage::User;

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
pub const REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Outcome of checking a token's signature and lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenVerification {
    Verified(Claims),
    /// Bad signature, wrong issuer, wrong kind, malformed or unknown version
    Invalid,
    /// Authentic but past its `exp`
    Expired,
}

impl TokenVerification {
    pub fn into_claims(self) -> Option<Claims> {
        match self {
            TokenVerification::Verified(claims) => Some(claims),
            _ => None,
        }
    }
}

/// Freshly issued access/refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// # Errors
    /// Refuses to build without a usable signing secret
    pub fn new(settings: &JwtSettings, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            issuer: settings.issuer.clone(),
            clock,
        })
    }

    /// Issue an access/refresh pair for a user
    pub fn issue(&self, user: &User) -> Result<TokenPair, AppError> {
        let now = self.clock.now();
        let access = Claims::new(
            user.id,
            user.email.clone(),
            user.email_verified,
            TokenKind::Access,
            now,
            Duration::seconds(ACCESS_TOKEN_TTL_SECONDS),
            self.issuer.clone(),
        );
        let refresh = Claims::new(
            user.id,
            user.email.clone(),
            user.email_verified,
            TokenKind::Refresh,
            now,
            Duration::seconds(REFRESH_TOKEN_TTL_SECONDS),
            self.issuer.clone(),
        );

        Ok(TokenPair {
            access_expires_at: access.expires_at(),
            refresh_expires_at: refresh.expires_at(),
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify signature, issuer, claim version and expiry
    ///
    /// Expiry is judged by the injected clock, not by the library, so that
    /// `Expired` is only ever reported for authentic tokens.
    pub fn verify(&self, token: &str) -> TokenVerification {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = %e, "JWT rejected");
                return TokenVerification::Invalid;
            }
        };

        if claims.ver != CLAIMS_VERSION {
            tracing::debug!(version = claims.ver, "JWT carries unsupported claim version");
            return TokenVerification::Invalid;
        }

        if claims.is_expired_at(self.clock.now()) {
            return TokenVerification::Expired;
        }

        TokenVerification::Verified(claims)
    }

    pub fn verify_access(&self, token: &str) -> TokenVerification {
        self.verify_kind(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> TokenVerification {
        self.verify_kind(token, TokenKind::Refresh)
    }

    fn verify_kind(&self, token: &str, kind: TokenKind) -> TokenVerification {
        match self.verify(token) {
            TokenVerification::Verified(claims) if claims.kind != kind => {
                tracing::debug!(expected = ?kind, found = ?claims.kind, "JWT of wrong kind");
                TokenVerification::Invalid
            }
            other => other,
        }
    }
}
