/// JWT Claims structure
///
/// An explicit, versioned claim set. Anything a token carries beyond these
/// fields is dropped during deserialization and never consulted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// Current claim layout version
pub const CLAIMS_VERSION: u8 = 1;

/// Which credential a token stands for
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Claim layout version
    pub ver: u8,
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub email: String,
    pub email_verified: bool,
    pub kind: TokenKind,
    /// Unique token id, present on refresh tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
}

impl Claims {
    /// Create claims for one token
    ///
    /// Refresh tokens get a fresh random `jti` so that two sessions issued
    /// within the same second still carry distinct token values.
    pub fn new(
        user_id: Uuid,
        email: String,
        email_verified: bool,
        kind: TokenKind,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
        issuer: String,
    ) -> Self {
        let jti = match kind {
            TokenKind::Access => None,
            TokenKind::Refresh => Some(Uuid::new_v4().to_string()),
        };
        Self {
            ver: CLAIMS_VERSION,
            sub: user_id.to_string(),
            email,
            email_verified,
            kind,
            jti,
            iat: issued_at.timestamp(),
            exp: (issued_at + lifetime).timestamp(),
            iss: issuer,
        }
    }

    /// Extract user ID from claims
    ///
    /// # Errors
    /// A subject that is not a UUID makes the whole token invalid
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::TokenInvalid)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(kind: TokenKind) -> Claims {
        Claims::new(
            Uuid::new_v4(),
            "test@example.com".to_string(),
            true,
            kind,
            Utc::now(),
            Duration::minutes(15),
            "test".to_string(),
        )
    }

    #[test]
    fn test_claims_creation() {
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let claims = Claims::new(
            user_id,
            "test@example.com".to_string(),
            false,
            TokenKind::Access,
            now,
            Duration::minutes(15),
            "test".to_string(),
        );

        assert_eq!(claims.ver, CLAIMS_VERSION);
        assert_eq!(claims.sub, user_id.to_string());
        assert!(!claims.email_verified);
        assert_eq!(claims.exp - claims.iat, 900);
        assert!(!claims.is_expired_at(now));
        assert!(claims.is_expired_at(now + Duration::minutes(15)));
    }

    #[test]
    fn test_only_refresh_claims_carry_token_id() {
        assert!(claims(TokenKind::Access).jti.is_none());

        let first = claims(TokenKind::Refresh);
        let second = claims(TokenKind::Refresh);
        assert!(first.jti.is_some());
        assert_ne!(first.jti, second.jti);
    }

    #[test]
    fn test_user_id_extraction() {
        let claims = claims(TokenKind::Access);
        assert_eq!(claims.user_id().unwrap().to_string(), claims.sub);
    }

    #[test]
    fn test_invalid_user_id() {
        let mut claims = claims(TokenKind::Access);
        claims.sub = "invalid-uuid".to_string();

        assert_eq!(claims.user_id(), Err(AuthError::TokenInvalid));
    }

    #[test]
    fn test_unknown_claims_are_dropped() {
        let mut value = serde_json::to_value(claims(TokenKind::Access)).unwrap();
        value["is_admin"] = serde_json::json!(true);

        let parsed: Claims = serde_json::from_value(value).unwrap();
        let round_tripped = serde_json::to_value(parsed).unwrap();
        assert!(round_tripped.get("is_admin").is_none());
    }
}
