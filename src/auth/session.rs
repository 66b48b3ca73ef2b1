/// Refresh Session Management
///
/// Every issued refresh token is backed by exactly one session row created at
/// issuance. A refresh token is only honoured while its row is `Active` and
/// unexpired, whatever its signature says, which is what makes server-side
/// revocation possible.
///
/// Refresh tokens are hashed with SHA-256 before storage; the plaintext
/// token is never persisted.

use chrono::Duration;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::client_info::ClientInfo;
use crate::auth::jwt::{TokenIssuer, TokenVerification, REFRESH_TOKEN_TTL_SECONDS};
use crate::clock::Clock;
use crate::error::AppError;
use crate::storage::{Session, SessionState, SessionStore, User, UserStore};

/// Hash a refresh token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    tokens: TokenIssuer,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        tokens: TokenIssuer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            users,
            tokens,
            clock,
        }
    }

    /// Persist a new active session for a freshly issued refresh token
    ///
    /// # Errors
    /// Returns a storage error if the row cannot be written
    pub async fn create(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> Result<Session, AppError> {
        let now = self.clock.now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash_token(refresh_token),
            expires_at: now + Duration::seconds(REFRESH_TOKEN_TTL_SECONDS),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            state: SessionState::Active,
            created_at: now,
        };

        self.store.insert_session(&session).await?;

        tracing::debug!(session_id = %session.id, user_id = %user_id, "Refresh session created");
        Ok(session)
    }

    /// Resolve a refresh token to its session and owner
    ///
    /// Succeeds only if the signature verifies, the token is a refresh token,
    /// a row with that exact token exists, the row is active and unexpired,
    /// the row belongs to the token's subject, and the user still exists.
    /// Any failed condition yields `None`; which one is only logged.
    ///
    /// # Errors
    /// Only storage failures are errors
    pub async fn validate(&self, refresh_token: &str) -> Result<Option<(Session, User)>, AppError> {
        let claims = match self.tokens.verify_refresh(refresh_token) {
            TokenVerification::Verified(claims) => claims,
            outcome => {
                tracing::debug!(outcome = ?outcome, "Refresh token failed verification");
                return Ok(None);
            }
        };

        let Some(session) = self.store.find_by_token_hash(&hash_token(refresh_token)).await? else {
            tracing::debug!("Refresh token has no session");
            return Ok(None);
        };

        if !session.is_usable_at(self.clock.now()) {
            tracing::debug!(
                session_id = %session.id,
                state = ?session.state,
                "Refresh session revoked or expired"
            );
            return Ok(None);
        }

        if claims.user_id().ok() != Some(session.user_id) {
            tracing::warn!(session_id = %session.id, "Refresh token subject does not own session");
            return Ok(None);
        }

        let Some(user) = self.users.find_by_id(session.user_id).await? else {
            tracing::debug!(session_id = %session.id, "Refresh session owner no longer exists");
            return Ok(None);
        };

        Ok(Some((session, user)))
    }

    /// Revoke the session behind a refresh token
    ///
    /// Returns `true` only if this call moved an active session to revoked,
    /// which lets rotation detect a concurrent or replayed refresh.
    pub async fn revoke(&self, refresh_token: &str) -> Result<bool, AppError> {
        let revoked = self
            .store
            .revoke_by_token_hash(&hash_token(refresh_token))
            .await?;
        Ok(revoked > 0)
    }

    /// Idempotent invalidation: unknown or already revoked tokens succeed
    pub async fn invalidate(&self, refresh_token: &str) -> Result<(), AppError> {
        self.revoke(refresh_token).await?;
        Ok(())
    }

    /// Revoke every session a user holds
    pub async fn invalidate_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.store.revoke_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked = revoked, "All refresh sessions revoked for user");
        Ok(revoked)
    }

    /// Delete expired rows
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        Ok(self.store.purge_expired(self.clock.now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::Credential;
    use crate::clock::ManualClock;
    use crate::configuration::JwtSettings;
    use crate::storage::{InMemorySessionStore, InMemoryUserStore, NewUser};
    use chrono::Utc;

    struct Harness {
        sessions: SessionService,
        store: Arc<InMemorySessionStore>,
        users: Arc<InMemoryUserStore>,
        tokens: TokenIssuer,
        clock: ManualClock,
        user: User,
    }

    async fn harness() -> Harness {
        let clock = ManualClock::default();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let tokens = TokenIssuer::new(
            &JwtSettings {
                secret: "test-secret-key-at-least-32-characters-long".to_string(),
                issuer: "test".to_string(),
            },
            shared_clock.clone(),
        )
        .unwrap();
        let store = Arc::new(InMemorySessionStore::new());
        let users = Arc::new(InMemoryUserStore::new());
        let user = users
            .insert_user(NewUser {
                email: "owner@example.com".to_string(),
                full_name: "Owner".to_string(),
                credential: Credential::from_phc("unused".to_string()),
            })
            .await
            .unwrap();

        Harness {
            sessions: SessionService::new(store.clone(), users.clone(), tokens.clone(), shared_clock),
            store,
            users,
            tokens,
            clock,
            user,
        }
    }

    async fn login(h: &Harness) -> String {
        let pair = h.tokens.issue(&h.user).unwrap();
        h.sessions
            .create(h.user.id, &pair.refresh_token, &ClientInfo::default())
            .await
            .unwrap();
        pair.refresh_token
    }

    #[test]
    fn test_token_hashing() {
        let hash1 = hash_token("token");
        let hash2 = hash_token("token");

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
        assert_ne!(hash_token("token"), hash_token("other"));
    }

    #[tokio::test]
    async fn test_create_persists_active_session_for_seven_days() {
        let h = harness().await;
        let token = login(&h).await;

        let session = h.store.find_by_token_hash(&hash_token(&token)).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.expires_at, h.clock.now() + Duration::days(7));
        assert_ne!(session.token_hash, token);
    }

    #[tokio::test]
    async fn test_validate_returns_session_and_user() {
        let h = harness().await;
        let token = login(&h).await;

        let (session, user) = h.sessions.validate(&token).await.unwrap().unwrap();
        assert_eq!(session.user_id, h.user.id);
        assert_eq!(user.id, h.user.id);
    }

    #[tokio::test]
    async fn test_invalidated_token_never_validates_again() {
        let h = harness().await;
        let token = login(&h).await;

        h.sessions.invalidate(&token).await.unwrap();

        assert!(h.sessions.validate(&token).await.unwrap().is_none());
        assert!(matches!(
            h.tokens.verify_refresh(&token),
            TokenVerification::Verified(_)
        ));
        h.clock.advance(Duration::days(1));
        assert!(h.sessions.validate(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let h = harness().await;
        let token = login(&h).await;

        h.sessions.invalidate(&token).await.unwrap();
        h.sessions.invalidate(&token).await.unwrap();
        h.sessions.invalidate("never-issued").await.unwrap();
    }

    #[tokio::test]
    async fn test_revoke_reports_only_first_transition() {
        let h = harness().await;
        let token = login(&h).await;

        assert!(h.sessions.revoke(&token).await.unwrap());
        assert!(!h.sessions.revoke(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_session_fails_even_with_valid_signature() {
        let h = harness().await;
        let pair = h.tokens.issue(&h.user).unwrap();
        h.store
            .insert_session(&Session {
                id: Uuid::new_v4(),
                user_id: h.user.id,
                token_hash: hash_token(&pair.refresh_token),
                expires_at: h.clock.now() - Duration::seconds(1),
                ip_address: None,
                user_agent: None,
                state: SessionState::Active,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(h.sessions.validate(&pair.refresh_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_signed_token_without_session_fails() {
        let h = harness().await;
        let pair = h.tokens.issue(&h.user).unwrap();

        assert!(h.sessions.validate(&pair.refresh_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let h = harness().await;
        let pair = h.tokens.issue(&h.user).unwrap();
        h.sessions
            .create(h.user.id, &pair.access_token, &ClientInfo::default())
            .await
            .unwrap();

        assert!(h.sessions.validate(&pair.access_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deleted_user_fails_validation() {
        let h = harness().await;
        let token = login(&h).await;

        h.users.remove(h.user.id).unwrap();

        assert!(h.sessions.validate(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_all_revokes_every_session() {
        let h = harness().await;
        let first = login(&h).await;
        let second = login(&h).await;

        assert_eq!(h.sessions.invalidate_all(h.user.id).await.unwrap(), 2);
        assert!(h.sessions.validate(&first).await.unwrap().is_none());
        assert!(h.sessions.validate(&second).await.unwrap().is_none());
    }
}
