/// Authentication flows
///
/// Composes hashing, token issuance, sessions, rate limiting and the audit
/// trail into the operations the HTTP layer exposes.
///
/// Rotation order is invalidate-then-create: the old session is revoked
/// before the new one is written. A crash between the two leaves the user
/// with no valid session (they sign in again) rather than two.

use serde_json::json;
use std::sync::Arc;

use crate::audit::AuditLogger;
use crate::auth::client_info::ClientInfo;
use crate::auth::jwt::{TokenIssuer, TokenPair};
use crate::auth::password::{
    dummy_verify, hash_password, validate_password_strength, verify_password, Credential,
};
use crate::auth::rate_limit::{login_identifier, RateLimiter};
use crate::auth::session::SessionService;
use crate::error::{AppError, AuthError};
use crate::storage::{AuditEventType, NewUser, User, UserStore};
use crate::validators::{is_valid_email, is_valid_name};

pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: SessionService,
    tokens: TokenIssuer,
    limiter: RateLimiter,
    audit: AuditLogger,
}

async fn verify_blocking(credential: Credential, password: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&credential, &password))
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))
}

async fn hash_blocking(password: String) -> Result<Credential, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: SessionService,
        tokens: TokenIssuer,
        limiter: RateLimiter,
        audit: AuditLogger,
    ) -> Self {
        Self {
            users,
            sessions,
            tokens,
            limiter,
            audit,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Create an account; it starts unverified and non-admin
    ///
    /// # Errors
    /// - Validation errors for malformed name/email or a weak password
    /// - `UniqueConstraintViolation` if the email is taken
    pub async fn register(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<User, AppError> {
        let email = is_valid_email(email)?.to_lowercase();
        let full_name = is_valid_name(full_name)?;
        validate_password_strength(password)?;

        let credential = hash_blocking(password.to_string()).await?;
        let user = self
            .users
            .insert_user(NewUser {
                email,
                full_name,
                credential,
            })
            .await?;

        self.audit
            .record(AuditEventType::Registered, Some(user.id), client, None)
            .await;
        Ok(user)
    }

    /// Check credentials and open a new refresh session
    ///
    /// Every attempt counts against the email's rate-limit window, including
    /// successful ones. Unknown email and wrong password fail identically.
    ///
    /// # Errors
    /// - `RateLimited` once the window's threshold is exceeded
    /// - `InvalidCredentials` for any verification failure
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<(User, TokenPair), AppError> {
        let identifier = login_identifier(email);

        if self.limiter.check_and_increment(&identifier).await? {
            self.audit
                .record(
                    AuditEventType::LoginRateLimited,
                    None,
                    client,
                    Some(json!({ "identifier": identifier })),
                )
                .await;
            return Err(AuthError::RateLimited.into());
        }

        let Some(user) = self.users.find_by_email(&identifier).await? else {
            let password = password.to_string();
            if let Err(e) = tokio::task::spawn_blocking(move || dummy_verify(&password)).await {
                tracing::warn!(error = %e, "Decoy password verification task failed");
            }
            self.audit
                .record(
                    AuditEventType::LoginFailed,
                    None,
                    client,
                    Some(json!({ "identifier": identifier, "reason": "unknown_account" })),
                )
                .await;
            return Err(AuthError::InvalidCredentials.into());
        };

        if !verify_blocking(user.credential.clone(), password.to_string()).await? {
            self.audit
                .record(
                    AuditEventType::LoginFailed,
                    Some(user.id),
                    client,
                    Some(json!({ "reason": "password_mismatch" })),
                )
                .await;
            return Err(AuthError::InvalidCredentials.into());
        }

        let pair = self.tokens.issue(&user)?;
        let session = self
            .sessions
            .create(user.id, &pair.refresh_token, client)
            .await?;

        self.audit
            .record(
                AuditEventType::LoginSucceeded,
                Some(user.id),
                client,
                Some(json!({ "session_id": session.id })),
            )
            .await;

        tracing::info!(user_id = %user.id, session_id = %session.id, "User logged in");
        Ok((user, pair))
    }

    /// Rotate a refresh token into a new pair
    ///
    /// # Errors
    /// - `MissingToken` without a refresh carrier
    /// - `SessionInvalid` if validation fails or the session was already
    ///   rotated by a concurrent or replayed request
    pub async fn refresh(
        &self,
        refresh_token: Option<&str>,
        client: &ClientInfo,
    ) -> Result<(User, TokenPair), AppError> {
        let refresh_token = refresh_token.ok_or(AuthError::MissingToken)?;

        let Some((session, user)) = self.sessions.validate(refresh_token).await? else {
            self.audit
                .record(AuditEventType::RefreshRejected, None, client, None)
                .await;
            return Err(AuthError::SessionInvalid.into());
        };

        if !self.sessions.revoke(refresh_token).await? {
            tracing::warn!(user_id = %user.id, session_id = %session.id, "Refresh token reused during rotation");
            self.audit
                .record(
                    AuditEventType::RefreshReuseDetected,
                    Some(user.id),
                    client,
                    Some(json!({ "session_id": session.id })),
                )
                .await;
            return Err(AuthError::SessionInvalid.into());
        }

        let pair = self.tokens.issue(&user)?;
        let new_session = self
            .sessions
            .create(user.id, &pair.refresh_token, client)
            .await?;

        self.audit
            .record(
                AuditEventType::TokenRefreshed,
                Some(user.id),
                client,
                Some(json!({ "previous_session_id": session.id, "session_id": new_session.id })),
            )
            .await;
        Ok((user, pair))
    }

    /// End the session behind a refresh token, if there is one
    ///
    /// Repeated or concurrent calls all succeed.
    pub async fn logout(
        &self,
        refresh_token: Option<&str>,
        client: &ClientInfo,
    ) -> Result<(), AppError> {
        let user_id = refresh_token
            .and_then(|t| self.tokens.verify_refresh(t).into_claims())
            .and_then(|claims| claims.user_id().ok());

        if let Some(token) = refresh_token {
            self.sessions.invalidate(token).await?;
        }

        self.audit
            .record(AuditEventType::Logout, user_id, client, None)
            .await;
        Ok(())
    }

    /// Revoke every refresh session of the user
    pub async fn logout_all(&self, user: &User, client: &ClientInfo) -> Result<u64, AppError> {
        let revoked = self.sessions.invalidate_all(user.id).await?;
        self.audit
            .record(
                AuditEventType::LogoutAll,
                Some(user.id),
                client,
                Some(json!({ "revoked_sessions": revoked })),
            )
            .await;
        Ok(revoked)
    }

    /// Replace the user's password and revoke all of their sessions
    ///
    /// The `PasswordChanged` entry is written before anything changes, so a
    /// failing audit sink leaves the old password and sessions in place.
    ///
    /// # Errors
    /// - `InvalidCredentials` if `current_password` does not verify
    /// - Validation errors for a weak new password
    /// - Storage errors, including a failed audit write
    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AppError> {
        if !verify_blocking(user.credential.clone(), current_password.to_string()).await? {
            return Err(AuthError::InvalidCredentials.into());
        }
        validate_password_strength(new_password)?;

        let credential = hash_blocking(new_password.to_string()).await?;
        self.audit
            .record_strict(AuditEventType::PasswordChanged, Some(user.id), client, None)
            .await?;

        self.users.update_credential(user.id, &credential).await?;
        let revoked = self.sessions.invalidate_all(user.id).await?;

        tracing::info!(user_id = %user.id, revoked_sessions = revoked, "Password changed");
        Ok(())
    }
}
