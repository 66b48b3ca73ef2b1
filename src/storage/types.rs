use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Credential;

/// Account row as seen by the authentication core
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub email_verified: bool,
    pub is_admin: bool,
    pub credential: Credential,
    pub created_at: DateTime<Utc>,
}

/// Registration input, already validated and hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub credential: Credential,
}

/// Lifecycle of a refresh session. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Revoked,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    /// Persisted as the `is_valid` column
    pub fn from_is_valid(is_valid: bool) -> Self {
        if is_valid {
            SessionState::Active
        } else {
            SessionState::Revoked
        }
    }
}

/// Server-side record backing one refresh token
///
/// Only the SHA-256 digest of the refresh token is kept.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Active and not yet expired at `now`
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.state.is_active() && self.expires_at > now
    }
}

/// Security-relevant events kept in the audit trail
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Registered,
    LoginSucceeded,
    LoginFailed,
    LoginRateLimited,
    Logout,
    LogoutAll,
    TokenRefreshed,
    RefreshRejected,
    RefreshReuseDetected,
    PasswordChanged,
    AccessDenied,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::LoginSucceeded => "login_succeeded",
            Self::LoginFailed => "login_failed",
            Self::LoginRateLimited => "login_rate_limited",
            Self::Logout => "logout",
            Self::LogoutAll => "logout_all",
            Self::TokenRefreshed => "token_refreshed",
            Self::RefreshRejected => "refresh_rejected",
            Self::RefreshReuseDetected => "refresh_reuse_detected",
            Self::PasswordChanged => "password_changed",
            Self::AccessDenied => "access_denied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "registered" => Some(Self::Registered),
            "login_succeeded" => Some(Self::LoginSucceeded),
            "login_failed" => Some(Self::LoginFailed),
            "login_rate_limited" => Some(Self::LoginRateLimited),
            "logout" => Some(Self::Logout),
            "logout_all" => Some(Self::LogoutAll),
            "token_refreshed" => Some(Self::TokenRefreshed),
            "refresh_rejected" => Some(Self::RefreshRejected),
            "refresh_reuse_detected" => Some(Self::RefreshReuseDetected),
            "password_changed" => Some(Self::PasswordChanged),
            "access_denied" => Some(Self::AccessDenied),
            _ => None,
        }
    }
}

/// Immutable audit trail entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type: AuditEventType,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}
