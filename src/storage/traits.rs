use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::Credential;
use crate::error::StorageError;
use crate::storage::types::{AuditLogEntry, NewUser, Session, User};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Account lookups and the few account writes this core performs
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new account; a taken email yields `UniqueConstraintViolation`
    async fn insert_user(&self, user: NewUser) -> StorageResult<User>;

    async fn find_by_id(&self, user_id: Uuid) -> StorageResult<Option<User>>;

    /// Case-insensitive email lookup
    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    async fn update_credential(&self, user_id: Uuid, credential: &Credential) -> StorageResult<()>;
}

/// Persistence for refresh sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> StorageResult<()>;

    /// Exact match on the stored token digest
    async fn find_by_token_hash(&self, token_hash: &str) -> StorageResult<Option<Session>>;

    /// Move matching active sessions to `Revoked`; returns how many moved
    async fn revoke_by_token_hash(&self, token_hash: &str) -> StorageResult<u64>;

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StorageResult<u64>;

    /// Delete sessions that expired before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<u64>;
}

/// Append-only sink for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> StorageResult<()>;

    /// Most recent entries first
    async fn recent(&self, limit: u32) -> StorageResult<Vec<AuditLogEntry>>;
}
