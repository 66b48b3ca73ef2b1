/// In-process storage backends
///
/// Suitable for single-process deployments and for tests. Every map sits
/// behind one mutex; nothing here is shared across server instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::auth::Credential;
use crate::error::StorageError;
use crate::storage::traits::{AuditSink, SessionStore, StorageResult, UserStore};
use crate::storage::types::{AuditLogEntry, NewUser, Session, SessionState, User};

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::QueryExecution("in-memory store lock poisoned".to_string()))
}

#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed account, flags included
    pub fn seed(&self, user: User) -> StorageResult<()> {
        lock(&self.users)?.insert(user.id, user);
        Ok(())
    }

    pub fn remove(&self, user_id: Uuid) -> StorageResult<()> {
        lock(&self.users)?.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert_user(&self, new_user: NewUser) -> StorageResult<User> {
        let mut users = lock(&self.users)?;
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(StorageError::UniqueConstraintViolation(
                "users_email_key".to_string(),
            ));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            full_name: new_user.full_name,
            email_verified: false,
            is_admin: false,
            credential: new_user.credential,
            created_at: Utc::now(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> StorageResult<Option<User>> {
        Ok(lock(&self.users)?.get(&user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        Ok(lock(&self.users)?
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_credential(&self, user_id: Uuid, credential: &Credential) -> StorageResult<()> {
        let mut users = lock(&self.users)?;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| StorageError::NotFound(format!("user {}", user_id)))?;
        user.credential = credential.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert_session(&self, session: &Session) -> StorageResult<()> {
        lock(&self.sessions)?.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> StorageResult<Option<Session>> {
        Ok(lock(&self.sessions)?
            .values()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_by_token_hash(&self, token_hash: &str) -> StorageResult<u64> {
        let mut revoked = 0;
        for session in lock(&self.sessions)?.values_mut() {
            if session.token_hash == token_hash && session.state.is_active() {
                session.state = SessionState::Revoked;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StorageResult<u64> {
        let mut revoked = 0;
        for session in lock(&self.sessions)?.values_mut() {
            if session.user_id == user_id && session.state.is_active() {
                session.state = SessionState::Revoked;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let mut sessions = lock(&self.sessions)?;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryAuditSink {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot in insertion order
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, entry: &AuditLogEntry) -> StorageResult<()> {
        lock(&self.entries)?.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: u32) -> StorageResult<Vec<AuditLogEntry>> {
        Ok(lock(&self.entries)?
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
