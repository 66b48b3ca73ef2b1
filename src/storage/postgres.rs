/// Postgres storage backends
///
/// Schema lives in `migrations/`. Queries are runtime-checked so the crate
/// builds without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::Credential;
use crate::storage::traits::{AuditSink, SessionStore, StorageResult, UserStore};
use crate::storage::types::{
    AuditEventType, AuditLogEntry, NewUser, Session, SessionState, User,
};

type UserRow = (Uuid, String, String, bool, bool, String, DateTime<Utc>);

fn user_from_row(row: UserRow) -> User {
    let (id, email, full_name, email_verified, is_admin, password_hash, created_at) = row;
    User {
        id,
        email,
        full_name,
        email_verified,
        is_admin,
        credential: Credential::from_phc(password_hash),
        created_at,
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert_user(&self, user: NewUser) -> StorageResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, email, full_name, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, email, full_name, email_verified, is_admin, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.credential.as_phc())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(user_from_row(row))
    }

    async fn find_by_id(&self, user_id: Uuid) -> StorageResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, full_name, email_verified, is_admin, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, full_name, email_verified, is_admin, password_hash, created_at
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    async fn update_credential(&self, user_id: Uuid, credential: &Credential) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(credential.as_phc())
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

type SessionRow = (
    Uuid,
    Uuid,
    String,
    DateTime<Utc>,
    Option<String>,
    Option<String>,
    bool,
    DateTime<Utc>,
);

fn session_from_row(row: SessionRow) -> Session {
    let (id, user_id, token_hash, expires_at, ip_address, user_agent, is_valid, created_at) = row;
    Session {
        id,
        user_id,
        token_hash,
        expires_at,
        ip_address,
        user_agent,
        state: SessionState::from_is_valid(is_valid),
        created_at,
    }
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert_session(&self, session: &Session) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, refresh_token_hash, expires_at, ip_address, user_agent, is_valid, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.state.is_active())
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> StorageResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, refresh_token_hash, expires_at, ip_address, user_agent, is_valid, created_at
            FROM sessions
            WHERE refresh_token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(session_from_row))
    }

    async fn revoke_by_token_hash(&self, token_hash: &str) -> StorageResult<u64> {
        // Guarded on is_valid so concurrent rotations of one token see exactly
        // one successful revocation.
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_valid = false, revoked_at = $1
            WHERE refresh_token_hash = $2 AND is_valid = true
            "#,
        )
        .bind(Utc::now())
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StorageResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_valid = false, revoked_at = $1
            WHERE user_id = $2 AND is_valid = true
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

type AuditRow = (
    Uuid,
    Option<Uuid>,
    String,
    Option<String>,
    Option<String>,
    Option<serde_json::Value>,
    DateTime<Utc>,
);

#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, entry: &AuditLogEntry) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_audit_log (id, user_id, event_type, ip_address, user_agent, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.event_type.as_str())
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.details)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: u32) -> StorageResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, user_id, event_type, ip_address, user_agent, details, created_at
            FROM auth_audit_log
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, user_id, event_type, ip_address, user_agent, details, timestamp)| {
                let Some(event_type) = AuditEventType::parse(&event_type) else {
                    tracing::warn!(audit_id = %id, event_type = %event_type, "Skipping audit row with unknown event type");
                    return None;
                };
                Some(AuditLogEntry {
                    id,
                    user_id,
                    event_type,
                    ip_address,
                    user_agent,
                    details,
                    timestamp,
                })
            })
            .collect())
    }
}
