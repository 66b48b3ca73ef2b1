/// Storage module
///
/// Traits at the persistence seam plus Postgres and in-process backends.

mod memory;
mod postgres;
mod traits;
mod types;

pub use memory::{InMemoryAuditSink, InMemorySessionStore, InMemoryUserStore};
pub use postgres::{PgAuditSink, PgSessionStore, PgUserStore};
pub use traits::{AuditSink, SessionStore, StorageResult, UserStore};
pub use types::{AuditEventType, AuditLogEntry, NewUser, Session, SessionState, User};
