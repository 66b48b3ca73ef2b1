/// Authentication audit trail
///
/// Appends one immutable entry per security-relevant transition. Recording
/// is best-effort: a failing sink is logged and never changes the outcome of
/// the login or logout that triggered it. `record_strict` exists for the
/// events whose audit entry must not be lost.

use std::sync::Arc;
use uuid::Uuid;

use crate::auth::ClientInfo;
use crate::clock::Clock;
use crate::error::AppError;
use crate::storage::{AuditEventType, AuditLogEntry, AuditSink};

#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    fn entry(
        &self,
        event_type: AuditEventType,
        user_id: Option<Uuid>,
        client: &ClientInfo,
        details: Option<serde_json::Value>,
    ) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            user_id,
            event_type,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            details,
            timestamp: self.clock.now(),
        }
    }

    /// Append an entry, logging and swallowing sink failures
    pub async fn record(
        &self,
        event_type: AuditEventType,
        user_id: Option<Uuid>,
        client: &ClientInfo,
        details: Option<serde_json::Value>,
    ) {
        let entry = self.entry(event_type, user_id, client, details);
        if let Err(e) = self.sink.append(&entry).await {
            tracing::error!(
                audit_id = %entry.id,
                event_type = entry.event_type.as_str(),
                user_id = ?entry.user_id,
                error = %e,
                "Failed to write audit entry"
            );
        }
    }

    /// Append an entry and surface sink failures to the caller
    pub async fn record_strict(
        &self,
        event_type: AuditEventType,
        user_id: Option<Uuid>,
        client: &ClientInfo,
        details: Option<serde_json::Value>,
    ) -> Result<(), AppError> {
        let entry = self.entry(event_type, user_id, client, details);
        self.sink.append(&entry).await?;
        Ok(())
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<AuditLogEntry>, AppError> {
        Ok(self.sink.recent(limit).await?)
    }
}
