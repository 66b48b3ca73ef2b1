use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::error::{AppError, ErrorContext};
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;

const DEFAULT_AUDIT_LIMIT: u32 = 50;
const MAX_AUDIT_LIMIT: u32 = 500;

#[derive(Deserialize)]
pub struct AuditQuery {
    pub limit: Option<u32>,
}

/// GET /api/admin/audit?limit=
///
/// Most recent audit entries, newest first. Administrators only.
pub async fn recent_audit(
    admin: AuthenticatedUser,
    query: web::Query<AuditQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("audit_listing").with_user_id(admin.user().id.to_string());
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);

    let entries = state.auth.audit().recent(limit).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    tracing::debug!(
        request_id = %context.request_id,
        count = entries.len(),
        "Audit entries listed"
    );

    Ok(HttpResponse::Ok().json(entries))
}
