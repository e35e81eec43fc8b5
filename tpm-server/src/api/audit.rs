//! Audit log (read-only)

use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use tpm_common::Page;

use crate::api::Tenant;
use crate::db::audit::{self, AuditEntry, AuditFilter};
use crate::{ApiResult, AppState};

/// GET /api/audit-log?entity_type=&entity_id=
pub async fn list_audit_log(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(filter): Query<AuditFilter>,
) -> ApiResult<Json<Page<AuditEntry>>> {
    Ok(Json(audit::list_entries(&state.db, tenant.practice_id, &filter).await?))
}

pub fn audit_routes() -> Router<AppState> {
    Router::new().route("/api/audit-log", get(list_audit_log))
}
