//! Notification endpoints

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use tpm_common::Page;
use uuid::Uuid;

use crate::api::Tenant;
use crate::db::notifications::{self, Notification, NotificationFilter};
use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

/// GET /api/notifications?unread=
///
/// Practice-wide notifications plus those addressed to the acting staff member.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(filter): Query<NotificationFilter>,
) -> ApiResult<Json<Page<Notification>>> {
    Ok(Json(
        notifications::list_notifications(&state.db, tenant.practice_id, tenant.staff_id, &filter)
            .await?,
    ))
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    Ok(Json(
        notifications::mark_read(&state.db, tenant.practice_id, tenant.staff_id, id).await?,
    ))
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
) -> ApiResult<Json<MarkAllReadResponse>> {
    let updated =
        notifications::mark_all_read(&state.db, tenant.practice_id, tenant.staff_id).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/:id/read", post(mark_read))
}
