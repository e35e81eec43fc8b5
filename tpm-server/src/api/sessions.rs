//! Scheduling endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde_json::json;
use tpm_common::Page;
use tracing::info;
use uuid::Uuid;

use crate::api::activity::audit;
use crate::api::Tenant;
use crate::db::sessions::{self, NewSession, Session, SessionFilter, SessionUpdate};
use crate::{ApiResult, AppState};

/// POST /api/sessions
///
/// Overlapping bookings for the same clinician are rejected with 409.
pub async fn create_session(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(payload): Json<NewSession>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let session = sessions::create_session(&state.db, tenant.practice_id, payload).await?;
    info!(
        practice_id = %tenant.practice_id,
        session_id = %session.id,
        starts_at = %session.starts_at,
        "Scheduled session"
    );

    audit(
        &state,
        tenant.practice_id,
        &tenant.actor(),
        "create",
        "session",
        session.id,
        json!({ "client_id": session.client_id, "starts_at": session.starts_at }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(filter): Query<SessionFilter>,
) -> ApiResult<Json<Page<Session>>> {
    Ok(Json(sessions::list_sessions(&state.db, tenant.practice_id, &filter).await?))
}

/// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Session>> {
    Ok(Json(sessions::get_session(&state.db, tenant.practice_id, id).await?))
}

/// PATCH /api/sessions/:id
pub async fn update_session(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(update): Json<SessionUpdate>,
) -> ApiResult<Json<Session>> {
    let before = sessions::get_session(&state.db, tenant.practice_id, id).await?;
    let session = sessions::update_session(&state.db, tenant.practice_id, id, update).await?;

    if session != before {
        info!(session_id = %id, status = %session.status, "Updated session");
        audit(
            &state,
            tenant.practice_id,
            &tenant.actor(),
            "update",
            "session",
            id,
            json!({ "status": session.status, "starts_at": session.starts_at }),
        )
        .await;
    }

    Ok(Json(session))
}

/// DELETE /api/sessions/:id
pub async fn delete_session(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    sessions::delete_session(&state.db, tenant.practice_id, id).await?;
    audit(&state, tenant.practice_id, &tenant.actor(), "delete", "session", id, json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route(
            "/api/sessions/:id",
            get(get_session).patch(update_session).delete(delete_session),
        )
}
