//! Practice and staff endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::api::activity::audit;
use crate::api::Tenant;
use crate::db::practices::{self, Practice};
use crate::db::staff::{self, NewStaff, Staff, StaffUpdate};
use crate::{ApiError, ApiResult, AppState};

/// GET /api/practice
pub async fn get_practice(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
) -> ApiResult<Json<Practice>> {
    practices::get_practice(&state.db, tenant.practice_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Practice not found".to_string()))
}

/// POST /api/staff
pub async fn create_staff(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(payload): Json<NewStaff>,
) -> ApiResult<(StatusCode, Json<Staff>)> {
    let member = staff::create_staff(&state.db, tenant.practice_id, payload).await?;
    info!(practice_id = %tenant.practice_id, staff_id = %member.id, "Added staff member");

    audit(
        &state,
        tenant.practice_id,
        &tenant.actor(),
        "create",
        "staff",
        member.id,
        json!({ "role": member.role }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(member)))
}

/// GET /api/staff
pub async fn list_staff(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
) -> ApiResult<Json<Vec<Staff>>> {
    Ok(Json(staff::list_staff(&state.db, tenant.practice_id).await?))
}

/// GET /api/staff/:id
pub async fn get_staff(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Staff>> {
    Ok(Json(staff::get_staff(&state.db, tenant.practice_id, id).await?))
}

/// PATCH /api/staff/:id
pub async fn update_staff(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(update): Json<StaffUpdate>,
) -> ApiResult<Json<Staff>> {
    let before = staff::get_staff(&state.db, tenant.practice_id, id).await?;
    let member = staff::update_staff(&state.db, tenant.practice_id, id, update).await?;

    if member != before {
        audit(
            &state,
            tenant.practice_id,
            &tenant.actor(),
            "update",
            "staff",
            id,
            json!({ "role": member.role, "active": member.active }),
        )
        .await;
    }

    Ok(Json(member))
}

pub fn practice_routes() -> Router<AppState> {
    Router::new()
        .route("/api/practice", get(get_practice))
        .route("/api/staff", get(list_staff).post(create_staff))
        .route("/api/staff/:id", get(get_staff).patch(update_staff))
}
