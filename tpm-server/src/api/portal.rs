//! Client portal
//!
//! A client signs in with the bearer token issued when portal access was
//! enabled and can only see their own profile and assessments. Another
//! client's assignment is reported as missing.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use tpm_common::Page;
use uuid::Uuid;

use crate::api::assessments::{finish_assignment, record_responses, SaveResponsesResult};
use crate::api::PortalClient;
use crate::db::assignments::{
    self, Assignment, AssignmentDetail, AssignmentFilter, AssignmentStatus, ResponseBatch,
};
use crate::db::clients::{self, Client};
use crate::{ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct PortalAssessmentParams {
    pub status: Option<AssignmentStatus>,
    #[serde(default)]
    pub page: i64,
    pub page_size: Option<i64>,
}

/// GET /portal/me
pub async fn get_me(
    State(state): State<AppState>,
    Extension(portal): Extension<PortalClient>,
) -> ApiResult<Json<Client>> {
    Ok(Json(clients::get_client(&state.db, portal.practice_id, portal.client_id).await?))
}

/// GET /portal/assessments
pub async fn list_assessments(
    State(state): State<AppState>,
    Extension(portal): Extension<PortalClient>,
    Query(params): Query<PortalAssessmentParams>,
) -> ApiResult<Json<Page<Assignment>>> {
    let filter = AssignmentFilter {
        client_id: Some(portal.client_id),
        status: params.status,
        page: params.page,
        page_size: params.page_size,
    };
    Ok(Json(assignments::list_assignments(&state.db, portal.practice_id, &filter).await?))
}

async fn own_assignment(state: &AppState, portal: &PortalClient, id: Uuid) -> ApiResult<Assignment> {
    Ok(assignments::get_client_assignment(&state.db, portal.practice_id, portal.client_id, id)
        .await?)
}

/// GET /portal/assessments/:id
pub async fn get_assessment(
    State(state): State<AppState>,
    Extension(portal): Extension<PortalClient>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AssignmentDetail>> {
    let assignment = own_assignment(&state, &portal, id).await?;
    Ok(Json(
        assignments::get_assignment_detail(&state.db, portal.practice_id, assignment).await?,
    ))
}

/// POST /portal/assessments/:id/responses
pub async fn save_responses(
    State(state): State<AppState>,
    Extension(portal): Extension<PortalClient>,
    Path(id): Path<Uuid>,
    Json(batch): Json<ResponseBatch>,
) -> ApiResult<Json<SaveResponsesResult>> {
    let assignment = own_assignment(&state, &portal, id).await?;
    Ok(Json(record_responses(&state, &assignment, batch, &portal.actor()).await?))
}

/// POST /portal/assessments/:id/complete
pub async fn complete_assessment(
    State(state): State<AppState>,
    Extension(portal): Extension<PortalClient>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Assignment>> {
    let assignment = own_assignment(&state, &portal, id).await?;
    Ok(Json(finish_assignment(&state, &assignment, &portal.actor()).await?))
}

pub fn portal_routes() -> Router<AppState> {
    Router::new()
        .route("/portal/me", get(get_me))
        .route("/portal/assessments", get(list_assessments))
        .route("/portal/assessments/:id", get(get_assessment))
        .route("/portal/assessments/:id/responses", post(save_responses))
        .route("/portal/assessments/:id/complete", post(complete_assessment))
}
