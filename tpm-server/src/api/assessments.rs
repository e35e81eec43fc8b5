//! Assessment template and assignment endpoints
//!
//! Saving answers and completing an assignment are shared with the client
//! portal; both paths go through [`record_responses`] and
//! [`finish_assignment`] so events, notifications and audit entries match.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tpm_common::{Page, PracticeEvent};
use tracing::info;
use uuid::Uuid;

use crate::api::activity::{audit, notify};
use crate::api::Tenant;
use crate::db::assignments::{
    self, Assignment, AssignmentDetail, AssignmentFilter, NewAssignment, Progress, ResponseBatch,
};
use crate::db::notifications::NewNotification;
use crate::db::templates::{self, NewTemplate, Template, TemplateDetail};
use crate::db::clients;
use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct SaveResponsesResult {
    pub assignment: Assignment,
    pub progress: Progress,
}

/// Apply a response batch, then publish progress and audit it
pub async fn record_responses(
    state: &AppState,
    assignment: &Assignment,
    batch: ResponseBatch,
    actor: &str,
) -> ApiResult<SaveResponsesResult> {
    let count = batch.responses.len();
    let (assignment, progress) = assignments::save_responses(&state.db, assignment, batch).await?;

    if count > 0 {
        audit(
            state,
            assignment.practice_id,
            actor,
            "save_responses",
            "assessment_assignment",
            assignment.id,
            json!({ "responses": count, "answered": progress.answered }),
        )
        .await;
        state.event_bus.emit_lossy(PracticeEvent::AssessmentProgress {
            practice_id: assignment.practice_id,
            assignment_id: assignment.id,
            answered: progress.answered,
            total: progress.total,
        });
    }

    Ok(SaveResponsesResult { assignment, progress })
}

/// Complete an assignment, then notify the practice and audit it
pub async fn finish_assignment(
    state: &AppState,
    assignment: &Assignment,
    actor: &str,
) -> ApiResult<Assignment> {
    let completed = assignments::complete_assignment(&state.db, assignment).await?;
    let practice_id = completed.practice_id;
    info!(assignment_id = %completed.id, score = ?completed.score, "Completed assessment");

    audit(
        state,
        practice_id,
        actor,
        "complete",
        "assessment_assignment",
        completed.id,
        json!({ "score": completed.score }),
    )
    .await;
    state.event_bus.emit_lossy(PracticeEvent::AssessmentCompleted {
        practice_id,
        assignment_id: completed.id,
        client_id: completed.client_id,
        score: completed.score,
    });

    let client = clients::get_client(&state.db, practice_id, completed.client_id).await?;
    let template = templates::get_template(&state.db, practice_id, completed.template_id).await?;
    notify(
        state,
        practice_id,
        NewNotification {
            recipient_id: None,
            kind: "assessment_completed",
            message: format!("{} completed {}", client.display_name(), template.name),
            entity_type: Some("assessment_assignment"),
            entity_id: Some(completed.id),
        },
    )
    .await?;

    Ok(completed)
}

/// POST /api/assessments/templates
pub async fn create_template(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(payload): Json<NewTemplate>,
) -> ApiResult<(StatusCode, Json<TemplateDetail>)> {
    let detail = templates::create_template(&state.db, tenant.practice_id, payload).await?;
    let questions = detail.questions().count();
    info!(template_id = %detail.template.id, questions, "Created assessment template");

    audit(
        &state,
        tenant.practice_id,
        &tenant.actor(),
        "create",
        "assessment_template",
        detail.template.id,
        json!({ "name": detail.template.name, "questions": questions }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/assessments/templates
pub async fn list_templates(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
) -> ApiResult<Json<Vec<Template>>> {
    Ok(Json(templates::list_templates(&state.db, tenant.practice_id).await?))
}

/// GET /api/assessments/templates/:id
pub async fn get_template(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TemplateDetail>> {
    Ok(Json(templates::get_template_detail(&state.db, tenant.practice_id, id).await?))
}

/// DELETE /api/assessments/templates/:id
///
/// Archives the template. Existing assignments keep working.
pub async fn archive_template(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Template>> {
    let before = templates::get_template(&state.db, tenant.practice_id, id).await?;
    let template = templates::archive_template(&state.db, tenant.practice_id, id).await?;

    if before.archived_at.is_none() {
        audit(
            &state,
            tenant.practice_id,
            &tenant.actor(),
            "archive",
            "assessment_template",
            id,
            json!({}),
        )
        .await;
    }

    Ok(Json(template))
}

/// POST /api/assessments/assignments
pub async fn create_assignment(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(payload): Json<NewAssignment>,
) -> ApiResult<(StatusCode, Json<Assignment>)> {
    let assignment = assignments::create_assignment(&state.db, tenant.practice_id, payload).await?;
    info!(
        assignment_id = %assignment.id,
        client_id = %assignment.client_id,
        "Assigned assessment"
    );

    audit(
        &state,
        tenant.practice_id,
        &tenant.actor(),
        "create",
        "assessment_assignment",
        assignment.id,
        json!({ "client_id": assignment.client_id, "template_id": assignment.template_id }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(assignment)))
}

/// GET /api/assessments/assignments
pub async fn list_assignments(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(filter): Query<AssignmentFilter>,
) -> ApiResult<Json<Page<Assignment>>> {
    Ok(Json(assignments::list_assignments(&state.db, tenant.practice_id, &filter).await?))
}

/// GET /api/assessments/assignments/:id
pub async fn get_assignment(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AssignmentDetail>> {
    let assignment = assignments::get_assignment(&state.db, tenant.practice_id, id).await?;
    Ok(Json(
        assignments::get_assignment_detail(&state.db, tenant.practice_id, assignment).await?,
    ))
}

/// POST /api/assessments/assignments/:id/responses
pub async fn save_responses(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(batch): Json<ResponseBatch>,
) -> ApiResult<Json<SaveResponsesResult>> {
    let assignment = assignments::get_assignment(&state.db, tenant.practice_id, id).await?;
    Ok(Json(record_responses(&state, &assignment, batch, &tenant.actor()).await?))
}

/// POST /api/assessments/assignments/:id/complete
pub async fn complete_assignment(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Assignment>> {
    let assignment = assignments::get_assignment(&state.db, tenant.practice_id, id).await?;
    Ok(Json(finish_assignment(&state, &assignment, &tenant.actor()).await?))
}

/// DELETE /api/assessments/assignments/:id
pub async fn delete_assignment(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    assignments::delete_assignment(&state.db, tenant.practice_id, id).await?;
    audit(
        &state,
        tenant.practice_id,
        &tenant.actor(),
        "delete",
        "assessment_assignment",
        id,
        json!({}),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

pub fn assessment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/assessments/templates",
            get(list_templates).post(create_template),
        )
        .route(
            "/api/assessments/templates/:id",
            get(get_template).delete(archive_template),
        )
        .route(
            "/api/assessments/assignments",
            get(list_assignments).post(create_assignment),
        )
        .route(
            "/api/assessments/assignments/:id",
            get(get_assignment).delete(delete_assignment),
        )
        .route("/api/assessments/assignments/:id/responses", post(save_responses))
        .route("/api/assessments/assignments/:id/complete", post(complete_assignment))
}
