//! Session note endpoints: drafting, auto-save, sign-off, addenda and export

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tpm_common::{Page, PracticeEvent};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::activity::audit;
use crate::api::Tenant;
use crate::db::notes::{
    self, NewNote, NoteAddendum, NoteDetail, NoteFilter, NoteSave, SessionNote,
};
use crate::services::DraftRequest;
use crate::{ApiError, ApiResult, AppState};

fn emit_saved(state: &AppState, note: &SessionNote) {
    state.event_bus.emit_lossy(PracticeEvent::SessionNoteSaved {
        practice_id: note.practice_id,
        note_id: note.id,
        version: note.version,
    });
}

/// POST /api/session-notes
pub async fn create_note(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Json(payload): Json<NewNote>,
) -> ApiResult<(StatusCode, Json<SessionNote>)> {
    let note = notes::create_note(&state.db, tenant.practice_id, tenant.staff_id, payload).await?;
    info!(note_id = %note.id, session_id = %note.session_id, "Created session note");

    audit(
        &state,
        tenant.practice_id,
        &tenant.actor(),
        "create",
        "session_note",
        note.id,
        json!({ "session_id": note.session_id, "format": note.format }),
    )
    .await;
    emit_saved(&state, &note);

    Ok((StatusCode::CREATED, Json(note)))
}

/// GET /api/session-notes
pub async fn list_notes(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(filter): Query<NoteFilter>,
) -> ApiResult<Json<Page<SessionNote>>> {
    Ok(Json(notes::list_notes(&state.db, tenant.practice_id, &filter).await?))
}

/// GET /api/session-notes/:id
pub async fn get_note(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<NoteDetail>> {
    Ok(Json(notes::get_note_detail(&state.db, tenant.practice_id, id).await?))
}

/// PATCH /api/session-notes/:id
///
/// Auto-save target. Identical payloads write nothing and emit nothing.
pub async fn save_note(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(save): Json<NoteSave>,
) -> ApiResult<Json<SessionNote>> {
    let (note, changed) = notes::save_note(&state.db, tenant.practice_id, id, save).await?;

    if changed {
        audit(
            &state,
            tenant.practice_id,
            &tenant.actor(),
            "update",
            "session_note",
            id,
            json!({ "version": note.version }),
        )
        .await;
        emit_saved(&state, &note);
    }

    Ok(Json(note))
}

/// POST /api/session-notes/:id/finalize
pub async fn finalize_note(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionNote>> {
    let staff_id = tenant.require_staff()?;
    let note = notes::finalize_note(&state.db, tenant.practice_id, id, staff_id).await?;
    info!(note_id = %id, %staff_id, "Finalized session note");

    audit(
        &state,
        tenant.practice_id,
        &tenant.actor(),
        "finalize",
        "session_note",
        id,
        json!({ "version": note.version }),
    )
    .await;
    state.event_bus.emit_lossy(PracticeEvent::SessionNoteFinalized {
        practice_id: tenant.practice_id,
        note_id: id,
    });

    Ok(Json(note))
}

#[derive(Debug, Deserialize)]
pub struct AddendumRequest {
    pub body: String,
}

/// POST /api/session-notes/:id/addenda
pub async fn add_addendum(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddendumRequest>,
) -> ApiResult<(StatusCode, Json<NoteAddendum>)> {
    let staff_id = tenant.require_staff()?;
    let addendum =
        notes::add_addendum(&state.db, tenant.practice_id, id, staff_id, &payload.body).await?;

    audit(
        &state,
        tenant.practice_id,
        &tenant.actor(),
        "addendum",
        "session_note",
        id,
        json!({ "addendum_id": addendum.id }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(addendum)))
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub section: String,
    pub prompt: String,
}

/// POST /api/session-notes/:id/generate
///
/// Asks the configured LLM for one section and writes the reply into the
/// draft. Answers 503 when no LLM is configured or the call fails.
pub async fn generate_section(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GenerateRequest>,
) -> ApiResult<Json<SessionNote>> {
    let note = notes::get_note(&state.db, tenant.practice_id, id).await?;
    note.ensure_draft()?;

    let section = payload.section.trim().to_lowercase();
    if !note.format.has_section(&section) {
        return Err(ApiError::BadRequest(format!(
            "Section '{}' is not part of a {} note",
            section, note.format
        )));
    }
    if payload.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("Prompt must not be empty".to_string()));
    }

    let drafter = state.drafter.clone().ok_or_else(|| {
        ApiError::ServiceUnavailable("Note drafting is not configured".to_string())
    })?;

    let request = DraftRequest {
        format: note.format,
        section: section.clone(),
        content: note.content.clone(),
        prompt: payload.prompt,
    };
    let text = drafter.draft(&request).await.map_err(|e| {
        warn!(note_id = %id, "Drafting failed: {}", e);
        e
    })?;

    let note =
        notes::apply_generated_section(&state.db, tenant.practice_id, id, &section, &text).await?;
    info!(note_id = %id, %section, "Drafted note section");

    audit(
        &state,
        tenant.practice_id,
        &tenant.actor(),
        "generate",
        "session_note",
        id,
        json!({ "section": section, "version": note.version }),
    )
    .await;
    emit_saved(&state, &note);

    Ok(Json(note))
}

/// GET /api/session-notes/:id/export
pub async fn export_note(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let text = notes::export_note_text(&state.db, tenant.practice_id, id).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text))
}

/// DELETE /api/session-notes/:id
pub async fn delete_note(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    notes::delete_note(&state.db, tenant.practice_id, id).await?;
    audit(&state, tenant.practice_id, &tenant.actor(), "delete", "session_note", id, json!({}))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

pub fn note_routes() -> Router<AppState> {
    Router::new()
        .route("/api/session-notes", get(list_notes).post(create_note))
        .route(
            "/api/session-notes/:id",
            get(get_note).patch(save_note).delete(delete_note),
        )
        .route("/api/session-notes/:id/finalize", post(finalize_note))
        .route("/api/session-notes/:id/addenda", post(add_addendum))
        .route("/api/session-notes/:id/generate", post(generate_section))
        .route("/api/session-notes/:id/export", get(export_note))
}
