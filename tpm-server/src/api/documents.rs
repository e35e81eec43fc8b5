//! Document upload and download
//!
//! Uploads carry the raw file as the request body; metadata goes in the
//! query string and `content-type`.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tpm_common::api::body_digest;
use tpm_common::db::{get_setting_i64, SettingKey};
use tpm_common::Page;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::activity::audit;
use crate::api::Tenant;
use crate::db::documents::{self, Document, NewDocument};
use crate::{ApiError, ApiResult, AppState};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub filename: String,
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentListParams {
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub page: i64,
    pub page_size: Option<i64>,
}

fn too_large(limit: i64) -> ApiError {
    ApiError::PayloadTooLarge(format!("Documents are limited to {} bytes", limit))
}

/// POST /api/documents?filename=&client_id=
pub async fn upload_document(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<(StatusCode, Json<Document>)> {
    let filename = documents::sanitize_filename(&params.filename)?;
    documents::check_document_owner(&state.db, tenant.practice_id, params.client_id).await?;

    let limit = get_setting_i64(&state.db, SettingKey::MaxDocumentBytes).await?;
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(too_large(limit));
    }

    let bytes = axum::body::to_bytes(body, usize::try_from(limit).unwrap_or(usize::MAX))
        .await
        .map_err(|_| too_large(limit))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Document body is empty".to_string()));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let id = Uuid::new_v4();
    let key = documents::storage_key(tenant.practice_id, id);
    state.blobs.put(&key, &bytes).await?;

    let created = documents::create_document(
        &state.db,
        tenant.practice_id,
        NewDocument {
            id,
            client_id: params.client_id,
            filename,
            content_type,
            size_bytes: bytes.len() as i64,
            sha256: body_digest(&bytes),
            uploaded_by: tenant.staff_id,
        },
    )
    .await;
    let document = match created {
        Ok(document) => document,
        Err(e) => {
            // Nothing references the blob without its record
            if let Err(cleanup) = state.blobs.delete(&key).await {
                warn!(%key, "Failed to remove orphaned blob: {}", cleanup);
            }
            return Err(e.into());
        }
    };
    info!(
        document_id = %document.id,
        size_bytes = document.size_bytes,
        "Stored document '{}'",
        document.filename
    );

    audit(
        &state,
        tenant.practice_id,
        &tenant.actor(),
        "upload",
        "document",
        document.id,
        json!({ "filename": document.filename, "size_bytes": document.size_bytes }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /api/documents?client_id=
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Query(params): Query<DocumentListParams>,
) -> ApiResult<Json<Page<Document>>> {
    Ok(Json(
        documents::list_documents(
            &state.db,
            tenant.practice_id,
            params.client_id,
            params.page,
            params.page_size,
        )
        .await?,
    ))
}

/// GET /api/documents/:id
pub async fn get_document(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Document>> {
    Ok(Json(documents::get_document(&state.db, tenant.practice_id, id).await?))
}

/// GET /api/documents/:id/content
///
/// The stored checksum is verified before any byte is returned.
pub async fn download_document(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let document = documents::get_document(&state.db, tenant.practice_id, id).await?;
    let bytes = state.blobs.get(&document.storage_key).await?;

    if body_digest(&bytes) != document.sha256 {
        error!(document_id = %id, "Stored document failed checksum verification");
        return Err(ApiError::Internal(format!(
            "Document {} failed checksum verification",
            id
        )));
    }

    let content_type = HeaderValue::from_str(&document.content_type)
        .unwrap_or(HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        document.filename.replace('"', "")
    ))
    .unwrap_or(HeaderValue::from_static("attachment"));

    Ok((
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        bytes,
    )
        .into_response())
}

/// DELETE /api/documents/:id
///
/// Only the metadata is removed; the blob stays in storage.
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(tenant): Extension<Tenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    documents::delete_document(&state.db, tenant.practice_id, id).await?;
    audit(&state, tenant.practice_id, &tenant.actor(), "delete", "document", id, json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}

pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/documents",
            get(list_documents)
                .post(upload_document)
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/api/documents/:id", get(get_document).delete(delete_document))
        .route("/api/documents/:id/content", get(download_document))
}
