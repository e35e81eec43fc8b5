//! Authentication middleware
//!
//! Three credentials guard three route groups:
//! - tenant routes: `x-practice-id`, `x-timestamp`, `x-hash` (signed request)
//!   and optional `x-staff-id`
//! - portal routes: `Authorization: Bearer <portal token>`
//! - admin routes: `x-admin-token`
//!
//! A practice whose shared secret is 0 skips timestamp and hash checks.

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tpm_common::api::{body_digest, signing_envelope, validate_hash, validate_timestamp, ApiAuthError};
use tpm_common::db::{get_setting_i64, SettingKey};
use tpm_common::time::now_millis;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{clients, practices, staff};
use crate::{ApiError, ApiResult, AppState};

pub const PRACTICE_HEADER: &str = "x-practice-id";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const HASH_HEADER: &str = "x-hash";
pub const STAFF_HEADER: &str = "x-staff-id";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
const AUTHORIZATION_HEADER: &str = "authorization";

/// Authenticated practice request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenant {
    pub practice_id: Uuid,
    /// Acting staff member from `x-staff-id`
    pub staff_id: Option<Uuid>,
}

impl Tenant {
    /// Audit actor for this request
    pub fn actor(&self) -> String {
        match self.staff_id {
            Some(id) => format!("staff:{}", id),
            None => "system".to_string(),
        }
    }

    /// Acting staff member, required for clinical sign-off
    pub fn require_staff(&self) -> ApiResult<Uuid> {
        self.staff_id.ok_or_else(|| {
            ApiError::BadRequest(format!(
                "This operation requires an acting staff member ({} header)",
                STAFF_HEADER
            ))
        })
    }
}

/// Authenticated portal client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalClient {
    pub practice_id: Uuid,
    pub client_id: Uuid,
}

impl PortalClient {
    pub fn actor(&self) -> String {
        format!("portal:{}", self.client_id)
    }
}

impl From<ApiAuthError> for ApiError {
    fn from(err: ApiAuthError) -> Self {
        if let ApiAuthError::InvalidHash { provided, calculated } = &err {
            warn!("Hash validation failed: provided={}, calculated={}", provided, calculated);
            return ApiError::Unauthorized("Invalid hash".to_string());
        }
        ApiError::Unauthorized(err.to_string())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, ApiAuthError> {
    headers
        .get(name)
        .map(|v| v.to_str().map_err(|_| ApiAuthError::MalformedHeader(name)))
        .transpose()
}

fn required_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, ApiAuthError> {
    header_str(headers, name)?.ok_or(ApiAuthError::MissingHeader(name))
}

fn parse_header<T: std::str::FromStr>(headers: &HeaderMap, name: &'static str) -> Result<Option<T>, ApiAuthError> {
    header_str(headers, name)?
        .map(|raw| raw.trim().parse().map_err(|_| ApiAuthError::MalformedHeader(name)))
        .transpose()
}

/// Authenticate a practice request and attach [`Tenant`]
pub async fn tenant_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let headers = request.headers();
    let practice_id: Uuid =
        parse_header(headers, PRACTICE_HEADER)?.ok_or(ApiAuthError::MissingHeader(PRACTICE_HEADER))?;
    let staff_id: Option<Uuid> = parse_header(headers, STAFF_HEADER)?;

    let secret = practices::load_shared_secret(&state.db, practice_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(format!("Unknown practice {}", practice_id)))?;

    let mut request = if secret == 0 {
        debug!(%practice_id, "Request signing disabled for practice");
        request
    } else {
        verify_signature(&state, request, secret).await?
    };

    if let Some(staff_id) = staff_id {
        if !staff::is_active_staff(&state.db, practice_id, staff_id).await? {
            return Err(ApiError::Unauthorized(format!(
                "Staff member {} is not active in this practice",
                staff_id
            )));
        }
    }

    request.extensions_mut().insert(Tenant { practice_id, staff_id });
    Ok(next.run(request).await)
}

/// Check timestamp and hash, returning the request with its body restored
async fn verify_signature(state: &AppState, request: Request, secret: i64) -> ApiResult<Request> {
    let headers = request.headers();
    let timestamp: i64 = parse_header(headers, TIMESTAMP_HEADER)?
        .ok_or(ApiAuthError::MissingHeader(TIMESTAMP_HEADER))?;
    let provided = required_header(headers, HASH_HEADER)?.to_string();

    let window = get_setting_i64(&state.db, SettingKey::AuthTimestampWindowMs).await?;
    validate_timestamp(timestamp, now_millis(), window)?;

    let max_body = get_setting_i64(&state.db, SettingKey::MaxDocumentBytes).await?;
    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::try_from(max_body).unwrap_or(usize::MAX))
        .await
        .map_err(|_| {
            ApiError::PayloadTooLarge(format!("Request body exceeds {} bytes", max_body))
        })?;

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path());
    let envelope = signing_envelope(parts.method.as_str(), path, timestamp, &body_digest(&body_bytes));
    validate_hash(&provided, &envelope, secret)?;

    Ok(Request::from_parts(parts, Body::from(body_bytes)))
}

/// Authenticate a portal bearer token and attach [`PortalClient`]
pub async fn portal_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = header_str(request.headers(), AUTHORIZATION_HEADER)?
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Missing portal bearer token".to_string()))?;

    let (practice_id, client_id) = clients::find_portal_client(&state.db, token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Portal access is not enabled".to_string()))?;

    request.extensions_mut().insert(PortalClient { practice_id, client_id });
    Ok(next.run(request).await)
}

/// Guard admin routes with the configured admin token
///
/// Without a configured token the admin surface does not exist (404).
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ApiError::NotFound("No such route".to_string()));
    };

    let provided = header_str(request.headers(), ADMIN_TOKEN_HEADER)?
        .ok_or(ApiAuthError::MissingHeader(ADMIN_TOKEN_HEADER))?;
    if body_digest(provided.as_bytes()) != body_digest(expected.as_bytes()) {
        return Err(ApiError::Unauthorized("Invalid admin token".to_string()));
    }

    Ok(next.run(request).await)
}
