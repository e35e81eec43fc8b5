//! Therapy session scheduling
//!
//! A clinician can never hold two overlapping sessions that are not
//! cancelled. Sessions leave `scheduled` exactly once; every other status
//! is terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tpm_common::pagination::{calculate_pagination, Page};
use tpm_common::time::{format_timestamp, now_timestamp, parse_timestamp};
use tpm_common::{Error, Result};
use uuid::Uuid;

use super::clients::require_client;
use super::staff::require_active_staff;
use super::{opt_uuid_col, optional_text, uuid_col};

/// Longest bookable session (8 hours)
pub const MAX_DURATION_MINUTES: i64 = 480;

db_enum! {
    SessionType {
        Intake => "intake",
        Individual => "individual",
        Couples => "couples",
        Family => "family",
        Group => "group",
    }
}

db_enum! {
    SessionStatus {
        Scheduled => "scheduled",
        Completed => "completed",
        Cancelled => "cancelled",
        NoShow => "no_show",
    }
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Scheduled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub client_id: Uuid,
    pub clinician_id: Option<Uuid>,
    pub starts_at: String,
    pub ends_at: String,
    pub duration_minutes: i64,
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub location: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Session {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let session_type: String = row.try_get("session_type")?;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: uuid_col(row, "id")?,
            practice_id: uuid_col(row, "practice_id")?,
            client_id: uuid_col(row, "client_id")?,
            clinician_id: opt_uuid_col(row, "clinician_id")?,
            starts_at: row.try_get("starts_at")?,
            ends_at: row.try_get("ends_at")?,
            duration_minutes: row.try_get("duration_minutes")?,
            session_type: SessionType::from_db(&session_type)?,
            status: SessionStatus::from_db(&status)?,
            location: row.try_get("location")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    pub client_id: Uuid,
    pub clinician_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub session_type: SessionType,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionUpdate {
    pub starts_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    #[serde(default, deserialize_with = "crate::db::nullable")]
    pub clinician_id: Option<Option<Uuid>>,
    pub session_type: Option<SessionType>,
    pub status: Option<SessionStatus>,
    #[serde(default, deserialize_with = "crate::db::nullable")]
    pub location: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionFilter {
    pub client_id: Option<Uuid>,
    pub clinician_id: Option<Uuid>,
    pub status: Option<SessionStatus>,
    /// Sessions starting at or after this instant
    pub from: Option<DateTime<Utc>>,
    /// Sessions starting before this instant
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: i64,
    pub page_size: Option<i64>,
}

const SESSION_COLUMNS: &str = "id, practice_id, client_id, clinician_id, starts_at, ends_at, \
     duration_minutes, session_type, status, location, created_at, updated_at";

fn validate_duration(minutes: i64) -> Result<()> {
    if !(1..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(Error::InvalidInput(format!(
            "Duration must be between 1 and {} minutes, got {}",
            MAX_DURATION_MINUTES, minutes
        )));
    }
    Ok(())
}

fn session_window(starts_at: &DateTime<Utc>, duration_minutes: i64) -> (String, String) {
    let ends_at = *starts_at + Duration::minutes(duration_minutes);
    (format_timestamp(starts_at), format_timestamp(&ends_at))
}

/// Starts a write transaction up front so overlap checks and the booking
/// that follows them cannot interleave with another writer.
const BEGIN_BOOKING: &str = "BEGIN IMMEDIATE";

/// Reject the window if the clinician already has an overlapping session
///
/// Intervals are half-open, so back-to-back sessions do not overlap.
async fn ensure_no_overlap(
    conn: &mut SqliteConnection,
    practice_id: Uuid,
    clinician_id: Uuid,
    starts_at: &str,
    ends_at: &str,
    exclude: Option<Uuid>,
) -> Result<()> {
    let clash: Option<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM sessions
        WHERE practice_id = ? AND clinician_id = ?
          AND deleted_at IS NULL AND status != 'cancelled'
          AND starts_at < ? AND ? < ends_at
          AND id != ?
        LIMIT 1
        "#,
    )
    .bind(practice_id.to_string())
    .bind(clinician_id.to_string())
    .bind(ends_at)
    .bind(starts_at)
    .bind(exclude.map(|id| id.to_string()).unwrap_or_default())
    .fetch_optional(conn)
    .await?;

    match clash {
        Some(other) => Err(Error::Conflict(format!(
            "Clinician already has session {} between {} and {}",
            other, starts_at, ends_at
        ))),
        None => Ok(()),
    }
}

pub async fn create_session(
    pool: &SqlitePool,
    practice_id: Uuid,
    new: NewSession,
) -> Result<Session> {
    validate_duration(new.duration_minutes)?;
    require_client(pool, practice_id, new.client_id).await?;

    if let Some(clinician_id) = new.clinician_id {
        require_active_staff(pool, practice_id, clinician_id).await?;
    }

    let (starts_at, ends_at) = session_window(&new.starts_at, new.duration_minutes);
    let mut tx = pool.begin_with(BEGIN_BOOKING).await?;
    if let Some(clinician_id) = new.clinician_id {
        ensure_no_overlap(&mut tx, practice_id, clinician_id, &starts_at, &ends_at, None).await?;
    }

    let now = now_timestamp();
    let session = Session {
        id: Uuid::new_v4(),
        practice_id,
        client_id: new.client_id,
        clinician_id: new.clinician_id,
        starts_at,
        ends_at,
        duration_minutes: new.duration_minutes,
        session_type: new.session_type,
        status: SessionStatus::Scheduled,
        location: optional_text(new.location.as_deref()),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO sessions (
            id, practice_id, client_id, clinician_id, starts_at, ends_at,
            duration_minutes, session_type, status, location, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session.id.to_string())
    .bind(practice_id.to_string())
    .bind(session.client_id.to_string())
    .bind(session.clinician_id.map(|id| id.to_string()))
    .bind(&session.starts_at)
    .bind(&session.ends_at)
    .bind(session.duration_minutes)
    .bind(session.session_type.as_str())
    .bind(session.status.as_str())
    .bind(&session.location)
    .bind(&session.created_at)
    .bind(&session.updated_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(session)
}

pub async fn get_session(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<Session> {
    fetch_session(pool, practice_id, id).await
}

async fn fetch_session<'e, E>(executor: E, practice_id: Uuid, id: Uuid) -> Result<Session>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        "SELECT {} FROM sessions WHERE id = ? AND practice_id = ? AND deleted_at IS NULL",
        SESSION_COLUMNS
    ))
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .fetch_optional(executor)
    .await?;

    match row {
        Some(row) => Session::from_row(&row),
        None => Err(Error::NotFound(format!("Session {}", id))),
    }
}

fn push_session_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    practice_id: Uuid,
    filter: &SessionFilter,
) {
    qb.push(" WHERE practice_id = ")
        .push_bind(practice_id.to_string())
        .push(" AND deleted_at IS NULL");

    if let Some(client_id) = filter.client_id {
        qb.push(" AND client_id = ").push_bind(client_id.to_string());
    }
    if let Some(clinician_id) = filter.clinician_id {
        qb.push(" AND clinician_id = ").push_bind(clinician_id.to_string());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(from) = &filter.from {
        qb.push(" AND starts_at >= ").push_bind(format_timestamp(from));
    }
    if let Some(to) = &filter.to {
        qb.push(" AND starts_at < ").push_bind(format_timestamp(to));
    }
}

pub async fn list_sessions(
    pool: &SqlitePool,
    practice_id: Uuid,
    filter: &SessionFilter,
) -> Result<Page<Session>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM sessions");
    push_session_filters(&mut count, practice_id, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let p = calculate_pagination(total, filter.page, filter.page_size);

    let mut select =
        QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM sessions", SESSION_COLUMNS));
    push_session_filters(&mut select, practice_id, filter);
    select
        .push(" ORDER BY starts_at, id LIMIT ")
        .push_bind(p.page_size)
        .push(" OFFSET ")
        .push_bind(p.offset);
    let rows = select.build().fetch_all(pool).await?;

    let items = rows.iter().map(Session::from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, total, p))
}

/// Reschedule or change status of a scheduled session
///
/// Identical payloads leave the record untouched. Any change to a session
/// in a terminal status is a conflict.
pub async fn update_session(
    pool: &SqlitePool,
    practice_id: Uuid,
    id: Uuid,
    update: SessionUpdate,
) -> Result<Session> {
    let mut tx = pool.begin_with(BEGIN_BOOKING).await?;
    let existing = fetch_session(&mut *tx, practice_id, id).await?;
    let mut session = existing.clone();

    let starts = match update.starts_at {
        Some(starts) => starts,
        None => parse_timestamp(&existing.starts_at)?,
    };
    if let Some(minutes) = update.duration_minutes {
        validate_duration(minutes)?;
        session.duration_minutes = minutes;
    }
    let (starts_at, ends_at) = session_window(&starts, session.duration_minutes);
    session.starts_at = starts_at;
    session.ends_at = ends_at;

    if let Some(clinician_id) = update.clinician_id {
        session.clinician_id = clinician_id;
    }
    if let Some(session_type) = update.session_type {
        session.session_type = session_type;
    }
    if let Some(status) = update.status {
        session.status = status;
    }
    if let Some(location) = update.location {
        session.location = optional_text(location.as_deref());
    }

    if session == existing {
        return Ok(existing);
    }
    if existing.status.is_terminal() {
        return Err(Error::Conflict(format!(
            "Session {} is {} and can no longer be changed",
            id, existing.status
        )));
    }

    let rescheduled = session.starts_at != existing.starts_at
        || session.ends_at != existing.ends_at
        || session.clinician_id != existing.clinician_id;
    if let Some(clinician_id) = session.clinician_id {
        if session.clinician_id != existing.clinician_id {
            require_active_staff(&mut *tx, practice_id, clinician_id).await?;
        }
        if rescheduled && session.status != SessionStatus::Cancelled {
            ensure_no_overlap(
                &mut tx,
                practice_id,
                clinician_id,
                &session.starts_at,
                &session.ends_at,
                Some(id),
            )
            .await?;
        }
    }

    session.updated_at = now_timestamp();
    sqlx::query(
        r#"
        UPDATE sessions SET
            clinician_id = ?, starts_at = ?, ends_at = ?, duration_minutes = ?,
            session_type = ?, status = ?, location = ?, updated_at = ?
        WHERE id = ? AND practice_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(session.clinician_id.map(|id| id.to_string()))
    .bind(&session.starts_at)
    .bind(&session.ends_at)
    .bind(session.duration_minutes)
    .bind(session.session_type.as_str())
    .bind(session.status.as_str())
    .bind(&session.location)
    .bind(&session.updated_at)
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(session)
}

pub async fn delete_session(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<()> {
    let now = now_timestamp();
    let result = sqlx::query(
        r#"
        UPDATE sessions SET deleted_at = ?, updated_at = ?
        WHERE id = ? AND practice_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Session {}", id)));
    }
    Ok(())
}
