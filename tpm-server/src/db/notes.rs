//! Session notes and their lifecycle
//!
//! A note starts as a draft that is saved repeatedly (auto-save). Each save
//! merges the submitted sections into the stored content and bumps the
//! version only when something actually changed. Finalizing locks the note;
//! later information is recorded as addenda.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tpm_common::pagination::{calculate_pagination, Page};
use tpm_common::time::now_timestamp;
use tpm_common::{Error, Result};
use uuid::Uuid;

use super::clients::get_client;
use super::sessions::get_session;
use super::{map_unique_violation, opt_uuid_col, required_text, uuid_col};

db_enum! {
    /// Documentation structure of a note
    NoteFormat {
        Soap => "soap",
        Dap => "dap",
        Birp => "birp",
        Free => "free",
    }
}

impl NoteFormat {
    /// Section keys in display order
    pub fn sections(self) -> &'static [&'static str] {
        match self {
            NoteFormat::Soap => &["subjective", "objective", "assessment", "plan"],
            NoteFormat::Dap => &["data", "assessment", "plan"],
            NoteFormat::Birp => &["behavior", "intervention", "response", "plan"],
            NoteFormat::Free => &["notes"],
        }
    }

    pub fn has_section(self, section: &str) -> bool {
        self.sections().iter().any(|s| *s == section)
    }
}

db_enum! {
    NoteStatus {
        Draft => "draft",
        Finalized => "finalized",
    }
}

pub type NoteContent = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionNote {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub session_id: Uuid,
    pub client_id: Uuid,
    pub author_id: Option<Uuid>,
    pub format: NoteFormat,
    pub content: NoteContent,
    pub status: NoteStatus,
    pub version: i64,
    pub ai_generated: bool,
    pub finalized_at: Option<String>,
    pub finalized_by: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionNote {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let format: String = row.try_get("format")?;
        let status: String = row.try_get("status")?;
        let content: String = row.try_get("content")?;
        Ok(Self {
            id: uuid_col(row, "id")?,
            practice_id: uuid_col(row, "practice_id")?,
            session_id: uuid_col(row, "session_id")?,
            client_id: uuid_col(row, "client_id")?,
            author_id: opt_uuid_col(row, "author_id")?,
            format: NoteFormat::from_db(&format)?,
            content: serde_json::from_str(&content)?,
            status: NoteStatus::from_db(&status)?,
            version: row.try_get("version")?,
            ai_generated: row.try_get("ai_generated")?,
            finalized_at: row.try_get("finalized_at")?,
            finalized_by: opt_uuid_col(row, "finalized_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.status == NoteStatus::Finalized
    }

    pub fn ensure_draft(&self) -> Result<()> {
        if self.is_locked() {
            return Err(Error::Conflict(format!("Session note {} is finalized", self.id)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteAddendum {
    pub id: Uuid,
    pub note_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: String,
}

/// A note together with its addenda
#[derive(Debug, Clone, Serialize)]
pub struct NoteDetail {
    #[serde(flatten)]
    pub note: SessionNote,
    pub addenda: Vec<NoteAddendum>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNote {
    pub session_id: Uuid,
    pub format: Option<NoteFormat>,
    #[serde(default)]
    pub sections: NoteContent,
}

/// Auto-save payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteSave {
    pub format: Option<NoteFormat>,
    /// Sections to merge; `null` (or blank text) removes a section
    #[serde(default)]
    pub sections: BTreeMap<String, Option<String>>,
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteFilter {
    pub client_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub status: Option<NoteStatus>,
    #[serde(default)]
    pub page: i64,
    pub page_size: Option<i64>,
}

const NOTE_COLUMNS: &str = "id, practice_id, session_id, client_id, author_id, format, content, \
     status, version, ai_generated, finalized_at, finalized_by, created_at, updated_at";

fn validate_sections(format: NoteFormat, content: &NoteContent) -> Result<()> {
    if let Some(unknown) = content.keys().find(|k| !format.has_section(k)) {
        return Err(Error::InvalidInput(format!(
            "Section '{}' is not part of the {} format (expected one of: {})",
            unknown,
            format,
            format.sections().join(", ")
        )));
    }
    Ok(())
}

fn merge_sections(content: &mut NoteContent, sections: BTreeMap<String, Option<String>>) {
    for (key, value) in sections {
        match value.filter(|text| !text.trim().is_empty()) {
            Some(text) => {
                content.insert(key, text);
            }
            None => {
                content.remove(&key);
            }
        }
    }
}

pub async fn create_note(
    pool: &SqlitePool,
    practice_id: Uuid,
    author_id: Option<Uuid>,
    new: NewNote,
) -> Result<SessionNote> {
    let session = get_session(pool, practice_id, new.session_id).await?;
    let format = new.format.unwrap_or(NoteFormat::Soap);

    let mut content = NoteContent::new();
    merge_sections(
        &mut content,
        new.sections.into_iter().map(|(k, v)| (k, Some(v))).collect(),
    );
    validate_sections(format, &content)?;

    let now = now_timestamp();
    let note = SessionNote {
        id: Uuid::new_v4(),
        practice_id,
        session_id: session.id,
        client_id: session.client_id,
        author_id,
        format,
        content,
        status: NoteStatus::Draft,
        version: 1,
        ai_generated: false,
        finalized_at: None,
        finalized_by: None,
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO session_notes (
            id, practice_id, session_id, client_id, author_id, format, content,
            status, version, ai_generated, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?)
        "#,
    )
    .bind(note.id.to_string())
    .bind(practice_id.to_string())
    .bind(note.session_id.to_string())
    .bind(note.client_id.to_string())
    .bind(author_id.map(|id| id.to_string()))
    .bind(format.as_str())
    .bind(serde_json::to_string(&note.content)?)
    .bind(note.status.as_str())
    .bind(&note.created_at)
    .bind(&note.updated_at)
    .execute(pool)
    .await
    .map_err(|e| map_unique_violation(e, "This session already has a note"))?;

    Ok(note)
}

pub async fn get_note(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<SessionNote> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM session_notes WHERE id = ? AND practice_id = ? AND deleted_at IS NULL",
        NOTE_COLUMNS
    ))
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => SessionNote::from_row(&row),
        None => Err(Error::NotFound(format!("Session note {}", id))),
    }
}

pub async fn list_addenda(pool: &SqlitePool, note_id: Uuid) -> Result<Vec<NoteAddendum>> {
    let rows = sqlx::query(
        "SELECT id, note_id, author_id, body, created_at FROM note_addenda \
         WHERE note_id = ? ORDER BY created_at, rowid",
    )
    .bind(note_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(NoteAddendum {
                id: uuid_col(row, "id")?,
                note_id: uuid_col(row, "note_id")?,
                author_id: uuid_col(row, "author_id")?,
                body: row.try_get("body")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

pub async fn get_note_detail(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<NoteDetail> {
    let note = get_note(pool, practice_id, id).await?;
    let addenda = list_addenda(pool, note.id).await?;
    Ok(NoteDetail { note, addenda })
}

fn push_note_filters(qb: &mut QueryBuilder<'_, Sqlite>, practice_id: Uuid, filter: &NoteFilter) {
    qb.push(" WHERE practice_id = ")
        .push_bind(practice_id.to_string())
        .push(" AND deleted_at IS NULL");

    if let Some(client_id) = filter.client_id {
        qb.push(" AND client_id = ").push_bind(client_id.to_string());
    }
    if let Some(session_id) = filter.session_id {
        qb.push(" AND session_id = ").push_bind(session_id.to_string());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
}

/// List notes, most recently updated first
pub async fn list_notes(
    pool: &SqlitePool,
    practice_id: Uuid,
    filter: &NoteFilter,
) -> Result<Page<SessionNote>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM session_notes");
    push_note_filters(&mut count, practice_id, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let p = calculate_pagination(total, filter.page, filter.page_size);

    let mut select =
        QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM session_notes", NOTE_COLUMNS));
    push_note_filters(&mut select, practice_id, filter);
    select
        .push(" ORDER BY updated_at DESC, id LIMIT ")
        .push_bind(p.page_size)
        .push(" OFFSET ")
        .push_bind(p.offset);
    let rows = select.build().fetch_all(pool).await?;

    let items = rows.iter().map(SessionNote::from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, total, p))
}

/// Persist a changed draft, guarding against concurrent writers
///
/// The row is only written if its version is still `expected`.
async fn write_draft(pool: &SqlitePool, note: &SessionNote, expected: i64) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE session_notes SET
            format = ?, content = ?, version = ?, ai_generated = ?, updated_at = ?
        WHERE id = ? AND practice_id = ? AND version = ?
          AND status = 'draft' AND deleted_at IS NULL
        "#,
    )
    .bind(note.format.as_str())
    .bind(serde_json::to_string(&note.content)?)
    .bind(note.version)
    .bind(note.ai_generated)
    .bind(&note.updated_at)
    .bind(note.id.to_string())
    .bind(note.practice_id.to_string())
    .bind(expected)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Conflict(format!(
            "Session note {} was modified concurrently",
            note.id
        )));
    }
    Ok(())
}

/// Merge a save into a draft
///
/// Returns the note and whether it changed. A payload that leaves the note
/// as it is writes nothing and keeps the version.
pub async fn save_note(
    pool: &SqlitePool,
    practice_id: Uuid,
    id: Uuid,
    save: NoteSave,
) -> Result<(SessionNote, bool)> {
    let existing = get_note(pool, practice_id, id).await?;
    existing.ensure_draft()?;

    if let Some(expected) = save.expected_version {
        if expected != existing.version {
            return Err(Error::Conflict(format!(
                "Session note {} is at version {}, not {}",
                id, existing.version, expected
            )));
        }
    }

    let mut note = existing.clone();
    if let Some(format) = save.format {
        note.format = format;
    }
    merge_sections(&mut note.content, save.sections);
    validate_sections(note.format, &note.content)?;

    if note == existing {
        return Ok((existing, false));
    }

    note.version = existing.version + 1;
    note.updated_at = now_timestamp();
    write_draft(pool, &note, existing.version).await?;
    Ok((note, true))
}

/// Write generated text into one section of a draft
pub async fn apply_generated_section(
    pool: &SqlitePool,
    practice_id: Uuid,
    id: Uuid,
    section: &str,
    text: &str,
) -> Result<SessionNote> {
    let existing = get_note(pool, practice_id, id).await?;
    existing.ensure_draft()?;

    let mut note = existing.clone();
    note.content.insert(section.to_string(), text.trim().to_string());
    validate_sections(note.format, &note.content)?;
    note.ai_generated = true;
    note.version = existing.version + 1;
    note.updated_at = now_timestamp();

    write_draft(pool, &note, existing.version).await?;
    Ok(note)
}

/// Lock a draft
///
/// Requires at least one section with text.
pub async fn finalize_note(
    pool: &SqlitePool,
    practice_id: Uuid,
    id: Uuid,
    staff_id: Uuid,
) -> Result<SessionNote> {
    let mut note = get_note(pool, practice_id, id).await?;
    note.ensure_draft()?;

    if note.content.values().all(|text| text.trim().is_empty()) {
        return Err(Error::InvalidInput(
            "Cannot finalize an empty session note".to_string(),
        ));
    }

    let now = now_timestamp();
    note.status = NoteStatus::Finalized;
    note.finalized_at = Some(now.clone());
    note.finalized_by = Some(staff_id);
    note.updated_at = now;

    let result = sqlx::query(
        r#"
        UPDATE session_notes SET status = 'finalized', finalized_at = ?, finalized_by = ?, updated_at = ?
        WHERE id = ? AND practice_id = ? AND version = ? AND status = 'draft' AND deleted_at IS NULL
        "#,
    )
    .bind(&note.finalized_at)
    .bind(staff_id.to_string())
    .bind(&note.updated_at)
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .bind(note.version)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Conflict(format!(
            "Session note {} was modified concurrently",
            id
        )));
    }
    Ok(note)
}

/// Append an addendum to a finalized note
pub async fn add_addendum(
    pool: &SqlitePool,
    practice_id: Uuid,
    note_id: Uuid,
    author_id: Uuid,
    body: &str,
) -> Result<NoteAddendum> {
    let note = get_note(pool, practice_id, note_id).await?;
    if !note.is_locked() {
        return Err(Error::Conflict(
            "Addenda can only be added to finalized notes; edit the draft instead".to_string(),
        ));
    }

    let addendum = NoteAddendum {
        id: Uuid::new_v4(),
        note_id,
        author_id,
        body: required_text("Addendum body", body)?,
        created_at: now_timestamp(),
    };

    sqlx::query(
        "INSERT INTO note_addenda (id, note_id, author_id, body, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(addendum.id.to_string())
    .bind(note_id.to_string())
    .bind(author_id.to_string())
    .bind(&addendum.body)
    .bind(&addendum.created_at)
    .execute(pool)
    .await?;

    Ok(addendum)
}

/// Soft-delete a draft note
pub async fn delete_note(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<()> {
    let note = get_note(pool, practice_id, id).await?;
    note.ensure_draft()?;

    let now = now_timestamp();
    sqlx::query(
        r#"
        UPDATE session_notes SET deleted_at = ?, updated_at = ?
        WHERE id = ? AND practice_id = ? AND status = 'draft' AND deleted_at IS NULL
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(id.to_string())
    .bind(practice_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Header facts printed above an exported note
#[derive(Debug, Clone)]
pub struct ExportHeader {
    pub client_name: String,
    pub session_starts_at: String,
    pub session_type: String,
    pub duration_minutes: i64,
}

fn section_title(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Render a note as plain text
///
/// Sections follow the order of the note format; missing sections are
/// skipped.
pub fn render_note_text(header: &ExportHeader, detail: &NoteDetail) -> String {
    let note = &detail.note;
    let mut out = String::new();

    let _ = writeln!(out, "SESSION NOTE");
    let _ = writeln!(out, "Client: {}", header.client_name);
    let _ = writeln!(
        out,
        "Session: {} ({}, {} min)",
        header.session_starts_at, header.session_type, header.duration_minutes
    );
    let _ = writeln!(out, "Format: {}", note.format.as_str().to_uppercase());
    match &note.finalized_at {
        Some(at) => {
            let _ = writeln!(out, "Status: finalized {}", at);
        }
        None => {
            let _ = writeln!(out, "Status: draft (version {})", note.version);
        }
    }
    if note.ai_generated {
        let _ = writeln!(out, "Contains AI-drafted text");
    }

    for key in note.format.sections() {
        if let Some(text) = note.content.get(*key) {
            let _ = write!(out, "\n{}\n{}\n", section_title(key), text.trim_end());
        }
    }

    if !detail.addenda.is_empty() {
        let _ = writeln!(out, "\nADDENDA");
        for addendum in &detail.addenda {
            let _ = writeln!(out, "[{}] {}", addendum.created_at, addendum.body);
        }
    }

    out
}

/// Load a note with its session and client and render it as text
pub async fn export_note_text(pool: &SqlitePool, practice_id: Uuid, id: Uuid) -> Result<String> {
    let detail = get_note_detail(pool, practice_id, id).await?;
    let session = get_session(pool, practice_id, detail.note.session_id).await?;
    let client = get_client(pool, practice_id, detail.note.client_id).await?;

    let header = ExportHeader {
        client_name: client.display_name(),
        session_starts_at: session.starts_at,
        session_type: session.session_type.to_string(),
        duration_minutes: session.duration_minutes,
    };
    Ok(render_note_text(&header, &detail))
}
