//! Database initialization
//!
//! Creates the database on first run, applies the schema idempotently,
//! runs versioned migrations and ensures default settings and help guides.

use crate::db::settings::init_default_settings;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // WAL allows concurrent readers with one writer
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    Ok(pool)
}

/// Initialize a private in-memory database (tests and tooling)
///
/// Limited to one connection that is never recycled: every SQLite
/// `:memory:` connection is its own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables, run migrations, and ensure defaults
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;

    // Tenancy
    create_practices_table(pool).await?;
    create_staff_table(pool).await?;

    // Clinical records
    create_clients_table(pool).await?;
    create_sessions_table(pool).await?;
    create_tasks_table(pool).await?;
    create_session_notes_table(pool).await?;
    create_note_addenda_table(pool).await?;

    // Assessments
    create_assessment_templates_table(pool).await?;
    create_assessment_sections_table(pool).await?;
    create_assessment_questions_table(pool).await?;
    create_assessment_assignments_table(pool).await?;
    create_assessment_responses_table(pool).await?;

    // Supporting records
    create_documents_table(pool).await?;
    create_notifications_table(pool).await?;
    create_audit_log_table(pool).await?;
    create_help_guides_table(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;

    init_default_settings(pool).await?;
    init_default_help_guides(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_practices_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS practices (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            shared_secret INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_staff_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS staff (
            id TEXT PRIMARY KEY,
            practice_id TEXT NOT NULL REFERENCES practices(id),
            display_name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('owner', 'clinician', 'assistant')),
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (practice_id, email)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_clients_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clients (
            id TEXT PRIMARY KEY,
            practice_id TEXT NOT NULL REFERENCES practices(id),
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            preferred_name TEXT,
            email TEXT,
            phone TEXT,
            date_of_birth TEXT,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'inactive', 'discharged')),
            portal_access INTEGER NOT NULL DEFAULT 0,
            portal_token_hash TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            practice_id TEXT NOT NULL REFERENCES practices(id),
            client_id TEXT NOT NULL REFERENCES clients(id),
            clinician_id TEXT REFERENCES staff(id),
            starts_at TEXT NOT NULL,
            ends_at TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
            session_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'scheduled'
                CHECK (status IN ('scheduled', 'completed', 'cancelled', 'no_show')),
            location TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tasks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            practice_id TEXT NOT NULL REFERENCES practices(id),
            title TEXT NOT NULL,
            description TEXT,
            client_id TEXT REFERENCES clients(id),
            assignee_id TEXT REFERENCES staff(id),
            due_date TEXT,
            priority TEXT NOT NULL DEFAULT 'normal'
                CHECK (priority IN ('low', 'normal', 'high')),
            completed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_session_notes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_notes (
            id TEXT PRIMARY KEY,
            practice_id TEXT NOT NULL REFERENCES practices(id),
            session_id TEXT NOT NULL REFERENCES sessions(id),
            client_id TEXT NOT NULL REFERENCES clients(id),
            author_id TEXT REFERENCES staff(id),
            format TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'finalized')),
            version INTEGER NOT NULL DEFAULT 1,
            ai_generated INTEGER NOT NULL DEFAULT 0,
            finalized_at TEXT,
            finalized_by TEXT REFERENCES staff(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One live note per session
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_session_notes_live_session
        ON session_notes(session_id) WHERE deleted_at IS NULL
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_note_addenda_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS note_addenda (
            id TEXT PRIMARY KEY,
            note_id TEXT NOT NULL REFERENCES session_notes(id),
            author_id TEXT NOT NULL REFERENCES staff(id),
            body TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_assessment_templates_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessment_templates (
            id TEXT PRIMARY KEY,
            practice_id TEXT NOT NULL REFERENCES practices(id),
            name TEXT NOT NULL,
            description TEXT,
            archived_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_assessment_sections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessment_sections (
            id TEXT PRIMARY KEY,
            template_id TEXT NOT NULL REFERENCES assessment_templates(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            position INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_assessment_questions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessment_questions (
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL REFERENCES assessment_sections(id) ON DELETE CASCADE,
            template_id TEXT NOT NULL REFERENCES assessment_templates(id) ON DELETE CASCADE,
            prompt TEXT NOT NULL,
            kind TEXT NOT NULL
                CHECK (kind IN ('text', 'single_choice', 'multi_choice', 'scale', 'yes_no')),
            options TEXT NOT NULL DEFAULT '[]',
            scale_min INTEGER,
            scale_max INTEGER,
            required INTEGER NOT NULL DEFAULT 0,
            position INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_assessment_assignments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessment_assignments (
            id TEXT PRIMARY KEY,
            practice_id TEXT NOT NULL REFERENCES practices(id),
            client_id TEXT NOT NULL REFERENCES clients(id),
            template_id TEXT NOT NULL REFERENCES assessment_templates(id),
            status TEXT NOT NULL DEFAULT 'assigned'
                CHECK (status IN ('assigned', 'in_progress', 'completed')),
            due_date TEXT,
            score INTEGER,
            assigned_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            deleted_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_assessment_responses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessment_responses (
            assignment_id TEXT NOT NULL REFERENCES assessment_assignments(id),
            question_id TEXT NOT NULL REFERENCES assessment_questions(id),
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (assignment_id, question_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_documents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            practice_id TEXT NOT NULL REFERENCES practices(id),
            client_id TEXT REFERENCES clients(id),
            filename TEXT NOT NULL,
            content_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            storage_key TEXT NOT NULL,
            uploaded_by TEXT REFERENCES staff(id),
            created_at TEXT NOT NULL,
            deleted_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_notifications_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            practice_id TEXT NOT NULL REFERENCES practices(id),
            recipient_id TEXT REFERENCES staff(id),
            kind TEXT NOT NULL,
            message TEXT NOT NULL,
            entity_type TEXT,
            entity_id TEXT,
            read_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_audit_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id TEXT PRIMARY KEY,
            practice_id TEXT NOT NULL REFERENCES practices(id),
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_help_guides_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS help_guides (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            body TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0,
            published INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Built-in help center articles: (slug, title, category, position, body)
const DEFAULT_HELP_GUIDES: &[(&str, &str, &str, i64, &str)] = &[
    (
        "getting-started",
        "Getting started",
        "basics",
        0,
        "Add your staff, then create client records. Every client, session, note and \
         document belongs to your practice and is never visible to other practices.",
    ),
    (
        "scheduling-sessions",
        "Scheduling sessions",
        "scheduling",
        10,
        "Sessions are booked for a client and, optionally, a clinician. A clinician \
         cannot be double-booked: overlapping sessions are rejected. Completed, \
         cancelled and no-show sessions can no longer be changed.",
    ),
    (
        "session-notes",
        "Writing session notes",
        "documentation",
        20,
        "Each session has one note. Drafts save automatically every 30 seconds. \
         Once you finalize a note it is locked; add an addendum to record later \
         information.",
    ),
    (
        "assessments",
        "Assigning assessments",
        "assessments",
        30,
        "Build a questionnaire template from sections and questions, then assign it \
         to a client. Answers save as they are entered and the assessment can be \
         completed once every required question has an answer.",
    ),
    (
        "client-portal",
        "Client portal access",
        "portal",
        40,
        "Turn on portal access for a client to give them a personal link for \
         completing assigned assessments. Turning it off revokes the link \
         immediately; turning it on again issues a new one.",
    ),
];

/// Seed built-in help guides without overwriting edited copies
async fn init_default_help_guides(pool: &SqlitePool) -> Result<()> {
    let now = crate::time::now_timestamp();
    let mut inserted = 0u64;

    for (slug, title, category, position, body) in DEFAULT_HELP_GUIDES {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO help_guides
                (id, slug, title, category, body, position, published, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(slug)
        .bind(title)
        .bind(category)
        .bind(body)
        .bind(position)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }

    if inserted > 0 {
        info!("Seeded {} built-in help guides", inserted);
    }
    Ok(())
}
