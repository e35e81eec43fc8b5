//! Database schema migrations
//!
//! Tables are created with `CREATE TABLE IF NOT EXISTS` in [`super::init`];
//! anything that changes an existing schema goes here as a numbered,
//! idempotent migration tracked in `schema_version`.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field already ran them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Check before altering** - each migration must be safe to run twice
//! 4. **Use ALTER TABLE** - prefer ALTER TABLE over DROP/CREATE to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Migration v1: lookup indexes for tenant-scoped list queries
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: Add tenant lookup indexes");

    let statements = [
        "CREATE INDEX IF NOT EXISTS idx_clients_practice ON clients(practice_id, last_name, first_name)",
        "CREATE INDEX IF NOT EXISTS idx_sessions_practice_start ON sessions(practice_id, starts_at)",
        "CREATE INDEX IF NOT EXISTS idx_sessions_clinician_start ON sessions(clinician_id, starts_at)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_practice_due ON tasks(practice_id, due_date)",
        "CREATE INDEX IF NOT EXISTS idx_notes_practice_client ON session_notes(practice_id, client_id)",
        "CREATE INDEX IF NOT EXISTS idx_assignments_practice_client ON assessment_assignments(practice_id, client_id)",
        "CREATE INDEX IF NOT EXISTS idx_documents_practice_client ON documents(practice_id, client_id)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_practice ON notifications(practice_id, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_audit_practice_entity ON audit_log(practice_id, entity_type, entity_id)",
    ];

    for sql in statements {
        sqlx::query(sql).execute(pool).await?;
    }

    Ok(())
}

/// Migration v2: portal token lookup by hash
///
/// Portal requests resolve the client from the token hash alone.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: Add portal token index");

    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('clients') WHERE name = 'portal_token_hash'",
    )
    .fetch_one(pool)
    .await?;

    if has_column == 0 {
        sqlx::query("ALTER TABLE clients ADD COLUMN portal_token_hash TEXT")
            .execute(pool)
            .await?;
        info!("  ✓ Added portal_token_hash column to clients table");
    }

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_clients_portal_token ON clients(portal_token_hash) \
         WHERE portal_token_hash IS NOT NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}
