//! Tests for database initialization, migrations and default settings

use tpm_common::db::init::{init_database, init_memory_database};
use tpm_common::db::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};
use tpm_common::db::settings::{get_setting_i64, set_setting, SettingKey};

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("tpm.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing_and_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tpm.db");

    let pool = init_database(&db_path).await.unwrap();
    set_setting(&pool, SettingKey::AutosaveIntervalSecs, 45)
        .await
        .unwrap();
    pool.close().await;

    // Second start must not reset edited settings
    let pool = init_database(&db_path).await.unwrap();
    let value = get_setting_i64(&pool, SettingKey::AutosaveIntervalSecs)
        .await
        .unwrap();
    assert_eq!(value, 45);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let pool = init_memory_database().await.unwrap();

    for key in SettingKey::ALL {
        let value = get_setting_i64(&pool, key).await.unwrap();
        assert_eq!(value, key.default_value(), "{}", key.key());
    }
}

#[tokio::test]
async fn test_null_setting_reset_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tpm.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'max_document_bytes'")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let raw: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'max_document_bytes'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(raw.as_deref(), Some("26214400"));
}

#[tokio::test]
async fn test_migrations_reach_current_version() {
    let pool = init_memory_database().await.unwrap();
    let version = get_schema_version(&pool).await.unwrap();
    assert_eq!(version, CURRENT_SCHEMA_VERSION);

    // Running again is a no-op
    tpm_common::db::run_migrations(&pool).await.unwrap();
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, CURRENT_SCHEMA_VERSION as i64);
}

#[tokio::test]
async fn test_help_guides_seeded_once() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tpm.db");

    let pool = init_database(&db_path).await.unwrap();
    let first: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM help_guides")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(first >= 5);
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let second: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM help_guides")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let pool = init_memory_database().await.unwrap();

    let result = sqlx::query(
        "INSERT INTO staff (id, practice_id, display_name, email, role, created_at, updated_at) \
         VALUES ('s1', 'no-such-practice', 'Dr. X', 'x@example.com', 'clinician', 'now', 'now')",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "Insert referencing a missing practice must fail");
}
