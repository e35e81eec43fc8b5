//! Runtime settings stored in the `settings` table

use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Settings with compiled-in defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    /// Browser auto-save interval for drafts
    AutosaveIntervalSecs,
    /// Debounce window for batching assessment responses in the browser
    ResponseBatchWindowMs,
    /// Maximum age of a signed request timestamp
    AuthTimestampWindowMs,
    /// Upload size limit for documents
    MaxDocumentBytes,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::AutosaveIntervalSecs,
        SettingKey::ResponseBatchWindowMs,
        SettingKey::AuthTimestampWindowMs,
        SettingKey::MaxDocumentBytes,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SettingKey::AutosaveIntervalSecs => "autosave_interval_secs",
            SettingKey::ResponseBatchWindowMs => "response_batch_window_ms",
            SettingKey::AuthTimestampWindowMs => "auth_timestamp_window_ms",
            SettingKey::MaxDocumentBytes => "max_document_bytes",
        }
    }

    pub fn default_value(self) -> i64 {
        match self {
            SettingKey::AutosaveIntervalSecs => 30,
            SettingKey::ResponseBatchWindowMs => 1000,
            SettingKey::AuthTimestampWindowMs => 30_000,
            SettingKey::MaxDocumentBytes => 25 * 1024 * 1024,
        }
    }
}

/// Initialize or repair default settings
pub(crate) async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    for key in SettingKey::ALL {
        ensure_setting(pool, key.key(), &key.default_value().to_string()).await?;
    }
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match value {
        None => {
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

/// Read a raw setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.flatten())
}

/// Read an integer setting, falling back to its default when missing or unparsable
pub async fn get_setting_i64(pool: &SqlitePool, key: SettingKey) -> Result<i64> {
    match get_setting(pool, key.key()).await? {
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!(
                    "Setting '{}' has non-integer value '{}', using default {}",
                    key.key(),
                    raw,
                    key.default_value()
                );
                Ok(key.default_value())
            }
        },
        None => Ok(key.default_value()),
    }
}

/// Write an integer setting
pub async fn set_setting(pool: &SqlitePool, key: SettingKey, value: i64) -> Result<()> {
    if value < 0 {
        return Err(Error::InvalidInput(format!(
            "Setting '{}' must not be negative",
            key.key()
        )));
    }
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key.key())
    .bind(value.to_string())
    .execute(pool)
    .await?;
    Ok(())
}
