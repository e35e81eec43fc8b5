//! Data access for tpm-server
//!
//! Every query on tenant-owned tables is scoped by `practice_id`, and rows
//! with `deleted_at` set are invisible. Lifecycle rules (locking, overlap,
//! validation) are enforced here so every API surface shares them.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tpm_common::{Error, Result};
use uuid::Uuid;

/// Declare a string-backed enum persisted as TEXT and exchanged as JSON
macro_rules! db_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Parse a value read back from the database
            pub fn from_db(s: &str) -> tpm_common::Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(tpm_common::Error::Internal(format!(
                        "Unknown {} value in database: '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub mod assignments;
pub mod audit;
pub mod clients;
pub mod documents;
pub mod help_guides;
pub mod notes;
pub mod notifications;
pub mod practices;
pub mod sessions;
pub mod staff;
pub mod tasks;
pub mod templates;

/// Read a TEXT uuid column
pub(crate) fn uuid_col(row: &SqliteRow, col: &str) -> Result<Uuid> {
    let raw: String = row.try_get(col)?;
    Ok(Uuid::parse_str(&raw)?)
}

/// Read a nullable TEXT uuid column
pub(crate) fn opt_uuid_col(row: &SqliteRow, col: &str) -> Result<Option<Uuid>> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| Uuid::parse_str(&s)).transpose().map_err(Error::from)
}

/// Trim a required text field, rejecting blanks
pub(crate) fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional text field; blank becomes `None`
pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Minimal email sanity check
pub(crate) fn validate_email(email: &str) -> Result<String> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            Ok(email.to_string())
        }
        _ => Err(Error::InvalidInput(format!("Invalid email address: '{}'", email))),
    }
}

/// Map a unique-constraint violation to a conflict
pub(crate) fn map_unique_violation(err: sqlx::Error, message: &str) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::Conflict(message.to_string())
        }
        _ => Error::Database(err),
    }
}

/// Escape `%`, `_` and `\` for a LIKE pattern used with `ESCAPE '\'`
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped.to_lowercase())
}

/// Deserialize helper distinguishing an absent field from an explicit `null`
///
/// Use with `#[serde(default, deserialize_with = "crate::db::nullable")]`
/// on `Option<Option<T>>` fields: absent → `None`, `null` → `Some(None)`.
pub fn nullable<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    <Option<T> as serde::Deserialize>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text_trims() {
        assert_eq!(required_text("name", "  Ada ").unwrap(), "Ada");
        assert!(matches!(required_text("name", "   "), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email(" ada@example.com ").unwrap(), "ada@example.com");
        assert!(validate_email("ada").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ada@").is_err());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_Off"), "%50\\%\\_off%");
    }

    #[derive(serde::Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "crate::db::nullable")]
        phone: Option<Option<String>>,
    }

    #[test]
    fn test_nullable_distinguishes_absent_and_null() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.phone, None);

        let null: Patch = serde_json::from_str(r#"{"phone": null}"#).unwrap();
        assert_eq!(null.phone, Some(None));

        let set: Patch = serde_json::from_str(r#"{"phone": "555"}"#).unwrap();
        assert_eq!(set.phone, Some(Some("555".to_string())));
    }
}
