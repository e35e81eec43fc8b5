//! Request signing via timestamp and hash validation
//!
//! Every tenant request carries a practice id, a timestamp (Unix epoch ms)
//! and a SHA-256 hash. The hash covers a small canonical JSON envelope:
//!
//! ```text
//! {"body_sha256":"<hex>","method":"POST","path":"/api/clients?x=1","timestamp":1730000000000}
//! ```
//!
//! followed by the practice's shared secret as a decimal string. A secret of
//! `0` disables checking for that practice.

use rand::Rng;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Tolerated clock skew for timestamps from the future
pub const MAX_FUTURE_SKEW_MS: i64 = 1000;

/// Authentication error types
#[derive(Debug, Clone)]
pub enum ApiAuthError {
    /// Timestamp outside acceptable window
    InvalidTimestamp {
        timestamp: i64,
        now: i64,
        reason: String,
    },

    /// Hash does not match calculated value
    InvalidHash { provided: String, calculated: String },

    /// Required header missing from request
    MissingHeader(&'static str),

    /// Header present but malformed
    MalformedHeader(&'static str),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::InvalidTimestamp { reason, .. } => {
                write!(f, "Invalid timestamp: {}", reason)
            }
            ApiAuthError::InvalidHash { .. } => write!(f, "Invalid hash"),
            ApiAuthError::MissingHeader(name) => write!(f, "Missing {} header", name),
            ApiAuthError::MalformedHeader(name) => write!(f, "Malformed {} header", name),
        }
    }
}

impl std::error::Error for ApiAuthError {}

// ========================================
// Secrets and tokens
// ========================================

/// Generate a random non-zero shared secret for a new practice
pub fn generate_shared_secret() -> i64 {
    let mut rng = rand::thread_rng();
    loop {
        let val = rng.gen::<i64>();
        if val != 0 {
            break val;
        }
    }
}

/// Generate a portal bearer token (64 hex chars)
pub fn generate_portal_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    to_hex(&bytes)
}

/// Hash a bearer token for storage
///
/// Only the hash is persisted; the token itself is shown once.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ========================================
// Timestamp Validation
// ========================================

/// Validate a request timestamp against `now`
///
/// Accepts timestamps at most `max_past_ms` old and at most
/// [`MAX_FUTURE_SKEW_MS`] ahead.
///
/// # Examples
///
/// ```
/// use tpm_common::api::auth::validate_timestamp;
///
/// let now = 1_730_000_000_000;
/// assert!(validate_timestamp(now - 500, now, 30_000).is_ok());
/// assert!(validate_timestamp(now - 31_000, now, 30_000).is_err());
/// assert!(validate_timestamp(now + 5_000, now, 30_000).is_err());
/// ```
pub fn validate_timestamp(timestamp: i64, now: i64, max_past_ms: i64) -> Result<(), ApiAuthError> {
    let Some(diff) = now.checked_sub(timestamp) else {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {} out of range", timestamp),
        });
    };

    if diff > max_past_ms {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {}ms too old (max {}ms past)", diff, max_past_ms),
        });
    }

    if diff < -MAX_FUTURE_SKEW_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms in future (max {}ms future)",
                diff.unsigned_abs(),
                MAX_FUTURE_SKEW_MS
            ),
        });
    }

    Ok(())
}

// ========================================
// Hash Calculation and Validation
// ========================================

/// SHA-256 of a request body as 64 hex characters
pub fn body_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}

/// Build the JSON envelope covered by the request hash
pub fn signing_envelope(method: &str, path: &str, timestamp: i64, body_sha256: &str) -> Value {
    json!({
        "body_sha256": body_sha256,
        "method": method.to_ascii_uppercase(),
        "path": path,
        "timestamp": timestamp,
    })
}

/// Calculate hash of an envelope
///
/// 1. Convert to canonical JSON (sorted keys, no whitespace)
/// 2. Append shared secret as decimal i64 string
/// 3. SHA-256, rendered as 64 hex characters
pub fn calculate_hash(envelope: &Value, shared_secret: i64) -> String {
    let canonical = to_canonical_json(envelope);
    let to_hash = format!("{}{}", canonical, shared_secret);

    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compute the `x-hash` value a client must send
///
/// # Examples
///
/// ```
/// use tpm_common::api::auth::{body_digest, signing_envelope, sign_request, validate_hash};
///
/// let body = br#"{"first_name":"Ada"}"#;
/// let hash = sign_request("POST", "/api/clients", 1_730_000_000_000, body, 42);
/// let envelope = signing_envelope("POST", "/api/clients", 1_730_000_000_000, &body_digest(body));
/// assert!(validate_hash(&hash, &envelope, 42).is_ok());
/// ```
pub fn sign_request(method: &str, path: &str, timestamp: i64, body: &[u8], shared_secret: i64) -> String {
    let envelope = signing_envelope(method, path, timestamp, &body_digest(body));
    calculate_hash(&envelope, shared_secret)
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
///
/// # Examples
///
/// ```
/// use tpm_common::api::auth::to_canonical_json;
/// use serde_json::json;
///
/// let canonical = to_canonical_json(&json!({"z": 3, "a": 1, "m": 2}));
/// assert_eq!(canonical, r#"{"a":1,"m":2,"z":3}"#);
/// ```
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        // serde_json's Display escapes strings exactly like JSON
        other => other.to_string(),
    }
}

/// Validate hash matches calculated value
pub fn validate_hash(
    provided_hash: &str,
    envelope: &Value,
    shared_secret: i64,
) -> Result<(), ApiAuthError> {
    let calculated = calculate_hash(envelope, shared_secret);

    if !provided_hash.eq_ignore_ascii_case(&calculated) {
        return Err(ApiAuthError::InvalidHash {
            provided: provided_hash.to_string(),
            calculated,
        });
    }

    Ok(())
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_730_000_000_000;

    #[test]
    fn test_valid_timestamp_accepted() {
        assert!(validate_timestamp(NOW, NOW, 30_000).is_ok());
        assert!(validate_timestamp(NOW - 29_999, NOW, 30_000).is_ok());
        // boundary
        assert!(validate_timestamp(NOW - 30_000, NOW, 30_000).is_ok());
        assert!(validate_timestamp(NOW + MAX_FUTURE_SKEW_MS, NOW, 30_000).is_ok());
    }

    #[test]
    fn test_timestamp_too_old_rejected() {
        assert!(validate_timestamp(NOW - 30_001, NOW, 30_000).is_err());
    }

    #[test]
    fn test_timestamp_future_rejected() {
        let err = validate_timestamp(NOW + MAX_FUTURE_SKEW_MS + 1, NOW, 30_000).unwrap_err();
        assert!(err.to_string().contains("in future"));
    }

    #[test]
    fn test_extreme_timestamps_rejected() {
        for timestamp in [i64::MIN, i64::MIN + 1, i64::MAX, 0] {
            assert!(
                matches!(
                    validate_timestamp(timestamp, NOW, 30_000),
                    Err(ApiAuthError::InvalidTimestamp { .. })
                ),
                "timestamp {} should be rejected",
                timestamp
            );
        }
        assert!(validate_timestamp(i64::MIN, i64::MIN, 30_000).is_ok());
    }

    #[test]
    fn test_hash_depends_on_every_envelope_field() {
        let base = sign_request("POST", "/api/clients", NOW, b"{}", 7);
        assert_eq!(base.len(), 64);
        assert!(base.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(base, sign_request("post", "/api/clients", NOW, b"{}", 7));
        assert_ne!(base, sign_request("PATCH", "/api/clients", NOW, b"{}", 7));
        assert_ne!(base, sign_request("POST", "/api/tasks", NOW, b"{}", 7));
        assert_ne!(base, sign_request("POST", "/api/clients", NOW + 1, b"{}", 7));
        assert_ne!(base, sign_request("POST", "/api/clients", NOW, b"{ }", 7));
        assert_ne!(base, sign_request("POST", "/api/clients", NOW, b"{}", 8));
    }

    #[test]
    fn test_invalid_hash_rejected() {
        let envelope = signing_envelope("GET", "/api/clients", NOW, &body_digest(b""));
        let wrong = "0000000000000000000000000000000000000000000000000000000000000000";
        assert!(matches!(
            validate_hash(wrong, &envelope, 99),
            Err(ApiAuthError::InvalidHash { .. })
        ));
    }

    #[test]
    fn test_canonical_json_escapes_strings() {
        let canonical = to_canonical_json(&json!({"b": "say \"hi\"\n", "a": [true, null]}));
        assert_eq!(canonical, r#"{"a":[true,null],"b":"say \"hi\"\n"}"#);
    }

    #[test]
    fn test_portal_tokens_are_unique_and_hashable() {
        let a = generate_portal_token();
        let b = generate_portal_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(hash_token(&a), hash_token(&a));
        assert_ne!(hash_token(&a), hash_token(&b));
    }

    #[test]
    fn test_shared_secret_is_non_zero() {
        for _ in 0..100 {
            assert_ne!(generate_shared_secret(), 0);
        }
    }
}
