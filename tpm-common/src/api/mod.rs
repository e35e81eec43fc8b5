//! Shared HTTP API functionality
//!
//! Pure request-signing and token helpers. Framework-specific middleware
//! lives in `tpm-server`.

pub mod auth;

pub use auth::{
    body_digest, calculate_hash, generate_portal_token, generate_shared_secret, hash_token,
    sign_request, signing_envelope, to_canonical_json, validate_hash, validate_timestamp,
    ApiAuthError, MAX_FUTURE_SKEW_MS,
};
