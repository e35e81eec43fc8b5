//! # TPM Common Library
//!
//! Shared code for the therapy practice manager services:
//! - Database initialization, migrations and settings
//! - Request signing helpers
//! - Configuration loading and root folder resolution
//! - Event bus and SSE helpers
//! - Pagination and timestamp utilities

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod pagination;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, PracticeEvent};
pub use pagination::{calculate_pagination, Page, Pagination};
