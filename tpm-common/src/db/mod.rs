//! Database initialization, migrations and settings

pub mod init;
pub mod migrations;
pub mod settings;

pub use init::{create_schema, init_database, init_memory_database};
pub use migrations::run_migrations;
pub use settings::{get_setting, get_setting_i64, set_setting, SettingKey};
