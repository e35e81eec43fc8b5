//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "TPM_ROOT";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "tpm.db";

/// Blob directory name inside the root folder
pub const BLOB_DIR: &str = "blobs";

/// Server configuration read from the TOML config file
///
/// Every field has a default so an absent or partial file is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Root folder holding the database and blobs
    pub root_folder: Option<PathBuf>,
    /// Listen address
    pub bind: String,
    /// Listen port
    pub port: u16,
    /// Token required by `/api/admin/*`; admin routes are disabled when unset
    pub admin_token: Option<String>,
    /// Optional LLM endpoint for session note drafting
    pub llm: Option<LlmConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind: "127.0.0.1".to_string(),
            port: 5780,
            admin_token: None,
            llm: None,
        }
    }
}

/// OpenAI-compatible chat completion endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Full URL of the `/v1/chat/completions` endpoint
    pub api_base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key (keyless when unset)
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    /// Resolve the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Load server configuration
///
/// An explicit path must exist. Without one, the platform config file is
/// used when present, otherwise defaults apply.
pub fn load_server_config(explicit: Option<&Path>) -> Result<ServerConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_file() {
            Some(path) if path.exists() => path,
            _ => return Ok(ServerConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)?;
    parse_server_config(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Parse configuration from TOML text
pub fn parse_server_config(content: &str) -> Result<ServerConfig> {
    toml::from_str::<ServerConfig>(content).map_err(|e| Error::Config(e.to_string()))
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config: &ServerConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// Platform config file location (`~/.config/tpm/config.toml` on Linux)
fn default_config_file() -> Option<PathBuf> {
    if cfg!(target_os = "linux") {
        let user_config = dirs::config_dir().map(|d| d.join("tpm").join("config.toml"));
        match user_config {
            Some(path) if path.exists() => Some(path),
            _ => Some(PathBuf::from("/etc/tpm/config.toml")),
        }
    } else {
        dirs::config_dir().map(|d| d.join("tpm").join("config.toml"))
    }
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/tpm (or /var/lib/tpm for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("tpm"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/tpm"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("tpm"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/tpm"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("tpm"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\tpm"))
    } else {
        PathBuf::from("./tpm_data")
    }
}

/// Resolved root folder and the paths derived from it
#[derive(Debug, Clone)]
pub struct RootFolder {
    path: PathBuf,
}

impl RootFolder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the root folder and blob directory if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.path)?;
        std::fs::create_dir_all(self.blob_path())?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn database_path(&self) -> PathBuf {
        self.path.join(DATABASE_FILE)
    }

    pub fn blob_path(&self) -> PathBuf {
        self.path.join(BLOB_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_empty() {
        let config = parse_server_config("").unwrap();
        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.port, 5780);
        assert!(config.admin_token.is_none());
        assert!(config.llm.is_none());
    }

    #[test]
    fn test_llm_section_defaults() {
        let config = parse_server_config(
            r#"
            port = 8080
            [llm]
            api_base_url = "http://localhost:11434/v1/chat/completions"
            model = "llama3"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        let llm = config.llm.unwrap();
        assert_eq!(llm.model, "llama3");
        assert_eq!(llm.timeout_secs, 60);
        assert!(llm.api_key().is_none());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(
            parse_server_config("port = \"not a number\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_cli_argument_wins() {
        let config = ServerConfig {
            root_folder: Some(PathBuf::from("/from/config")),
            ..ServerConfig::default()
        };
        let resolved = resolve_root_folder(
            Some(Path::new("/from/cli")),
            "TPM_TEST_UNSET_VARIABLE",
            &config,
        );
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_config_file_used_without_cli_or_env() {
        let config = ServerConfig {
            root_folder: Some(PathBuf::from("/from/config")),
            ..ServerConfig::default()
        };
        let resolved = resolve_root_folder(None, "TPM_TEST_UNSET_VARIABLE", &config);
        assert_eq!(resolved, PathBuf::from("/from/config"));
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let result = load_server_config(Some(Path::new("/nonexistent/tpm/config.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_root_folder_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = RootFolder::new(dir.path().join("practice-data"));
        root.ensure_directory_exists().unwrap();
        assert!(root.blob_path().is_dir());
        assert_eq!(root.database_path(), dir.path().join("practice-data").join("tpm.db"));
    }
}
