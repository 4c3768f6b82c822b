//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "PLX_ROOT_FOLDER";

/// Engine configuration file name inside the root folder
pub const ENGINE_CONFIG_FILE: &str = "plx.toml";

/// Engine configuration
///
/// Loaded from `<root>/plx.toml` when present. Missing keys take the
/// compiled defaults below; the database `settings` table may override the
/// timing values at startup.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database file. Relative paths are resolved against the root folder.
    pub database_path: PathBuf,
    /// Upper bound for one on-demand integration fetch
    pub fetch_timeout_ms: u64,
    /// Total time a mutation may spend retrying on "database is locked"
    pub db_max_lock_wait_ms: u64,
    /// Maximum nesting of playlists inside layouts while rendering
    pub max_render_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("plx.db"),
            fetch_timeout_ms: 5000,
            db_max_lock_wait_ms: 5000,
            max_render_depth: 16,
        }
    }
}

impl EngineConfig {
    /// Load configuration for the given root folder
    ///
    /// A missing file yields defaults; an unreadable or malformed file is an error.
    pub fn load(root_folder: &Path) -> Result<Self> {
        let path = root_folder.join(ENGINE_CONFIG_FILE);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_toml_str(&content)?
        } else {
            Self::default()
        };

        if config.database_path.is_relative() {
            config.database_path = root_folder.join(&config.database_path);
        }
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid {}: {}", ENGINE_CONFIG_FILE, e)))?;

        if config.fetch_timeout_ms == 0 {
            return Err(Error::Config("fetch_timeout_ms must be greater than zero".to_string()));
        }
        if config.max_render_depth == 0 {
            return Err(Error::Config("max_render_depth must be greater than zero".to_string()));
        }
        Ok(config)
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config_file_key: Option<&str>,
) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Some(key) = config_file_key {
        if let Ok(config_path) = locate_config_file() {
            if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
                if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                    if let Some(root_folder) = config.get(key).and_then(|v| v.as_str()) {
                        return Ok(PathBuf::from(root_folder));
                    }
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_root_folder())
}

/// Get the user or system configuration file path for the platform
fn locate_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("plx").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/plx/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("plx"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/plx"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("plx"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/plx"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("plx"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\plx"))
    } else {
        PathBuf::from("./plx_data")
    }
}
