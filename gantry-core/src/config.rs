//! Configuration loading and database path resolution

use std::path::PathBuf;

use crate::{Error, Result};

/// Resolve the migration database path, in priority order:
/// 1. Explicit argument from the host (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`database_path` key)
/// 4. OS-dependent default (fallback)
pub fn resolve_database_path(explicit: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(path) = config.get("database_path").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Ok(default_database_path())
}

/// Locate the gantry config file for the platform.
fn find_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // ~/.config/gantry/config.toml first, then /etc/gantry/config.toml
        if let Some(path) = dirs::config_dir().map(|d| d.join("gantry").join("config.toml")) {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/gantry/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else {
        let path = dirs::config_dir()
            .map(|d| d.join("gantry").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    }
}

/// OS-dependent default database location.
fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gantry")
        .join("gantry.db")
}
