//! Application configuration and data directory resolution.
//!
//! Everything the runner persists lives under one data directory:
//! `config.toml` (optional), the job state file and the transfer log folder.
//! The directory is resolved as: explicit override -> `BACKUP_JOBS_HOME`
//! -> platform data directory.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::registry::DEFAULT_MAX_JOBS;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "BACKUP_JOBS_HOME";

/// Name of the optional configuration file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Settings read from `config.toml`. Relative paths are resolved against the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Job state file
    pub state_file: PathBuf,
    /// Folder holding the daily transfer logs
    pub log_dir: PathBuf,
    /// Maximum number of configured jobs
    pub max_jobs: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            data_dir: PathBuf::new(),
            state_file: PathBuf::from("state.json"),
            log_dir: PathBuf::from("Logs"),
            max_jobs: DEFAULT_MAX_JOBS,
        }
    }
}

impl AppConfig {
    /// Load the configuration for `data_dir`, falling back to defaults when
    /// there is no `config.toml`.
    pub fn load(data_dir: &Path) -> Result<AppConfig, EngineError> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        let mut config = match fs::read_to_string(&path) {
            Ok(text) => toml::from_str::<AppConfig>(&text).map_err(|e| EngineError::ConfigParse {
                path: path.clone(),
                source: e,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(e) => return Err(EngineError::ReadError { path, source: e }),
        };

        if config.max_jobs == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "max_jobs must be at least 1".to_string(),
            });
        }

        config.data_dir = data_dir.to_path_buf();
        config.state_file = data_dir.join(&config.state_file);
        config.log_dir = data_dir.join(&config.log_dir);
        Ok(config)
    }

    /// Resolve the data directory and load the configuration found there.
    pub fn discover(override_dir: Option<&Path>) -> Result<AppConfig, EngineError> {
        let env_dir = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
        let dir = resolve_data_dir(override_dir, env_dir.as_deref())?;
        tracing::debug!("using data directory {}", dir.display());
        AppConfig::load(&dir)
    }
}

/// Priority: explicit override -> environment value -> platform default.
pub fn resolve_data_dir(override_dir: Option<&Path>, env_dir: Option<&Path>) -> Result<PathBuf, EngineError> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = env_dir.filter(|d| !d.as_os_str().is_empty()) {
        return Ok(dir.to_path_buf());
    }
    ProjectDirs::from("com", "BackUP", "backup-jobs")
        .map(|proj| proj.data_dir().to_path_buf())
        .ok_or(EngineError::NoDataDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_config_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = AppConfig::load(temp_dir.path()).expect("Failed to load config");

        assert_eq!(config.state_file, temp_dir.path().join("state.json"));
        assert_eq!(config.log_dir, temp_dir.path().join("Logs"));
        assert_eq!(config.max_jobs, DEFAULT_MAX_JOBS);
    }

    #[test]
    fn test_config_file_overrides() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "max_jobs = 12\nlog_dir = \"transfer-logs\"\n",
        )
        .expect("Failed to write config");

        let config = AppConfig::load(temp_dir.path()).expect("Failed to load config");
        assert_eq!(config.max_jobs, 12);
        assert_eq!(config.log_dir, temp_dir.path().join("transfer-logs"));
        assert_eq!(config.state_file, temp_dir.path().join("state.json"));
    }

    #[test]
    fn test_bad_config_is_reported() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "max_jobs = \"many\"").expect("Failed to write config");
        assert!(matches!(AppConfig::load(temp_dir.path()), Err(EngineError::ConfigParse { .. })));

        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "max_jobs = 0").expect("Failed to write config");
        assert!(matches!(AppConfig::load(temp_dir.path()), Err(EngineError::InvalidConfig { .. })));
    }

    #[test]
    fn test_data_dir_priority() {
        let explicit = Path::new("/explicit");
        let env = Path::new("/from-env");
        assert_eq!(resolve_data_dir(Some(explicit), Some(env)).unwrap(), explicit);
        assert_eq!(resolve_data_dir(None, Some(env)).unwrap(), env);
    }
}
