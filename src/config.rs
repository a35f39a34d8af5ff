//! Configuration management for flamingo
//!
//! Stores settings in ~/.config/flamingo-review/config.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const BACKEND_URL_ENV: &str = "FLAMINGO_BACKEND_URL";
const USER_ID_ENV: &str = "FLAMINGO_USER_ID";

/// How detailed explanations should be; also the level tag sent with feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl ExplanationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplanationLevel::Beginner => "beginner",
            ExplanationLevel::Intermediate => "intermediate",
            ExplanationLevel::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_url: String,
    /// Anonymous identity sent with explanation, fix and feedback requests
    pub user_id: Option<String>,
    pub explanation_level: ExplanationLevel,
    /// Quiet period after the last edit before re-analysis runs
    pub reanalysis_quiet_ms: u64,
    /// How long a feedback "thanks" stays visible
    pub feedback_reset_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            user_id: None,
            explanation_level: ExplanationLevel::default(),
            reanalysis_quiet_ms: 500,
            feedback_reset_ms: 2000,
            request_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("flamingo-review"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path. A corrupt file is moved aside to
    /// `config.json.corrupt` and defaults are returned.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                log::warn!(
                    "Config file {} was corrupted ({}). A backup was saved and defaults were loaded.",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Save config to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Invalid config path: {}", path.display()))?;
        fs::create_dir_all(dir)
            .map_err(|e| anyhow::anyhow!("Failed to create config directory: {}", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                log::warn!("Failed to set config directory permissions: {}", e);
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        write_config_atomic(path, &content)
            .map_err(|e| anyhow::anyhow!("Failed to write config: {}", e))
    }

    /// Backend base URL (environment takes precedence)
    pub fn backend_url(&self) -> String {
        std::env::var(BACKEND_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.backend_url.clone())
    }

    /// User identity from the environment or the config file, if any
    pub fn user_id(&self) -> Option<String> {
        std::env::var(USER_ID_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.user_id.clone())
    }

    /// Return the user id, generating and persisting an anonymous one on
    /// first use. Persisting is best-effort.
    pub fn ensure_user_id(&mut self) -> String {
        if let Some(id) = self.user_id() {
            return id;
        }
        let id = format!("anon-{}", uuid::Uuid::new_v4());
        self.user_id = Some(id.clone());
        if let Err(err) = self.save() {
            log::warn!("Could not persist generated user id: {}", err);
        }
        id
    }

    pub fn reanalysis_quiet(&self) -> Duration {
        Duration::from_millis(self.reanalysis_quiet_ms)
    }

    pub fn feedback_reset(&self) -> Duration {
        Duration::from_millis(self.feedback_reset_ms)
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/flamingo-review/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.reanalysis_quiet(), Duration::from_millis(500));
        assert_eq!(config.feedback_reset(), Duration::from_secs(2));
        assert_eq!(config.explanation_level.as_str(), "intermediate");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            backend_url: "https://review.example.com".to_string(),
            user_id: Some("user-42".to_string()),
            explanation_level: ExplanationLevel::Beginner,
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"explanation_level": "advanced"}"#).unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.explanation_level, ExplanationLevel::Advanced);
        assert_eq!(config.reanalysis_quiet_ms, 500);
    }

    #[test]
    fn test_corrupt_file_is_preserved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = Config::load_from(&path);

        assert_eq!(config, Config::default());
        assert!(!path.exists());
        let backup = fs::read_to_string(dir.path().join("config.json.corrupt")).unwrap();
        assert_eq!(backup, "{ not json");
    }
}
