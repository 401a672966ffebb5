//! Application configuration management.
//!
//! Holds the backend endpoints, request timeout, credential backend choice,
//! and the last email used to sign in. Stored at
//! `~/.config/careline/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "careline";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Encrypted credential vault file name (file backend)
const VAULT_FILE: &str = "vault.json";

pub const DEFAULT_MEMBER_PORTAL_URL: &str = "https://api.sanabenefits.com/member_portal/api";
pub const DEFAULT_PATIENT_API_URL: &str = "https://api.sanabenefits.com/patient_api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_MEMBER_PORTAL_URL: &str = "CARELINE_MEMBER_PORTAL_URL";
pub const ENV_PATIENT_API_URL: &str = "CARELINE_PATIENT_API_URL";
pub const ENV_VAULT_PASSPHRASE: &str = "CARELINE_VAULT_PASSPHRASE";

/// Where secrets are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialBackend {
    /// OS keychain via the `keyring` crate
    #[default]
    Keyring,
    /// Passphrase-encrypted file in the config directory
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub member_portal_url: String,
    pub patient_api_url: String,
    pub request_timeout_secs: u64,
    pub credential_backend: CredentialBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            member_portal_url: DEFAULT_MEMBER_PORTAL_URL.to_string(),
            patient_api_url: DEFAULT_PATIENT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            credential_backend: CredentialBackend::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load from disk (defaults when absent), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Override endpoints from the environment. `lookup` is `std::env::var`
    /// outside tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_MEMBER_PORTAL_URL).filter(|v| !v.is_empty()) {
            self.member_portal_url = url;
        }
        if let Some(url) = lookup(ENV_PATIENT_API_URL).filter(|v| !v.is_empty()) {
            self.patient_api_url = url;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    pub fn vault_path(&self) -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(VAULT_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"credential_backend": "file", "last_email": "a@b.com"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.credential_backend, CredentialBackend::File);
        assert_eq!(config.last_email.as_deref(), Some("a@b.com"));
        assert_eq!(config.patient_api_url, DEFAULT_PATIENT_API_URL);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            request_timeout_secs: 5,
            last_email: Some("a@b.com".into()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            ENV_MEMBER_PORTAL_URL => Some("http://localhost:3000/member".into()),
            ENV_PATIENT_API_URL => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.member_portal_url, "http://localhost:3000/member");
        assert_eq!(config.patient_api_url, DEFAULT_PATIENT_API_URL);
    }
}
