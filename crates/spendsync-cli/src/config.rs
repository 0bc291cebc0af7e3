//! Global configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable consulted when no password is configured.
pub const PASSWORD_ENV: &str = "SPENDSYNC_PASSWORD";

/// Global configuration for spendsync
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub runs: RunsConfig,
    pub http: HttpConfig,
    pub target: TargetDefaults,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunsConfig {
    /// Run directories are created under here unless upload.toml names one
    pub base_dir: PathBuf,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./runs"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct HttpConfig {
    pub proxy: Option<String>,
}

/// Fallbacks for fields upload.toml leaves out.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetDefaults {
    pub user: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub password: Option<String>,
}

impl Default for TargetDefaults {
    fn default() -> Self {
        Self {
            user: None,
            password: std::env::var(PASSWORD_ENV).ok(),
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./spendsync.toml (current directory)
    /// 2. ~/.config/spendsync/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("spendsync.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "spendsync") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.runs.base_dir, PathBuf::from("./runs"));
        assert!(config.http.proxy.is_none());
        assert!(config.target.user.is_none());
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("SPENDSYNC_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${SPENDSYNC_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("SPENDSYNC_TEST_VAR");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[runs]
base_dir = "/var/lib/spendsync"

[http]
proxy = "proxy.corp:8080"

[target]
user = "p123"
password = "literal-pw"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.runs.base_dir, PathBuf::from("/var/lib/spendsync"));
        assert_eq!(config.http.proxy.as_deref(), Some("proxy.corp:8080"));
        assert_eq!(config.target.user.as_deref(), Some("p123"));
        assert_eq!(config.target.password.as_deref(), Some("literal-pw"));
    }

    #[test]
    fn from_file_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spendsync.toml");
        std::fs::write(&path, "[runs\n").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("spendsync.toml"));
    }
}
