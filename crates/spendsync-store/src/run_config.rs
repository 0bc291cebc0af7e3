//! RunConfig: parse upload.toml

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use spendsync_core::{DEFAULT_OWNER_FIELD, MAX_BATCH_SIZE};

/// Top-level upload.toml structure.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Run name; the run directory defaults to `{runs_base}/{name}`.
    #[serde(default = "default_name")]
    pub name: String,

    /// Explicit run directory, overrides the name-derived one.
    pub run_dir: Option<PathBuf>,

    pub target: TargetConfig,

    pub input: InputConfig,

    #[serde(default)]
    pub partition: PartitionConfig,

    /// Directory of the file this was read from; relative paths resolve here.
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_name() -> String {
    "default".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Service base URL, e.g. `https://budget.example.com/core/api/v1`.
    pub endpoint: String,
    /// Falls back to the global config when absent.
    pub user: Option<String>,
    /// May be `${VAR}`; falls back to `SPENDSYNC_PASSWORD` when absent.
    #[serde(default, deserialize_with = "deserialize_env_var")]
    pub password: Option<String>,
    pub proxy: Option<String>,
    /// Stamped onto every uploaded item; defaults to `user`.
    pub approver: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// JSON array of line items.
    pub records: PathBuf,
    /// JSON object `{ "<owner>": ["<key>", ...] }`.
    pub owners: PathBuf,
    #[serde(default = "default_owner_field")]
    pub owner_field: String,
}

fn default_owner_field() -> String {
    DEFAULT_OWNER_FIELD.into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
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

impl RunConfig {
    /// Parse upload.toml from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read run config: {}", path.display()))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::parse(&content, &base_dir)
            .with_context(|| format!("failed to parse run config: {}", path.display()))
    }

    /// Parse TOML text; relative paths resolve against `base_dir`.
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.base_dir = base_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint = self.target.endpoint.trim();
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "target.endpoint must be an http(s) URL, got '{endpoint}'"
        );
        anyhow::ensure!(
            (1..=MAX_BATCH_SIZE).contains(&self.partition.batch_size),
            "partition.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
            self.partition.batch_size
        );
        anyhow::ensure!(
            !self.name.is_empty()
                && self
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
                && self.name != "."
                && self.name != "..",
            "name may only contain letters, digits, '-', '_' and '.', got '{}'",
            self.name
        );
        anyhow::ensure!(
            !self.input.owner_field.is_empty(),
            "input.owner_field must not be empty"
        );
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn records_path(&self) -> PathBuf {
        self.resolve(&self.input.records)
    }

    pub fn owners_path(&self) -> PathBuf {
        self.resolve(&self.input.owners)
    }

    /// Run directory: explicit `run_dir`, else `{runs_base}/{name}`.
    pub fn run_dir(&self, runs_base: &Path) -> PathBuf {
        match &self.run_dir {
            Some(dir) => self.resolve(dir),
            None => runs_base.join(&self.name),
        }
    }

    /// Endpoint without surrounding whitespace or trailing slash.
    pub fn endpoint(&self) -> &str {
        self.target.endpoint.trim().trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[target]
endpoint = "https://budget.example.com/api/"

[input]
records = "expenses.json"
owners = "owners.json"
"#;

    #[test]
    fn parse_minimal_applies_defaults() {
        let config = RunConfig::parse(MINIMAL, Path::new("/etc/spendsync")).unwrap();
        assert_eq!(config.name, "default");
        assert_eq!(config.partition.batch_size, MAX_BATCH_SIZE);
        assert_eq!(config.input.owner_field, DEFAULT_OWNER_FIELD);
        assert_eq!(config.endpoint(), "https://budget.example.com/api");
        assert_eq!(
            config.records_path(),
            PathBuf::from("/etc/spendsync/expenses.json")
        );
        assert_eq!(
            config.run_dir(Path::new("/var/runs")),
            PathBuf::from("/var/runs/default")
        );
    }

    #[test]
    fn explicit_run_dir_and_absolute_inputs() {
        let toml = r#"
name = "fy26"
run_dir = "state/fy26"

[target]
endpoint = "http://localhost:8080"
user = "p123"
approver = "p999"

[input]
records = "/data/expenses.json"
owners = "owners.json"
owner_field = "costCenter"

[partition]
batch_size = 250
"#;
        let config = RunConfig::parse(toml, Path::new("/work")).unwrap();
        assert_eq!(config.records_path(), PathBuf::from("/data/expenses.json"));
        assert_eq!(
            config.run_dir(Path::new("/ignored")),
            PathBuf::from("/work/state/fy26")
        );
        assert_eq!(config.partition.batch_size, 250);
        assert_eq!(config.target.approver.as_deref(), Some("p999"));
    }

    #[test]
    fn password_expands_env_var() {
        std::env::set_var("SPENDSYNC_TEST_RUN_CONFIG_PW", "hunter2");
        let toml = MINIMAL.replace(
            "[target]\n",
            "[target]\npassword = \"${SPENDSYNC_TEST_RUN_CONFIG_PW}\"\n",
        );
        let config = RunConfig::parse(&toml, Path::new(".")).unwrap();
        assert_eq!(config.target.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn unset_env_var_yields_none() {
        let toml = MINIMAL.replace(
            "[target]\n",
            "[target]\npassword = \"${SPENDSYNC_TEST_SURELY_UNSET_VAR}\"\n",
        );
        let config = RunConfig::parse(&toml, Path::new(".")).unwrap();
        assert!(config.target.password.is_none());
    }

    #[test]
    fn rejects_oversized_batch() {
        let toml = format!("{MINIMAL}\n[partition]\nbatch_size = 5000\n");
        let err = RunConfig::parse(&toml, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let toml = MINIMAL.replace("https://budget.example.com/api/", "ftp://x");
        assert!(RunConfig::parse(&toml, Path::new(".")).is_err());
    }

    #[test]
    fn rejects_path_like_name() {
        let toml = format!("name = \"../escape\"\n{MINIMAL}");
        assert!(RunConfig::parse(&toml, Path::new(".")).is_err());
    }
}
