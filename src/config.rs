use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const KEYRING_SERVICE: &str = "ems-console";
pub const KEYRING_TOKEN_ACCOUNT: &str = "github-token";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MIN_REFRESH_SECONDS: u64 = 1;
const MAX_REFRESH_SECONDS: u64 = 3_600;
const MIN_TIMEOUT_SECONDS: u64 = 1;
const MAX_TIMEOUT_SECONDS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Github,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GithubConfig {
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub revision: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub timeout_seconds: u64,
    pub commit_message: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            revision: "main".to_string(),
            token: None,
            timeout_seconds: 20,
            commit_message: "Reset history database".to_string(),
        }
    }
}

impl GithubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardConfig {
    pub source: SourceKind,
    pub github: GithubConfig,
    pub local_root: PathBuf,
    pub live_path: String,
    pub history_path: String,
    /// Directory of `<YYYY-MM-DD>.csv` archives read when the history file is absent.
    /// Empty disables the fallback.
    pub archives_dir: String,
    pub preferred_tables: Vec<String>,
    pub timestamp_format: String,
    pub refresh_interval_seconds: u64,
    pub confirmation_phrase: String,
    pub log_dir: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Github,
            github: GithubConfig::default(),
            local_root: PathBuf::from("."),
            live_path: "real_time_monitoring/temp/ems.db".to_string(),
            history_path: "historical_data/history.db".to_string(),
            archives_dir: "historical_data/archives".to_string(),
            preferred_tables: vec![
                "records".to_string(),
                "readings".to_string(),
                "sensor_data".to_string(),
            ],
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            refresh_interval_seconds: 5,
            confirmation_phrase: "DELETE".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl DashboardConfig {
    /// Reads YAML from `path` (defaults when `None`), then applies environment overrides.
    /// Validation is left to callers that talk to a store.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| AppError::Config(format!("cannot read {}: {}", path.display(), error)))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("EMS_GITHUB_TOKEN").filter(|value| !value.trim().is_empty()) {
            self.github.token = Some(token.trim().to_string());
        }
        if let Some(slug) = lookup("EMS_GITHUB_REPO") {
            if let Some((owner, repo)) = slug.trim().split_once('/') {
                self.github.owner = owner.to_string();
                self.github.repo = repo.to_string();
            }
        }
        if let Some(revision) = lookup("EMS_GITHUB_BRANCH").filter(|value| !value.trim().is_empty()) {
            self.github.revision = revision.trim().to_string();
        }
    }

    /// Falls back to the OS keyring when no token came from the file or environment.
    pub fn resolve_keyring_token(&mut self) {
        if self.github.token.is_some() || self.source != SourceKind::Github {
            return;
        }
        let entry = match keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN_ACCOUNT) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::debug!(error = %error, "keyring unavailable");
                return;
            }
        };
        match entry.get_password() {
            Ok(token) if !token.is_empty() => self.github.token = Some(token),
            Ok(_) | Err(keyring::Error::NoEntry) => {}
            Err(error) => tracing::warn!(error = %error, "failed to read token from keyring"),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if !(MIN_REFRESH_SECONDS..=MAX_REFRESH_SECONDS).contains(&self.refresh_interval_seconds) {
            return Err(AppError::Config(format!(
                "refreshIntervalSeconds must be between {} and {}",
                MIN_REFRESH_SECONDS, MAX_REFRESH_SECONDS
            )));
        }
        if self.confirmation_phrase.trim().is_empty() {
            return Err(AppError::Config("confirmationPhrase must not be empty".to_string()));
        }
        if self.timestamp_format.trim().is_empty() {
            return Err(AppError::Config("timestampFormat must not be empty".to_string()));
        }
        if self.live_path.trim().is_empty() || self.history_path.trim().is_empty() {
            return Err(AppError::Config("livePath and historyPath are required".to_string()));
        }
        if self.source == SourceKind::Github {
            if self.github.owner.is_empty() || self.github.repo.is_empty() {
                return Err(AppError::Config(
                    "github.owner and github.repo are required (or set EMS_GITHUB_REPO=owner/repo)".to_string(),
                ));
            }
            if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&self.github.timeout_seconds) {
                return Err(AppError::Config(format!(
                    "github.timeoutSeconds must be between {} and {}",
                    MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS
                )));
            }
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::{DashboardConfig, SourceKind};
    use std::collections::HashMap;

    #[test]
    fn yaml_overrides_defaults() {
        let config = DashboardConfig::from_yaml(
            "source: local\nlocalRoot: /srv/ems\nrefreshIntervalSeconds: 10\npreferredTables: [samples]\n",
        )
        .expect("parse");
        assert_eq!(config.source, SourceKind::Local);
        assert_eq!(config.refresh_interval_seconds, 10);
        assert_eq!(config.preferred_tables, vec!["samples".to_string()]);
        assert_eq!(config.confirmation_phrase, "DELETE");
        assert_eq!(config.archives_dir, "historical_data/archives");
        config.validate().expect("valid");
    }

    #[test]
    fn env_supplies_repo_and_token() {
        let env: HashMap<&str, &str> = [
            ("EMS_GITHUB_TOKEN", "ghp_example"),
            ("EMS_GITHUB_REPO", "plant/line-data"),
            ("EMS_GITHUB_BRANCH", "data"),
        ]
        .into_iter()
        .collect();
        let mut config = DashboardConfig::default();
        config.apply_env(|key| env.get(key).map(|value| value.to_string()));
        assert_eq!(config.github.owner, "plant");
        assert_eq!(config.github.repo, "line-data");
        assert_eq!(config.github.revision, "data");
        assert_eq!(config.github.token.as_deref(), Some("ghp_example"));
        config.validate().expect("valid");
    }

    #[test]
    fn github_source_requires_repo() {
        let err = DashboardConfig::default().validate().expect_err("missing repo");
        assert!(err.to_string().starts_with("CONFIG_INVALID"));
    }

    #[test]
    fn rejects_zero_refresh_interval() {
        let mut config = DashboardConfig {
            source: SourceKind::Local,
            ..DashboardConfig::default()
        };
        config.refresh_interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn token_is_never_serialized() {
        let mut config = DashboardConfig::default();
        config.github.token = Some("secret-token".to_string());
        let yaml = serde_yaml::to_string(&config).expect("yaml");
        assert!(!yaml.contains("secret-token"));
    }
}
