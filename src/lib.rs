pub mod api;
pub mod archive;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod respond;
pub mod signature;
pub mod webhook;

use axum::{Router, routing};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::archive::{ArchiveBuilder, CommandRunner, SystemCommandRunner};
use crate::error::ReleaseError;
use crate::provider::{GiteaProvider, GithubProvider};

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ARCHIVE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_SCRIPT_PATH: &str = ".bin/release.sh";
pub const DEFAULT_MAX_LOG_FILES: usize = 5;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReleaseConfig {
    pub bind_address: Option<String>,
    pub github: Option<ProviderConfig>,
    pub gitea: Option<ProviderConfig>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub webhook_secret: String,
    pub token: Option<String>,
    /// Gitea only: API base such as `https://git.example.com/api/v1`.
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: format!("simple_git_release/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ArchiveConfig {
    pub timeout_secs: u64,
    pub script_path: PathBuf,
    pub git: String,
    pub work_dir: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_ARCHIVE_TIMEOUT_SECS,
            script_path: PathBuf::from(DEFAULT_SCRIPT_PATH),
            git: "git".to_string(),
            work_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: Option<PathBuf>,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

impl ReleaseConfig {
    /// Rejects configurations that could never accept a delivery.
    pub fn validate(&self) -> Result<(), ReleaseError> {
        if self.github.is_none() && self.gitea.is_none() {
            return Err(ReleaseError::ConfigError(
                "at least one of [github] or [gitea] must be configured".to_string(),
            ));
        }
        for (name, provider) in [("github", &self.github), ("gitea", &self.gitea)] {
            if let Some(p) = provider {
                if p.webhook_secret.is_empty() {
                    return Err(ReleaseError::ConfigError(format!(
                        "[{}] webhook_secret must not be empty",
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn providers(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.github.is_some() {
            names.push("github");
        }
        if self.gitea.is_some() {
            names.push("gitea");
        }
        names
    }
}

/// Load and parse the configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<ReleaseConfig, ReleaseError> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path).map_err(|e| {
        ReleaseError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_config(&config_str)
}

pub fn parse_config(config_str: &str) -> Result<ReleaseConfig, ReleaseError> {
    let config: ReleaseConfig = toml::from_str(config_str)?;
    config.validate()?;
    Ok(config)
}

pub struct AppState {
    pub config: ReleaseConfig,
    pub github: Option<GithubProvider>,
    pub gitea: Option<GiteaProvider>,
    pub archiver: ArchiveBuilder,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Builds the providers and archive builder from `config`, running
    /// subprocesses through `runner`.
    pub fn new(config: ReleaseConfig, runner: Arc<dyn CommandRunner>) -> Result<Self, ReleaseError> {
        let http = reqwest::Client::builder()
            .user_agent(config.http.user_agent.clone())
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()
            .map_err(|e| ReleaseError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let github = config.github.as_ref().map(|p| {
            GithubProvider::new(http.clone(), p.webhook_secret.as_bytes(), p.token.clone())
        });
        let gitea = config.gitea.as_ref().map(|p| {
            GiteaProvider::new(http.clone(), p.webhook_secret.as_bytes(), p.token.clone())
                .with_api_url(p.api_url.clone())
        });

        let mut archiver = ArchiveBuilder::new(runner)
            .with_git(config.archive.git.clone())
            .with_script_path(config.archive.script_path.clone());
        if let Some(dir) = &config.archive.work_dir {
            archiver = archiver.with_work_dir(dir.clone());
        }

        Ok(Self {
            config,
            github,
            gitea,
            archiver,
            start_time: Instant::now(),
            started_at: Utc::now(),
        })
    }

    /// Same as [`AppState::new`] with real subprocesses.
    pub fn from_config(config: ReleaseConfig) -> Result<Self, ReleaseError> {
        let runner = SystemCommandRunner::new(Duration::from_secs(config.archive.timeout_secs));
        Self::new(config, Arc::new(runner))
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(api::root))
        .route("/status", routing::get(api::status))
        .route("/github/push", routing::post(api::github_push))
        .route("/gitea/push", routing::post(api::gitea_push))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = parse_config(
            r#"
            bind_address = "0.0.0.0:9000"

            [github]
            webhook_secret = "gh"
            token = "ghp_x"

            [gitea]
            webhook_secret = "gt"
            api_url = "https://git.example.com/api/v1"

            [http]
            timeout_secs = 5

            [archive]
            script_path = "tools/package"
            work_dir = "/var/tmp/releases"

            [logging]
            directory = "logs"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_address.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(config.github.as_ref().unwrap().token.as_deref(), Some("ghp_x"));
        assert_eq!(
            config.gitea.as_ref().unwrap().api_url.as_deref(),
            Some("https://git.example.com/api/v1")
        );
        assert_eq!(config.http.timeout_secs, 5);
        assert!(config.http.user_agent.starts_with("simple_git_release/"));
        assert_eq!(config.archive.script_path, PathBuf::from("tools/package"));
        assert_eq!(config.archive.timeout_secs, DEFAULT_ARCHIVE_TIMEOUT_SECS);
        assert_eq!(config.logging.max_files, DEFAULT_MAX_LOG_FILES);
        assert_eq!(config.providers(), vec!["github", "gitea"]);
    }

    #[test]
    fn requires_a_provider() {
        let err = parse_config("bind_address = \"127.0.0.1:1\"").unwrap_err();
        assert!(matches!(err, ReleaseError::ConfigError(_)));
    }

    #[test]
    fn rejects_empty_secret() {
        let err = parse_config("[gitea]\nwebhook_secret = \"\"").unwrap_err();
        assert!(err.to_string().contains("[gitea] webhook_secret"));
    }

    #[test]
    fn rejects_invalid_toml() {
        assert!(matches!(
            parse_config("[github"),
            Err(ReleaseError::TomlParseError(_))
        ));
    }
}
