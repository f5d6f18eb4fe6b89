//! Configuration loader and validator for the moderation client.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `api.base_url`.
pub const BASE_URL_ENV: &str = "API_BASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub api: Api,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Base URL with a trailing slash so relative joins keep the path prefix.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        parse_base_url(&self.api.base_url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }

    /// Where the session token is persisted between runs.
    pub fn session_path(&self) -> PathBuf {
        Path::new(&self.app.data_dir).join("session.json")
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash).map_err(|_| ConfigError::Invalid("api.base_url must be a valid URL"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::Invalid("api.base_url must use http or https")),
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - `API_BASE_URL` in the environment replaces `api.base_url`.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    if let Ok(url) = std::env::var(BASE_URL_ENV) {
        if !url.trim().is_empty() {
            cfg.api.base_url = url;
        }
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.api.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("api.base_url must be non-empty"));
    }
    parse_base_url(&cfg.api.base_url)?;
    if cfg.api.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("api.timeout_seconds must be > 0"));
    }
    Ok(())
}

/// Returns the example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

api:
  base_url: "https://api.campus-market.example/api/v1/"
  timeout_seconds: 10
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn timeout_defaults_to_ten_seconds() {
        let cfg: Config = serde_yaml::from_str(
            "app:\n  data_dir: ./data\napi:\n  base_url: http://localhost:8000/api\n",
        )
        .unwrap();
        assert_eq!(cfg.api.timeout_seconds, 10);
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.base_url = "http://localhost:8000/api/v1".into();
        let url = cfg.base_url().unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/v1/");
        assert_eq!(
            url.join("admin/listings").unwrap().path(),
            "/api/v1/admin/listings"
        );
    }

    #[test]
    fn invalid_base_url() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.base_url = "".into();
        assert!(matches!(
            validate(&cfg),
            Err(ConfigError::Invalid(msg)) if msg.contains("api.base_url")
        ));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.base_url = "ftp://files.example".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_timeout_and_data_dir() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.timeout_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = " ".into();
        assert!(matches!(
            validate(&cfg),
            Err(ConfigError::Invalid(msg)) if msg.contains("data_dir")
        ));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
        assert_eq!(cfg.session_path(), data_path.join("session.json"));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.data_dir, "./data");
    }
}
