//! Configuration loader and validator for the event notification service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

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
    pub fcm: Fcm,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_ms: u64,
    pub max_backoff_seconds: u64,
    /// How long a claimed trigger stays invisible to other workers.
    pub lease_seconds: u64,
    /// Upper bound on trigger invocations running at once.
    pub max_concurrent_triggers: usize,
}

/// Firebase Cloud Messaging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fcm {
    pub project_id: String,
    /// Path to the service-account JSON key file.
    pub credentials_path: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }
    if cfg.app.lease_seconds == 0 {
        return Err(ConfigError::Invalid("app.lease_seconds must be > 0"));
    }
    if cfg.app.max_concurrent_triggers == 0 {
        return Err(ConfigError::Invalid(
            "app.max_concurrent_triggers must be > 0",
        ));
    }

    if cfg.fcm.project_id.trim().is_empty() {
        return Err(ConfigError::Invalid("fcm.project_id must be non-empty"));
    }
    if cfg.fcm.credentials_path.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "fcm.credentials_path must be non-empty",
        ));
    }

    Ok(())
}

/// Example YAML kept in sync with the schema above.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_ms: 500
  max_backoff_seconds: 60
  lease_seconds: 30
  max_concurrent_triggers: 10

fcm:
  project_id: "YOUR_FIREBASE_PROJECT_ID"
  credentials_path: "./service-account.json"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.max_concurrent_triggers, 10);
    }

    #[test]
    fn invalid_project_id() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.fcm.project_id = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("fcm.project_id")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_credentials_path() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.fcm.credentials_path = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("credentials_path")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_worker_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.poll_interval_ms = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.lease_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.max_concurrent_triggers = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.lease_seconds, 30);
    }
}
