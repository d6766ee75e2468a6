//! Configuration loader and validator for the net-roster service.
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
    pub listing: Listing,
    pub directory: Directory,
    pub batch: Batch,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub bind_addr: String,
}

/// Pre-check-in listing source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    pub url: String,
    pub timeout_seconds: u64,
}

/// External call-sign directory service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Directory {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout_seconds: u64,
    pub cache_ttl_hours: u64,
}

/// Batch processing knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    pub max_concurrency: usize,
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
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }

    if cfg.listing.url.trim().is_empty() {
        return Err(ConfigError::Invalid("listing.url must be non-empty"));
    }
    if cfg.listing.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("listing.timeout_seconds must be > 0"));
    }

    if cfg.directory.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("directory.base_url must be non-empty"));
    }
    if cfg.directory.username.trim().is_empty() {
        return Err(ConfigError::Invalid("directory.username must be non-empty"));
    }
    if cfg.directory.password.trim().is_empty() {
        return Err(ConfigError::Invalid("directory.password must be non-empty"));
    }
    if cfg.directory.timeout_seconds == 0 {
        return Err(ConfigError::Invalid(
            "directory.timeout_seconds must be > 0",
        ));
    }
    if cfg.directory.cache_ttl_hours == 0 {
        return Err(ConfigError::Invalid("directory.cache_ttl_hours must be > 0"));
    }

    if cfg.batch.max_concurrency == 0 {
        return Err(ConfigError::Invalid("batch.max_concurrency must be > 0"));
    }

    Ok(())
}

/// Example YAML document; also exercised by tests.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  bind_addr: "127.0.0.1:8090"

listing:
  url: "https://example.org/netlist/precheckin.txt"
  timeout_seconds: 10

directory:
  base_url: "https://xmldata.example.com/xml/current/"
  username: "YOUR_DIRECTORY_USERNAME"
  password: "YOUR_DIRECTORY_PASSWORD"
  timeout_seconds: 5
  cache_ttl_hours: 24

batch:
  max_concurrency: 4
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
        assert_eq!(cfg.directory.cache_ttl_hours, 24);
        assert_eq!(cfg.batch.max_concurrency, 4);
    }

    #[test]
    fn invalid_listing_url() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.listing.url = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("listing.url")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_directory_credentials() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.directory.username = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("directory.username")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.directory.password = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_zero_knobs() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.listing.timeout_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.directory.cache_ttl_hours = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.batch.max_concurrency = 0;
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
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.bind_addr, "127.0.0.1:8090");
    }
}
