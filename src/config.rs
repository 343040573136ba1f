use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CachePolicy, DEFAULT_MAX_AGE};
use crate::region::{self, Region};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub stack: StackConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StackConfig {
  pub api_key: String,
  pub environment: String,
  #[serde(default)]
  pub region: Region,
  /// Custom delivery host (overrides region)
  pub host: Option<String>,
  pub branch: Option<String>,
  /// Delivery token; normally taken from the environment instead
  #[serde(skip)]
  pub delivery_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub policy: CachePolicy,
  #[serde(default = "default_max_age_secs")]
  pub max_age_secs: u64,
  /// SQLite file for the cache (defaults to the data directory)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      policy: CachePolicy::default(),
      max_age_secs: default_max_age_secs(),
      path: None,
    }
  }
}

impl CacheConfig {
  pub fn max_age(&self) -> Duration {
    Duration::from_secs(self.max_age_secs)
  }
}

fn default_max_age_secs() -> u64 {
  DEFAULT_MAX_AGE.as_secs()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_retries")]
  pub retries: u32,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
      retries: default_retries(),
    }
  }
}

impl HttpConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_retries() -> u32 {
  3
}

impl StackConfig {
  /// Base URL of the delivery API for this stack.
  pub fn base_url(&self) -> String {
    region::base_url(self.region, self.host.as_deref())
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./stackq.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/stackq/config.yaml
  ///
  /// The delivery token is read from the environment.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        return Err(eyre!(
          "No configuration file found. Create one at ~/.config/stackq/config.yaml\n\
                 with at least stack.api_key and stack.environment set."
        ))
      }
    };

    config.stack.delivery_token = Self::get_delivery_token()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("stackq.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("stackq").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Parse configuration from YAML text.
  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if config.stack.api_key.trim().is_empty() {
      return Err(eyre!("stack.api_key must not be empty"));
    }
    if config.stack.environment.trim().is_empty() {
      return Err(eyre!("stack.environment must not be empty"));
    }

    Ok(config)
  }

  /// Get the delivery token from environment variables.
  ///
  /// Checks STACKQ_DELIVERY_TOKEN first, then DELIVERY_TOKEN as fallback.
  pub fn get_delivery_token() -> Result<String> {
    std::env::var("STACKQ_DELIVERY_TOKEN")
      .or_else(|_| std::env::var("DELIVERY_TOKEN"))
      .map_err(|_| {
        eyre!(
          "Delivery token not found. Set STACKQ_DELIVERY_TOKEN or DELIVERY_TOKEN environment variable."
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse(
      r#"
stack:
  api_key: blt123
  environment: production
"#,
    )
    .unwrap();

    assert_eq!(config.stack.region, Region::Us);
    assert_eq!(config.stack.base_url(), "https://cdn.contentstack.io/v3");
    assert_eq!(config.cache.policy, CachePolicy::IgnoreCache);
    assert_eq!(config.cache.max_age(), DEFAULT_MAX_AGE);
    assert_eq!(config.http.timeout(), Duration::from_secs(30));
    assert_eq!(config.http.retries, 3);
  }

  #[test]
  fn test_full_config() {
    let config = Config::parse(
      r#"
stack:
  api_key: blt123
  environment: staging
  region: azure_eu
  branch: feature
cache:
  policy: cache_then_network
  max_age_secs: 60
  path: /tmp/stackq-test.db
http:
  timeout_secs: 5
  retries: 0
"#,
    )
    .unwrap();

    assert_eq!(
      config.stack.base_url(),
      "https://azure-eu-cdn.contentstack.com/v3"
    );
    assert_eq!(config.stack.branch.as_deref(), Some("feature"));
    assert_eq!(config.cache.policy, CachePolicy::CacheThenNetwork);
    assert_eq!(config.cache.max_age(), Duration::from_secs(60));
    assert_eq!(
      config.cache.path.as_deref(),
      Some(Path::new("/tmp/stackq-test.db"))
    );
    assert_eq!(config.http.retries, 0);
  }

  #[test]
  fn test_rejects_bad_policy_and_empty_key() {
    assert!(Config::parse(
      r#"
stack: {api_key: blt1, environment: prod}
cache: {policy: sometimes}
"#
    )
    .is_err());

    assert!(Config::parse("stack: {api_key: '', environment: prod}").is_err());
  }

  #[test]
  fn test_missing_explicit_path_errors() {
    let err = Config::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
