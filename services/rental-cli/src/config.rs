//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The account password is loaded from RENTAL_PASSWORD env var or
//! password_file, never stored in the TOML directly.

use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub account: Option<AccountConfig>,
}

/// Remote API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where the session is kept between runs
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
        }
    }
}

/// Login account used by `login` when no flags are given
#[derive(Debug, Deserialize)]
pub struct AccountConfig {
    pub email: String,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Path to a file containing the password (alternative to RENTAL_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    30
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("session.json")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Password resolution order:
    /// 1. RENTAL_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(account) = config.account.as_mut() {
            account.password = resolve_password(account.password_file.as_deref())?;
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("rental-client.toml")
    }
}

/// Env var takes precedence over file. Blank values count as unset.
fn resolve_password(password_file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Some(password) = password_from_env() {
        return Ok(Some(password));
    }
    let Some(file) = password_file else {
        return Ok(None);
    };
    let password = std::fs::read_to_string(file).map_err(|e| {
        common::Error::Config(format!(
            "failed to read password_file {}: {e}",
            file.display()
        ))
    })?;
    let password = password.trim().to_owned();
    Ok((!password.is_empty()).then(|| Secret::new(password)))
}

/// RENTAL_PASSWORD, unless unset or blank.
pub fn password_from_env() -> Option<Secret<String>> {
    let password = std::env::var("RENTAL_PASSWORD").ok()?;
    (!password.trim().is_empty()).then(|| Secret::new(password))
}
