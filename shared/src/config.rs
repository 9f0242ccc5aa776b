//! Harness configuration loaded from the process environment
//!
//! Values come from environment variables, with an optional `.env` file
//! consulted first. The configuration is read-only once loaded and cached for
//! the lifetime of the test binary.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::{ConfigError, SharedResult};

pub const ENV_ADMIN_USER: &str = "CF_ADMIN_USER";
pub const ENV_ADMIN_PASSWORD: &str = "CF_ADMIN_PASSWORD";
pub const ENV_DOMAIN: &str = "CF_DOMAIN";
pub const ENV_SKIP_CERT_VERIFY: &str = "SKIP_CERT_VERIFY";
pub const ENV_DEFAULT_TIMEOUT: &str = "DEFAULT_TIMEOUT";
pub const ENV_APP_PUSH_TIMEOUT: &str = "APP_PUSH_TIMEOUT";
pub const ENV_APPS_DIR: &str = "APPS_DIR";
pub const ENV_SPACE_DRAIN_PATH: &str = "SPACE_DRAIN_PATH";
pub const ENV_CF_BINARY: &str = "CF_BINARY";

/// Read directly from the environment, never through [`TestConfig`].
pub const ENV_MUST_RUN: &str = "MUST_RUN_ACCEPTANCE";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_APP_PUSH_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq)]
pub struct TestConfig {
    pub admin_user: String,
    pub admin_password: String,
    pub domain: String,
    pub skip_cert_verify: bool,
    pub default_timeout: Duration,
    pub app_push_timeout: Duration,
    pub apps_dir: PathBuf,
    pub space_drain_path: Option<PathBuf>,
    pub cf_binary: String,
}

static GLOBAL: OnceLock<SharedResult<TestConfig>> = OnceLock::new();

impl TestConfig {
    /// Load from the real environment, reading `.env` first if present.
    pub fn load() -> SharedResult<Self> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Process-wide configuration, loaded on first use and cached thereafter.
    pub fn global() -> Result<&'static TestConfig, ConfigError> {
        GLOBAL.get_or_init(Self::load).as_ref().map_err(Clone::clone)
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> SharedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let missing: Vec<String> = [ENV_ADMIN_USER, ENV_ADMIN_PASSWORD, ENV_DOMAIN]
            .into_iter()
            .filter(|key| get(*key).is_none())
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing { fields: missing });
        }

        Ok(Self {
            admin_user: get(ENV_ADMIN_USER).unwrap_or_default(),
            admin_password: get(ENV_ADMIN_PASSWORD).unwrap_or_default(),
            domain: get(ENV_DOMAIN).unwrap_or_default(),
            skip_cert_verify: match get(ENV_SKIP_CERT_VERIFY) {
                Some(raw) => parse_bool(ENV_SKIP_CERT_VERIFY, &raw)?,
                None => false,
            },
            default_timeout: match get(ENV_DEFAULT_TIMEOUT) {
                Some(raw) => parse_duration(ENV_DEFAULT_TIMEOUT, &raw)?,
                None => DEFAULT_TIMEOUT,
            },
            app_push_timeout: match get(ENV_APP_PUSH_TIMEOUT) {
                Some(raw) => parse_duration(ENV_APP_PUSH_TIMEOUT, &raw)?,
                None => DEFAULT_APP_PUSH_TIMEOUT,
            },
            apps_dir: get(ENV_APPS_DIR).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("apps")),
            space_drain_path: get(ENV_SPACE_DRAIN_PATH).map(PathBuf::from),
            cf_binary: get(ENV_CF_BINARY).unwrap_or_else(|| "cf".to_string()),
        })
    }

    /// `https://api.<domain>`
    pub fn api_url(&self) -> String {
        format!("https://api.{}", self.domain)
    }

    /// Route of an app pushed to the platform's shared domain.
    pub fn app_host(&self, app_name: &str) -> String {
        format!("{}.{}", app_name, self.domain)
    }
}

/// Whether a config load failure should abort rather than skip the suite.
pub fn must_run() -> bool {
    std::env::var(ENV_MUST_RUN).map(|value| value == "true").unwrap_or(false)
}

fn parse_bool(field: &str, raw: &str) -> SharedResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            field: field.to_string(),
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

/// Accepts humantime strings (`90s`, `2m`, `1m 30s`) or a bare number of seconds.
fn parse_duration(field: &str, raw: &str) -> SharedResult<Duration> {
    let raw_trimmed = raw.trim();
    if let Ok(secs) = raw_trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw_trimmed).map_err(|e| ConfigError::Invalid {
        field: field.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
