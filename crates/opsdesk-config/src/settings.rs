use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ConfigError, Result};

/// File read when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "opsdesk.toml";

/// Prefix of environment overrides, e.g. `OPSDESK__API__BASE_URL`.
pub const ENV_PREFIX: &str = "OPSDESK";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppSettings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after a failed read.
    #[serde(default = "default_retry")]
    pub retry: u32,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8080".into()
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_retry() -> u32 {
    2
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            retry: default_retry(),
            bearer_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSettings {
    /// Age after which a cached read is refetched. Unset keeps reads until invalidated.
    #[serde(default)]
    pub stale_after_secs: Option<u64>,
    #[serde(default = "default_gc_after_secs")]
    pub gc_after_secs: u64,
    #[serde(default = "default_refetch_on_focus")]
    pub refetch_on_focus: bool,
}

fn default_gc_after_secs() -> u64 {
    300 // 5 minutes
}
fn default_refetch_on_focus() -> bool {
    true
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_after_secs: None,
            gc_after_secs: default_gc_after_secs(),
            refetch_on_focus: default_refetch_on_focus(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppSettings {
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api.base_url).map_err(|e| {
            ConfigError::validation(format!("api.base_url '{}' is not a valid URL: {e}", self.api.base_url))
        })?;
        if self.api.timeout_ms == 0 {
            return Err(ConfigError::validation("api.timeout_ms must be > 0"));
        }
        if self.api.bearer_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ConfigError::validation("api.bearer_token must not be blank"));
        }
        if self.cache.gc_after_secs == 0 {
            return Err(ConfigError::validation("cache.gc_after_secs must be > 0"));
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api.timeout_ms)
    }

    pub fn stale_after(&self) -> Option<Duration> {
        self.cache.stale_after_secs.map(Duration::from_secs)
    }

    pub fn gc_after(&self) -> Duration {
        Duration::from_secs(self.cache.gc_after_secs)
    }
}

/// Load settings from `path` (or `opsdesk.toml` if present) and the process environment.
///
/// A missing file is not an error; defaults and environment overrides apply.
pub fn load_settings(path: Option<&Path>) -> Result<AppSettings> {
    build(path, None)
}

/// Same as [`load_settings`] with an explicit environment instead of the process one.
pub fn load_settings_with_env(
    path: Option<&Path>,
    env: config::Map<String, String>,
) -> Result<AppSettings> {
    build(path, Some(env))
}

fn build(path: Option<&Path>, env: Option<config::Map<String, String>>) -> Result<AppSettings> {
    let mut builder = Config::builder();
    let file = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if file.exists() {
        tracing::debug!(path = %file.display(), "Loading settings file");
        builder = builder.add_source(File::from(file));
    } else if path.is_some() {
        tracing::warn!(path = %file.display(), "Settings file not found, using defaults");
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .separator("__")
            .source(env),
    );

    let settings: AppSettings = builder
        .build()
        .map_err(|e| ConfigError::parse(format!("config build error: {e}")))?
        .try_deserialize()
        .map_err(|e| ConfigError::parse(format!("config deserialize error: {e}")))?;
    settings.validate()?;
    Ok(settings)
}
