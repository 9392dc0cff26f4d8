//! Process settings and endpoint catalog loading.
//!
//! Settings come from an optional `opsdesk.toml` overlaid with
//! `OPSDESK__SECTION__KEY` environment variables. The endpoint catalog comes
//! from `OPSDESK_ENDPOINTS` (inline JSON) or `OPSDESK_ENDPOINTS_FILE`.

pub mod endpoints;
pub mod settings;

use opsdesk_core::CoreError;

pub use endpoints::{ENDPOINTS_FILE_VAR, ENDPOINTS_VAR, EndpointSource, load_catalog};
pub use settings::{
    ApiSettings, AppSettings, CacheSettings, DEFAULT_CONFIG_FILE, ENV_PREFIX, LoggingSettings,
    load_settings, load_settings_with_env,
};

/// Error types for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No endpoint catalog: set {} or {}", ENDPOINTS_VAR, ENDPOINTS_FILE_VAR)]
    MissingEndpoints,

    #[error("Invalid endpoint catalog from {origin}: {source}")]
    Catalog {
        origin: String,
        #[source]
        source: CoreError,
    },
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn catalog(origin: impl Into<String>, source: CoreError) -> Self {
        Self::Catalog {
            origin: origin.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
