//! Endpoint catalog loading.
//!
//! The catalog is read once at startup and handed to the client as an
//! immutable value.

use std::fmt;
use std::path::PathBuf;

use opsdesk_core::EndpointCatalog;

use crate::{ConfigError, Result};

/// Inline JSON catalog.
pub const ENDPOINTS_VAR: &str = "OPSDESK_ENDPOINTS";

/// Path to a JSON catalog file.
pub const ENDPOINTS_FILE_VAR: &str = "OPSDESK_ENDPOINTS_FILE";

/// Where a catalog comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSource {
    Inline(String),
    File(PathBuf),
}

impl EndpointSource {
    /// Source named by the process environment. The inline variable wins.
    pub fn from_env() -> Option<Self> {
        Self::from_vars(
            std::env::var(ENDPOINTS_VAR).ok(),
            std::env::var(ENDPOINTS_FILE_VAR).ok(),
        )
    }

    /// Source from raw variable values; blank values count as unset.
    pub fn from_vars(inline: Option<String>, file: Option<String>) -> Option<Self> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        present(inline)
            .map(Self::Inline)
            .or_else(|| present(file).map(|path| Self::File(PathBuf::from(path))))
    }

    pub fn load(&self) -> Result<EndpointCatalog> {
        let raw = match self {
            Self::Inline(raw) => raw.clone(),
            Self::File(path) => std::fs::read_to_string(path)?,
        };
        let catalog = EndpointCatalog::from_json_str(&raw)
            .map_err(|e| ConfigError::catalog(self.to_string(), e))?;
        tracing::info!(source = %self, operations = catalog.len(), "Loaded endpoint catalog");
        Ok(catalog)
    }
}

impl fmt::Display for EndpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(_) => write!(f, "{ENDPOINTS_VAR}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Load the catalog named by the environment.
///
/// # Errors
///
/// [`ConfigError::MissingEndpoints`] if neither variable is set, otherwise
/// any read or parse failure of the named source.
pub fn load_catalog() -> Result<EndpointCatalog> {
    EndpointSource::from_env()
        .ok_or(ConfigError::MissingEndpoints)?
        .load()
}
