use thiserror::Error;

/// Core error types for opsdesk operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown endpoint group: {0}")]
    UnknownGroup(String),

    #[error("Unknown endpoint: {group}.{name}")]
    UnknownEndpoint { group: String, name: String },

    #[error("Invalid endpoint reference \"{0}\", expected <group>.<name>")]
    InvalidReference(String),

    #[error("Invalid endpoint catalog: {0}")]
    InvalidCatalog(String),

    #[error("Unsupported value for parameter '{key}': {reason}")]
    UnsupportedParam { key: String, reason: String },

    #[error("Missing value for placeholder ':{placeholder}' in {template}")]
    MissingPlaceholder {
        placeholder: String,
        template: String,
    },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new UnknownGroup error
    pub fn unknown_group(group: impl Into<String>) -> Self {
        Self::UnknownGroup(group.into())
    }

    /// Create a new UnknownEndpoint error
    pub fn unknown_endpoint(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownEndpoint {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Create a new InvalidCatalog error
    pub fn invalid_catalog(message: impl Into<String>) -> Self {
        Self::InvalidCatalog(message.into())
    }

    /// Create a new UnsupportedParam error
    pub fn unsupported_param(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedParam {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a new MissingPlaceholder error
    pub fn missing_placeholder(placeholder: impl Into<String>, template: impl Into<String>) -> Self {
        Self::MissingPlaceholder {
            placeholder: placeholder.into(),
            template: template.into(),
        }
    }

    /// Errors caused by the caller's input rather than by configuration
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidReference(_)
                | Self::UnsupportedParam { .. }
                | Self::MissingPlaceholder { .. }
        )
    }

    /// Errors caused by a broken endpoint catalog
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownGroup(_)
                | Self::UnknownEndpoint { .. }
                | Self::InvalidCatalog(_)
                | Self::JsonError(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownGroup(_) | Self::UnknownEndpoint { .. } => ErrorCategory::NotFound,
            Self::InvalidCatalog(_) => ErrorCategory::Configuration,
            Self::InvalidReference(_) | Self::UnsupportedParam { .. } => ErrorCategory::Validation,
            Self::MissingPlaceholder { .. } => ErrorCategory::Precondition,
            Self::JsonError(_) => ErrorCategory::Serialization,
        }
    }
}

/// Error categories for logging and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Precondition,
    Serialization,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::Precondition => write!(f, "precondition"),
            Self::Serialization => write!(f, "serialization"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
