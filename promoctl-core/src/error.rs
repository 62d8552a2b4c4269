//! Error types for promotion, registry access and configuration.
//!
//! Uses `thiserror` for the public taxonomy. [`PromotionError`] is what callers
//! of the controller see; [`RegistryError`] is the narrower vocabulary spoken
//! by [`crate::registry::RegistryStore`] implementations.

use crate::registry::VersionId;

/// Top-level error type for promotion and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("Invalid environment '{name}' (expected one of: {})", .known.join(", "))]
    InvalidEnvironment { name: String, known: Vec<String> },

    #[error("No version of '{model}' is assigned to stage '{stage}'")]
    NoSourceAssignment { model: String, stage: String },

    #[error(
        "Quality gate failed for version {version}: accuracy {accuracy:.4} is below threshold {threshold}"
    )]
    QualityGateFailed {
        version: VersionId,
        accuracy: f64,
        threshold: f64,
    },

    #[error("Metric value {value} for version {version} is outside [0, 1]")]
    InvalidMetric { version: VersionId, value: f64 },

    #[error("Registry unavailable: {message}")]
    RegistryUnavailable { message: String },

    #[error("Failed to load artifact '{uri}': {message}")]
    ArtifactLoadFailed { uri: String, message: String },

    #[error("Failed to evaluate version {version}: {message}")]
    EvaluationFailed { version: VersionId, message: String },

    #[error("Registry error: {0}")]
    Registry(RegistryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PromotionError {
    /// Whether re-running the same request may succeed without operator action.
    ///
    /// Promotion is idempotent for an unchanged source version, so transient
    /// infrastructure failures are safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RegistryUnavailable { .. } | Self::ArtifactLoadFailed { .. }
        )
    }
}

impl From<RegistryError> for PromotionError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unavailable { message } => Self::RegistryUnavailable { message },
            other => Self::Registry(other),
        }
    }
}

/// Errors reported by a registry store.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("{message}")]
    Unavailable { message: String },

    #[error("Request rejected: {message}")]
    Rejected { message: String },

    #[error("Malformed registry response: {message}")]
    InvalidResponse { message: String },
}

impl RegistryError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Errors from configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid stage pipeline: {message}")]
    InvalidPipeline { message: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}
