//! Registry store contract and implementations.
//!
//! The registry owns model versions and their alias/stage labels. The
//! controller never caches what it reads here; each promotion performs one
//! read and one write against the store.

mod local;
mod mlflow;

pub use local::LocalRegistry;
pub use mlflow::MlflowRegistry;

use crate::config::{RegistryBackend, RegistryConfig};
use crate::error::RegistryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Registry-assigned version number. Monotonically increasing, never reused.
pub type VersionId = u64;

/// A registered model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: VersionId,
    /// Artifact location (path, `file://` or `http(s)://` URI).
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Operations the promotion controller consumes from a model registry.
///
/// Implementations must make `set_alias` and `transition_stage` single-key
/// writes with last-writer-wins semantics; that is the only consistency the
/// controller relies on.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &str;

    /// Version currently labelled with `alias`, if any.
    async fn get_version_by_alias(
        &self,
        model: &str,
        alias: &str,
    ) -> Result<Option<ModelVersion>, RegistryError>;

    /// Point `alias` at `version`, replacing any previous target.
    async fn set_alias(
        &self,
        model: &str,
        alias: &str,
        version: VersionId,
    ) -> Result<(), RegistryError>;

    /// Move `version` into `stage`, archiving any other version held there.
    async fn transition_stage(
        &self,
        model: &str,
        version: VersionId,
        stage: &str,
    ) -> Result<(), RegistryError>;

    /// Highest version currently in `stage`, if any.
    async fn get_latest_version(
        &self,
        model: &str,
        stage: &str,
    ) -> Result<Option<ModelVersion>, RegistryError>;

    /// Fetch a specific version.
    async fn get_version(
        &self,
        model: &str,
        version: VersionId,
    ) -> Result<Option<ModelVersion>, RegistryError>;

    /// Register a new artifact, creating the model entry if needed.
    async fn register_version(
        &self,
        model: &str,
        source: &str,
    ) -> Result<ModelVersion, RegistryError>;

    /// All versions of `model`, ascending.
    async fn list_versions(&self, model: &str) -> Result<Vec<ModelVersion>, RegistryError>;
}

/// Open the registry selected by configuration.
///
/// Relative local paths are resolved against `workspace`.
pub fn open(
    config: &RegistryConfig,
    workspace: &Path,
) -> Result<Arc<dyn RegistryStore>, RegistryError> {
    match config.backend {
        RegistryBackend::Local => {
            let path = if config.local_path.is_absolute() {
                config.local_path.clone()
            } else {
                workspace.join(&config.local_path)
            };
            Ok(Arc::new(LocalRegistry::open(path)?))
        }
        RegistryBackend::Mlflow => Ok(Arc::new(MlflowRegistry::new(
            &config.tracking_uri,
            Duration::from_secs(config.timeout_secs),
        )?)),
    }
}
