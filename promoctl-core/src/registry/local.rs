//! File-backed registry.
//!
//! Keeps every registered model, its versions and alias table in one JSON
//! document. Each operation re-reads the document, so separate processes
//! (CI jobs, an operator shell) observe each other's writes. Writes go to a
//! sibling `.tmp` file which is then renamed over the target.

use super::{ModelVersion, RegistryStore, VersionId};
use crate::error::RegistryError;
use crate::persistence;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Stage given to versions displaced by a stage transition.
const ARCHIVED_STAGE: &str = "Archived";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    models: BTreeMap<String, RegisteredModel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegisteredModel {
    /// Highest version ever issued.
    last_version: VersionId,
    #[serde(default)]
    versions: Vec<ModelVersion>,
    #[serde(default)]
    aliases: BTreeMap<String, VersionId>,
}

impl RegisteredModel {
    fn version(&self, version: VersionId) -> Option<ModelVersion> {
        self.versions
            .iter()
            .find(|v| v.version == version)
            .map(|v| self.decorate(v))
    }

    /// Fill in the alias list from the alias table.
    fn decorate(&self, version: &ModelVersion) -> ModelVersion {
        let mut out = version.clone();
        out.aliases = self
            .aliases
            .iter()
            .filter(|(_, v)| **v == version.version)
            .map(|(alias, _)| alias.clone())
            .collect();
        out
    }
}

/// JSON-file (or purely in-memory) model registry.
#[derive(Debug)]
pub struct LocalRegistry {
    path: Option<PathBuf>,
    state: Mutex<RegistryDocument>,
}

impl LocalRegistry {
    /// Registry persisted at `path`. The file is created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let doc = load_document(&path)?;
        Ok(Self {
            path: Some(path),
            state: Mutex::new(doc),
        })
    }

    /// Registry that lives only as long as this value.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(RegistryDocument::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn read<T>(
        &self,
        f: impl FnOnce(&RegistryDocument) -> T,
    ) -> Result<T, RegistryError> {
        let mut state = self.state.lock().await;
        if let Some(path) = &self.path {
            *state = load_document(path)?;
        }
        Ok(f(&state))
    }

    /// Apply `f` to a fresh copy of the document and persist it. The in-memory
    /// state only changes once the write has landed.
    async fn write<T>(
        &self,
        f: impl FnOnce(&mut RegistryDocument) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut state = self.state.lock().await;
        let mut next = match &self.path {
            Some(path) => load_document(path)?,
            None => state.clone(),
        };
        let out = f(&mut next)?;
        if let Some(path) = &self.path {
            save_document(path, &next)?;
        }
        *state = next;
        Ok(out)
    }
}

#[async_trait]
impl RegistryStore for LocalRegistry {
    fn backend(&self) -> &str {
        "local"
    }

    async fn get_version_by_alias(
        &self,
        model: &str,
        alias: &str,
    ) -> Result<Option<ModelVersion>, RegistryError> {
        self.read(|doc| {
            let entry = doc.models.get(model)?;
            let version = *entry.aliases.get(alias)?;
            entry.version(version)
        })
        .await
    }

    async fn set_alias(
        &self,
        model: &str,
        alias: &str,
        version: VersionId,
    ) -> Result<(), RegistryError> {
        self.write(|doc| {
            let entry = model_mut(doc, model)?;
            if entry.version(version).is_none() {
                return Err(RegistryError::not_found(format!(
                    "version {version} of model '{model}'"
                )));
            }
            entry.aliases.insert(alias.to_string(), version);
            Ok(())
        })
        .await
    }

    async fn transition_stage(
        &self,
        model: &str,
        version: VersionId,
        stage: &str,
    ) -> Result<(), RegistryError> {
        self.write(|doc| {
            let entry = model_mut(doc, model)?;
            if entry.version(version).is_none() {
                return Err(RegistryError::not_found(format!(
                    "version {version} of model '{model}'"
                )));
            }
            for v in &mut entry.versions {
                if v.version == version {
                    v.current_stage = Some(stage.to_string());
                } else if stage != ARCHIVED_STAGE && v.current_stage.as_deref() == Some(stage) {
                    v.current_stage = Some(ARCHIVED_STAGE.to_string());
                }
            }
            Ok(())
        })
        .await
    }

    async fn get_latest_version(
        &self,
        model: &str,
        stage: &str,
    ) -> Result<Option<ModelVersion>, RegistryError> {
        self.read(|doc| {
            let entry = doc.models.get(model)?;
            entry
                .versions
                .iter()
                .filter(|v| v.current_stage.as_deref() == Some(stage))
                .max_by_key(|v| v.version)
                .map(|v| entry.decorate(v))
        })
        .await
    }

    async fn get_version(
        &self,
        model: &str,
        version: VersionId,
    ) -> Result<Option<ModelVersion>, RegistryError> {
        self.read(|doc| doc.models.get(model).and_then(|m| m.version(version)))
            .await
    }

    async fn register_version(
        &self,
        model: &str,
        source: &str,
    ) -> Result<ModelVersion, RegistryError> {
        self.write(|doc| {
            let entry = doc.models.entry(model.to_string()).or_default();
            entry.last_version += 1;
            let registered = ModelVersion {
                name: model.to_string(),
                version: entry.last_version,
                source: source.to_string(),
                current_stage: None,
                aliases: Vec::new(),
                created_at: Some(Utc::now()),
            };
            entry.versions.push(registered.clone());
            Ok(registered)
        })
        .await
    }

    async fn list_versions(&self, model: &str) -> Result<Vec<ModelVersion>, RegistryError> {
        self.read(|doc| {
            doc.models
                .get(model)
                .map(|m| m.versions.iter().map(|v| m.decorate(v)).collect())
                .unwrap_or_default()
        })
        .await
    }
}

fn model_mut<'a>(
    doc: &'a mut RegistryDocument,
    model: &str,
) -> Result<&'a mut RegisteredModel, RegistryError> {
    doc.models
        .get_mut(model)
        .ok_or_else(|| RegistryError::not_found(format!("model '{model}'")))
}

fn load_document(path: &Path) -> Result<RegistryDocument, RegistryError> {
    match persistence::load_json(path) {
        Ok(doc) => Ok(doc.unwrap_or_default()),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            Err(RegistryError::InvalidResponse {
                message: format!("{}: {e}", path.display()),
            })
        }
        Err(e) => Err(RegistryError::unavailable(format!(
            "cannot read {}: {e}",
            path.display()
        ))),
    }
}

fn save_document(path: &Path, doc: &RegistryDocument) -> Result<(), RegistryError> {
    persistence::atomic_write_json(path, doc)
        .map_err(|e| RegistryError::unavailable(format!("cannot write {}: {e}", path.display())))
}
