//! MLflow model registry client (REST API 2.0).

use super::{ModelVersion, RegistryStore, VersionId};
use crate::error::RegistryError;
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

const API_PREFIX: &str = "api/2.0/mlflow";

/// Registry backed by an MLflow tracking server.
#[derive(Debug, Clone)]
pub struct MlflowRegistry {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct MlflowModelVersion {
    name: String,
    version: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    current_stage: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    creation_timestamp: Option<i64>,
}

impl TryFrom<MlflowModelVersion> for ModelVersion {
    type Error = RegistryError;

    fn try_from(v: MlflowModelVersion) -> Result<Self, Self::Error> {
        let version = v
            .version
            .parse::<VersionId>()
            .map_err(|e| RegistryError::InvalidResponse {
                message: format!("version '{}' is not an integer: {e}", v.version),
            })?;
        Ok(ModelVersion {
            name: v.name,
            version,
            source: v.source,
            // MLflow reports unstaged versions as the literal stage "None".
            current_stage: v.current_stage.filter(|s| s != "None"),
            aliases: v.aliases,
            created_at: v.creation_timestamp.and_then(DateTime::from_timestamp_millis),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SingleVersion {
    model_version: MlflowModelVersion,
}

#[derive(Debug, Default, Deserialize)]
struct VersionList {
    #[serde(default)]
    model_versions: Vec<MlflowModelVersion>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

impl ApiError {
    fn is_missing(&self) -> bool {
        self.error_code == "RESOURCE_DOES_NOT_EXIST"
            || (self.error_code == "INVALID_PARAMETER_VALUE"
                && self.message.to_lowercase().contains("not found"))
    }
}

impl MlflowRegistry {
    /// Create a client for the tracking server at `tracking_uri`.
    pub fn new(tracking_uri: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("promoctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: tracking_uri.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{API_PREFIX}/{path}", self.base_url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, RegistryError> {
        let request = self.client.get(self.endpoint(path)).query(query);
        self.execute(request).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Option<T>, RegistryError> {
        let request = self.client.post(self.endpoint(path)).json(&body);
        self.execute(request).await
    }

    /// Send a request. `Ok(None)` means the server reported the resource missing.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, RegistryError> {
        let response = request.send().await.map_err(|e| {
            RegistryError::unavailable(format!("tracking server {} unreachable: {e}", self.base_url))
        })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RegistryError::unavailable(format!(
                "tracking server returned status {status}"
            )));
        }
        if !status.is_success() {
            let err: ApiError = response.json().await.unwrap_or_default();
            if status == reqwest::StatusCode::NOT_FOUND || err.is_missing() {
                return Ok(None);
            }
            return Err(RegistryError::Rejected {
                message: format!("{status} {}: {}", err.error_code, err.message),
            });
        }

        let body = response.json::<T>().await.map_err(|e| RegistryError::InvalidResponse {
            message: e.to_string(),
        })?;
        Ok(Some(body))
    }

    async fn ensure_registered_model(&self, model: &str) -> Result<(), RegistryError> {
        let response = self
            .client
            .post(self.endpoint("registered-models/create"))
            .json(&json!({ "name": model }))
            .send()
            .await
            .map_err(|e| RegistryError::unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(model, "Created registered model");
            return Ok(());
        }
        if status.is_server_error() {
            return Err(RegistryError::unavailable(format!(
                "tracking server returned status {status}"
            )));
        }
        let err: ApiError = response.json().await.unwrap_or_default();
        if err.error_code == "RESOURCE_ALREADY_EXISTS" {
            return Ok(());
        }
        Err(RegistryError::Rejected {
            message: format!("{status} {}: {}", err.error_code, err.message),
        })
    }
}

#[async_trait]
impl RegistryStore for MlflowRegistry {
    fn backend(&self) -> &str {
        "mlflow"
    }

    async fn get_version_by_alias(
        &self,
        model: &str,
        alias: &str,
    ) -> Result<Option<ModelVersion>, RegistryError> {
        let found: Option<SingleVersion> = self
            .get("registered-models/alias", &[("name", model), ("alias", alias)])
            .await?;
        found.map(|r| r.model_version.try_into()).transpose()
    }

    async fn set_alias(
        &self,
        model: &str,
        alias: &str,
        version: VersionId,
    ) -> Result<(), RegistryError> {
        let body = json!({ "name": model, "alias": alias, "version": version.to_string() });
        self.post::<serde_json::Value>("registered-models/alias", body)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("version {version} of model '{model}'")))?;
        Ok(())
    }

    async fn transition_stage(
        &self,
        model: &str,
        version: VersionId,
        stage: &str,
    ) -> Result<(), RegistryError> {
        let body = json!({
            "name": model,
            "version": version.to_string(),
            "stage": stage,
            "archive_existing_versions": true,
        });
        self.post::<serde_json::Value>("model-versions/transition-stage", body)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("version {version} of model '{model}'")))?;
        Ok(())
    }

    async fn get_latest_version(
        &self,
        model: &str,
        stage: &str,
    ) -> Result<Option<ModelVersion>, RegistryError> {
        let body = json!({ "name": model, "stages": [stage] });
        let list: Option<VersionList> = self
            .post("registered-models/get-latest-versions", body)
            .await?;
        let mut versions = list
            .unwrap_or_default()
            .model_versions
            .into_iter()
            .map(ModelVersion::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        versions.retain(|v| v.current_stage.as_deref() == Some(stage));
        Ok(versions.into_iter().max_by_key(|v| v.version))
    }

    async fn get_version(
        &self,
        model: &str,
        version: VersionId,
    ) -> Result<Option<ModelVersion>, RegistryError> {
        let version = version.to_string();
        let found: Option<SingleVersion> = self
            .get("model-versions/get", &[("name", model), ("version", version.as_str())])
            .await?;
        found.map(|r| r.model_version.try_into()).transpose()
    }

    async fn register_version(
        &self,
        model: &str,
        source: &str,
    ) -> Result<ModelVersion, RegistryError> {
        self.ensure_registered_model(model).await?;
        let body = json!({ "name": model, "source": source });
        let created: SingleVersion = self
            .post("model-versions/create", body)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("model '{model}'")))?;
        created.model_version.try_into()
    }

    async fn list_versions(&self, model: &str) -> Result<Vec<ModelVersion>, RegistryError> {
        let filter = format!("name='{}'", model.replace('\'', "\\'"));
        let list: Option<VersionList> = self
            .get("model-versions/search", &[("filter", filter.as_str())])
            .await?;
        let mut versions = list
            .unwrap_or_default()
            .model_versions
            .into_iter()
            .map(ModelVersion::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let reg = MlflowRegistry::new("http://localhost:5000/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            reg.endpoint("registered-models/alias"),
            "http://localhost:5000/api/2.0/mlflow/registered-models/alias"
        );
    }

    #[test]
    fn test_convert_version_payload() {
        let raw: MlflowModelVersion = serde_json::from_value(json!({
            "name": "iris_classifier",
            "version": "10",
            "source": "runs:/abc/model",
            "current_stage": "None",
            "aliases": ["Challenger"],
            "creation_timestamp": 1_700_000_000_000i64,
        }))
        .unwrap();
        let v = ModelVersion::try_from(raw).unwrap();
        assert_eq!(v.version, 10);
        assert!(v.current_stage.is_none());
        assert_eq!(v.aliases, vec!["Challenger".to_string()]);
        assert!(v.created_at.is_some());
    }

    #[test]
    fn test_non_numeric_version_rejected() {
        let raw: MlflowModelVersion =
            serde_json::from_value(json!({ "name": "iris", "version": "latest" })).unwrap();
        assert!(matches!(
            ModelVersion::try_from(raw),
            Err(RegistryError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_missing_error_codes() {
        let missing = ApiError {
            error_code: "RESOURCE_DOES_NOT_EXIST".into(),
            message: String::new(),
        };
        let alias_missing = ApiError {
            error_code: "INVALID_PARAMETER_VALUE".into(),
            message: "Registered model alias Champion not found.".into(),
        };
        let bad = ApiError {
            error_code: "INVALID_PARAMETER_VALUE".into(),
            message: "version must be an integer".into(),
        };
        assert!(missing.is_missing());
        assert!(alias_missing.is_missing());
        assert!(!bad.is_missing());
    }
}
