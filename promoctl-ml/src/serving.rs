//! HTTP prediction endpoint built on axum.
//!
//! The served model is resolved and loaded once, before the listener starts,
//! and is never reloaded. Promoting a new version requires a restart.

use crate::artifact::ModelArtifact;
use crate::error::MlError;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use promoctl_core::{PromotionController, PromotionError, VersionId};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// The model held by a running server.
#[derive(Debug, Clone)]
pub struct ServingState {
    pub model_name: String,
    pub version: VersionId,
    pub source: String,
    pub artifact: ModelArtifact,
}

/// Thread-safe shared model reference for axum handlers.
pub type SharedModel = Arc<ServingState>;

impl ServingState {
    /// Resolve the version to serve through the controller and load its artifact.
    ///
    /// An explicit `version` wins over `alias`; with neither, the terminal
    /// stage of the pipeline is served.
    pub async fn resolve(
        controller: &PromotionController,
        version: Option<VersionId>,
        alias: Option<&str>,
    ) -> Result<Self, PromotionError> {
        let model_version = controller.resolve_version(version, alias).await?;
        let artifact = ModelArtifact::load(&model_version.source)
            .await
            .map_err(|e| PromotionError::ArtifactLoadFailed {
                uri: model_version.source.clone(),
                message: e.to_string(),
            })?;
        tracing::info!(
            model = %model_version.name,
            version = model_version.version,
            source = %model_version.source,
            "Loaded model for serving"
        );
        Ok(Self {
            model_name: model_version.name,
            version: model_version.version,
            source: model_version.source,
            artifact,
        })
    }
}

/// Accepted `/predict` payload shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictInput {
    /// `[[5.1, 3.5, 1.4, 0.2], ...]`
    Rows(Vec<Vec<f64>>),
    /// `[{"sepal length (cm)": 5.1, ...}, ...]`
    Records(Vec<BTreeMap<String, f64>>),
    /// `{"sepal length (cm)": [5.1, ...], ...}`
    Columns(BTreeMap<String, Vec<f64>>),
}

impl PredictInput {
    fn into_rows(self, features: &[String]) -> Result<Vec<Vec<f64>>, MlError> {
        match self {
            Self::Rows(rows) => Ok(rows),
            Self::Records(records) => records
                .iter()
                .enumerate()
                .map(|(i, record)| {
                    features
                        .iter()
                        .map(|name| {
                            record.get(name).copied().ok_or_else(|| {
                                MlError::invalid_input(format!("record {i} is missing '{name}'"))
                            })
                        })
                        .collect()
                })
                .collect(),
            Self::Columns(columns) => {
                let picked = features
                    .iter()
                    .map(|name| {
                        columns
                            .get(name)
                            .ok_or_else(|| MlError::invalid_input(format!("missing column '{name}'")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let len = picked.first().map_or(0, |c| c.len());
                if picked.iter().any(|c| c.len() != len) {
                    return Err(MlError::invalid_input("columns have different lengths"));
                }
                Ok((0..len).map(|i| picked.iter().map(|c| c[i]).collect()).collect())
            }
        }
    }
}

/// Build an axum Router with `/`, `/health` and `/predict` routes.
pub fn router(model: SharedModel) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/predict", post(predict_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(model)
}

async fn home_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "promoctl model serving is active" }))
}

async fn health_handler(State(model): State<SharedModel>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "model": model.model_name,
        "version": model.version,
    }))
}

async fn predict_handler(State(model): State<SharedModel>, body: Bytes) -> Response {
    match predict(&model, &body) {
        Ok(predictions) => Json(serde_json::json!({ "predictions": predictions })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Prediction request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn predict(model: &ServingState, body: &[u8]) -> Result<Vec<usize>, MlError> {
    let input: PredictInput = serde_json::from_slice(body)?;
    let rows = input.into_rows(&model.artifact.feature_names)?;
    model.artifact.predict(&rows)
}

/// Serve `model` on `host:port` until the process is stopped.
pub async fn run(model: SharedModel, host: &str, port: u16) -> Result<(), std::io::Error> {
    let app = router(model);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Serving predictions");
    axum::serve(listener, app).await?;
    Ok(())
}
