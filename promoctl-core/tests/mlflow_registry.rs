//! MLflow registry client against an in-process mock tracking server.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use promoctl_core::registry::MlflowRegistry;
use promoctl_core::{
    PromotionController, PromotionError, RegistryError, RegistryStore, StagePipeline,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    /// (version, source, stage)
    versions: Vec<(u64, String, String)>,
    aliases: BTreeMap<String, u64>,
    models: Vec<String>,
}

type Shared = Arc<Mutex<MockState>>;

fn version_json(state: &MockState, version: u64) -> Option<Value> {
    let (v, source, stage) = state.versions.iter().find(|(v, _, _)| *v == version)?;
    let aliases: Vec<&String> = state
        .aliases
        .iter()
        .filter(|(_, target)| **target == *v)
        .map(|(alias, _)| alias)
        .collect();
    Some(json!({
        "name": "iris",
        "version": v.to_string(),
        "source": source,
        "current_stage": stage,
        "aliases": aliases,
        "creation_timestamp": 1_700_000_000_000i64,
    }))
}

fn missing(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error_code": "RESOURCE_DOES_NOT_EXIST", "message": message })),
    )
        .into_response()
}

async fn get_alias(
    State(state): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let state = state.lock().unwrap();
    let Some(version) = q.get("alias").and_then(|a| state.aliases.get(a)) else {
        // MLflow answers a missing alias with a 400 rather than a 404.
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error_code": "INVALID_PARAMETER_VALUE",
                "message": "Registered model alias not found.",
            })),
        )
            .into_response();
    };
    match version_json(&state, *version) {
        Some(v) => Json(json!({ "model_version": v })).into_response(),
        None => missing("version"),
    }
}

#[derive(Deserialize)]
struct SetAlias {
    alias: String,
    version: String,
}

async fn set_alias(State(state): State<Shared>, Json(body): Json<SetAlias>) -> Response {
    let mut state = state.lock().unwrap();
    let Ok(version) = body.version.parse::<u64>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error_code": "INVALID_PARAMETER_VALUE", "message": "bad version" })),
        )
            .into_response();
    };
    if !state.versions.iter().any(|(v, _, _)| *v == version) {
        return missing("model version");
    }
    state.aliases.insert(body.alias, version);
    Json(json!({})).into_response()
}

#[derive(Deserialize)]
struct Transition {
    version: String,
    stage: String,
    archive_existing_versions: bool,
}

async fn transition(State(state): State<Shared>, Json(body): Json<Transition>) -> Response {
    let mut state = state.lock().unwrap();
    let version: u64 = body.version.parse().unwrap_or(0);
    if !state.versions.iter().any(|(v, _, _)| *v == version) {
        return missing("model version");
    }
    for (v, _, stage) in &mut state.versions {
        if *v == version {
            *stage = body.stage.clone();
        } else if body.archive_existing_versions && *stage == body.stage {
            *stage = "Archived".into();
        }
    }
    let model_version = version_json(&state, version);
    Json(json!({ "model_version": model_version })).into_response()
}

#[derive(Deserialize)]
struct LatestVersions {
    stages: Vec<String>,
}

async fn latest_versions(State(state): State<Shared>, Json(body): Json<LatestVersions>) -> Response {
    let state = state.lock().unwrap();
    let found: Vec<Value> = state
        .versions
        .iter()
        .filter(|(_, _, stage)| body.stages.contains(stage))
        .filter_map(|(v, _, _)| version_json(&state, *v))
        .collect();
    Json(json!({ "model_versions": found })).into_response()
}

async fn get_version(
    State(state): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let state = state.lock().unwrap();
    let version = q.get("version").and_then(|v| v.parse().ok()).unwrap_or(0);
    match version_json(&state, version) {
        Some(v) => Json(json!({ "model_version": v })).into_response(),
        None => missing("model version"),
    }
}

async fn create_model(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    let name = body["name"].as_str().unwrap_or_default().to_string();
    if state.models.contains(&name) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error_code": "RESOURCE_ALREADY_EXISTS", "message": "exists" })),
        )
            .into_response();
    }
    state.models.push(name.clone());
    Json(json!({ "registered_model": { "name": name } })).into_response()
}

async fn create_version(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    let next = state.versions.len() as u64 + 1;
    let source = body["source"].as_str().unwrap_or_default().to_string();
    state.versions.push((next, source, "None".into()));
    let model_version = version_json(&state, next);
    Json(json!({ "model_version": model_version })).into_response()
}

async fn search(State(state): State<Shared>, Query(q): Query<HashMap<String, String>>) -> Response {
    let state = state.lock().unwrap();
    if q.get("filter").map(String::as_str) != Some("name='iris'") {
        return Json(json!({})).into_response();
    }
    let all: Vec<Value> = state
        .versions
        .iter()
        .rev()
        .filter_map(|(v, _, _)| version_json(&state, *v))
        .collect();
    Json(json!({ "model_versions": all })).into_response()
}

async fn broken() -> Response {
    StatusCode::SERVICE_UNAVAILABLE.into_response()
}

async fn spawn_mock() -> (String, Shared) {
    let state: Shared = Arc::default();
    let app = Router::new()
        .route(
            "/api/2.0/mlflow/registered-models/alias",
            get(get_alias).post(set_alias),
        )
        .route(
            "/api/2.0/mlflow/model-versions/transition-stage",
            post(transition),
        )
        .route(
            "/api/2.0/mlflow/registered-models/get-latest-versions",
            post(latest_versions),
        )
        .route("/api/2.0/mlflow/model-versions/get", get(get_version))
        .route("/api/2.0/mlflow/registered-models/create", post(create_model))
        .route("/api/2.0/mlflow/model-versions/create", post(create_version))
        .route("/api/2.0/mlflow/model-versions/search", get(search))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn client(uri: &str) -> MlflowRegistry {
    MlflowRegistry::new(uri, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_register_and_alias_roundtrip() {
    let (uri, state) = spawn_mock().await;
    let reg = client(&uri);

    let v1 = reg.register_version("iris", "runs:/a/model").await.unwrap();
    let v2 = reg.register_version("iris", "runs:/b/model").await.unwrap();
    assert_eq!((v1.version, v2.version), (1, 2));
    assert!(v1.current_stage.is_none());
    assert_eq!(state.lock().unwrap().models, vec!["iris".to_string()]);

    assert!(reg.get_version_by_alias("iris", "Champion").await.unwrap().is_none());
    reg.set_alias("iris", "Champion", 2).await.unwrap();
    let champion = reg.get_version_by_alias("iris", "Champion").await.unwrap().unwrap();
    assert_eq!(champion.version, 2);
    assert_eq!(champion.source, "runs:/b/model");
    assert_eq!(champion.aliases, vec!["Champion".to_string()]);

    let listed = reg.list_versions("iris").await.unwrap();
    assert_eq!(listed.iter().map(|v| v.version).collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test]
async fn test_set_alias_on_unknown_version() {
    let (uri, _) = spawn_mock().await;
    let reg = client(&uri);
    let err = reg.set_alias("iris", "Champion", 4).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { .. }));
    assert!(reg.get_version("iris", 4).await.unwrap().is_none());
}

#[tokio::test]
async fn test_stage_transition_archives() {
    let (uri, _) = spawn_mock().await;
    let reg = client(&uri);
    reg.register_version("iris", "a").await.unwrap();
    reg.register_version("iris", "b").await.unwrap();

    reg.transition_stage("iris", 1, "Production").await.unwrap();
    reg.transition_stage("iris", 2, "Production").await.unwrap();

    let prod = reg.get_latest_version("iris", "Production").await.unwrap().unwrap();
    assert_eq!(prod.version, 2);
    let old = reg.get_version("iris", 1).await.unwrap().unwrap();
    assert_eq!(old.current_stage.as_deref(), Some("Archived"));
    assert!(reg.get_latest_version("iris", "Staging").await.unwrap().is_none());
}

#[tokio::test]
async fn test_controller_promotes_through_mlflow() {
    let (uri, _) = spawn_mock().await;
    let reg = Arc::new(client(&uri));
    let controller = PromotionController::new("iris", StagePipeline::challenger_champion(), reg.clone());

    let registered = controller.register_candidate("runs:/c/model").await.unwrap();
    assert_eq!(registered.aliases, vec!["Challenger".to_string()]);

    let outcome = controller.promote("dev").await.unwrap();
    assert_eq!(outcome.version, registered.version);
    assert_eq!(outcome.target_stage, "Challenger-pre-test");

    let status = controller.status().await.unwrap();
    assert_eq!(status[1].version, Some(registered.version));
    assert_eq!(status[2].version, None);
}

#[tokio::test]
async fn test_server_errors_are_unavailable() {
    let app = Router::new().fallback(broken);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let reg = Arc::new(client(&format!("http://{addr}")));

    let err = reg.get_version_by_alias("iris", "Challenger").await.unwrap_err();
    assert!(matches!(err, RegistryError::Unavailable { .. }));

    let controller = PromotionController::new("iris", StagePipeline::default(), reg);
    let err = controller.promote("dev").await.unwrap_err();
    assert!(matches!(err, PromotionError::RegistryUnavailable { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_unreachable_server() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let reg = MlflowRegistry::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let err = reg.list_versions("iris").await.unwrap_err();
    assert!(matches!(err, RegistryError::Unavailable { .. }));
}
