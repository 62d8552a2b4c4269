//! Configuration system for promoctl.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/promoctl/config.toml` and/or
//! `.promoctl/config.toml` in the workspace directory.

use crate::error::ConfigError;
use crate::pipeline::{Stage, StagePipeline, challenger_champion_stages};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the tracking server URI.
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteConfig {
    /// Registered model family promoted by this pipeline.
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub serving: ServingConfig,
}

impl Default for PromoteConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            registry: RegistryConfig::default(),
            pipeline: PipelineConfig::default(),
            evaluation: EvaluationConfig::default(),
            serving: ServingConfig::default(),
        }
    }
}

fn default_model_name() -> String {
    "iris_classifier".to_string()
}

/// Which registry implementation backs the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// JSON file in the workspace.
    #[default]
    Local,
    /// MLflow tracking server over REST.
    Mlflow,
}

/// Registry connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub backend: RegistryBackend,
    /// Base URI of the tracking server.
    #[serde(default = "default_tracking_uri")]
    pub tracking_uri: String,
    /// Registry file used by the local backend, relative to the workspace.
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,
    /// Per-request timeout for the tracking server.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::Local,
            tracking_uri: default_tracking_uri(),
            local_path: default_local_path(),
            timeout_secs: default_request_timeout(),
        }
    }
}

fn default_tracking_uri() -> String {
    "http://localhost:5000".to_string()
}

fn default_local_path() -> PathBuf {
    PathBuf::from(".promoctl/registry.json")
}

fn default_request_timeout() -> u64 {
    30
}

/// How a stage assignment is represented in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentMode {
    /// Stage names are registered-model aliases.
    #[default]
    Alias,
    /// Stage names are model-version stages.
    Stage,
}

/// Stage pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub mode: AssignmentMode,
    #[serde(default = "challenger_champion_stages")]
    pub stages: Vec<Stage>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: AssignmentMode::Alias,
            stages: challenger_champion_stages(),
        }
    }
}

impl PipelineConfig {
    /// Validate the configured stages.
    pub fn build(&self) -> Result<StagePipeline, ConfigError> {
        StagePipeline::new(self.stages.clone())
    }
}

/// Pinned rule for deriving the evaluation rows from the dataset.
///
/// The variants select different rows and are never interchangeable; switching
/// policy changes every recorded gate result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Every row.
    Full,
    /// Every `step`-th row starting at `offset`.
    Stride { step: usize, offset: usize },
    /// Seeded shuffle; the first `ceil(n * test_fraction)` rows form the test set.
    SeededHoldout { test_fraction: f64, seed: u64 },
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self::Stride { step: 3, offset: 0 }
    }
}

impl SplitPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::Full => Ok(()),
            Self::Stride { step, .. } if step == 0 => Err(ConfigError::InvalidValue {
                field: "evaluation.split.step".into(),
                message: "must be at least 1".into(),
            }),
            Self::Stride { .. } => Ok(()),
            Self::SeededHoldout { test_fraction, .. }
                if !(test_fraction > 0.0 && test_fraction <= 1.0) =>
            {
                Err(ConfigError::InvalidValue {
                    field: "evaluation.split.test_fraction".into(),
                    message: format!("{test_fraction} is outside (0, 1]"),
                })
            }
            Self::SeededHoldout { .. } => Ok(()),
        }
    }
}

/// Quality gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Run the gate on promotions into stages that carry a threshold.
    #[serde(default = "default_true")]
    pub gate_enabled: bool,
    /// Threshold used when evaluating a stage directly.
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    #[serde(default)]
    pub split: SplitPolicy,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            gate_enabled: true,
            default_threshold: default_threshold(),
            split: SplitPolicy::default(),
        }
    }
}

fn default_threshold() -> f64 {
    0.9
}

fn default_true() -> bool {
    true
}

/// Prediction endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingConfig {
    #[serde(default = "default_serve_host")]
    pub host: String,
    #[serde(default = "default_serve_port")]
    pub port: u16,
    /// Version to serve; takes precedence over `model_alias`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<u64>,
    /// Alias resolved once at startup; defaults to the terminal stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_alias: Option<String>,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            host: default_serve_host(),
            port: default_serve_port(),
            model_version: None,
            model_alias: None,
        }
    }
}

fn default_serve_host() -> String {
    "0.0.0.0".to_string()
}

fn default_serve_port() -> u16 {
    5004
}

impl PromoteConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "model_name".into(),
                message: "must not be empty".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.evaluation.default_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "evaluation.default_threshold".into(),
                message: format!("{} is outside [0, 1]", self.evaluation.default_threshold),
            });
        }
        self.evaluation.split.validate()?;
        self.pipeline.build()?;
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `PROMOCTL_`)
/// 3. `MLFLOW_TRACKING_URI`
/// 4. Explicit config file, if given
/// 5. Workspace-local config (`.promoctl/config.toml`)
/// 6. User config (`~/.config/promoctl/config.toml`)
/// 7. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&PromoteConfig>,
) -> Result<PromoteConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(PromoteConfig::default()));

    // User-level config
    if let Some(dirs) = directories::ProjectDirs::from("dev", "promoctl", "promoctl") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".promoctl").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(
        Env::raw()
            .only(&[TRACKING_URI_ENV])
            .map(|_| "registry.tracking_uri".into()),
    );

    // PROMOCTL_REGISTRY__BACKEND, PROMOCTL_EVALUATION__GATE_ENABLED, etc.
    figment = figment.merge(Env::prefixed("PROMOCTL_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: PromoteConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}
