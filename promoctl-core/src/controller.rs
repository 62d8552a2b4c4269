//! Promotion controller.
//!
//! Moves a model version from one stage of the pipeline to the next. A
//! promotion resolves the version held by the preceding stage, runs the
//! quality gate when the target stage carries a threshold, and then writes
//! that exact version to the target stage. The write is the last step, so a
//! failure anywhere earlier leaves the registry untouched.

use crate::config::{AssignmentMode, PromoteConfig};
use crate::error::{ConfigError, PromotionError, RegistryError};
use crate::gate::{Evaluation, QualityGate};
use crate::pipeline::{Stage, StagePipeline};
use crate::registry::{ModelVersion, RegistryStore, VersionId};
use serde::Serialize;
use std::sync::Arc;

/// Result of a successful promotion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionOutcome {
    pub model_name: String,
    pub source_stage: String,
    pub target_stage: String,
    pub version: VersionId,
    /// The target already held `version` and nothing was written.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_promoted: bool,
    /// Present when the gate ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
}

/// Current occupant of one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageAssignment {
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub version: Option<VersionId>,
}

/// Drives promotions for one registered model.
pub struct PromotionController {
    model_name: String,
    pipeline: StagePipeline,
    mode: AssignmentMode,
    default_threshold: f64,
    registry: Arc<dyn RegistryStore>,
    gate: Option<Arc<dyn QualityGate>>,
}

impl std::fmt::Debug for PromotionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromotionController")
            .field("model_name", &self.model_name)
            .field("mode", &self.mode)
            .field("stages", &self.pipeline.len())
            .field("registry", &self.registry.backend())
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

impl PromotionController {
    /// Ungated, alias-mode controller.
    pub fn new(
        model_name: impl Into<String>,
        pipeline: StagePipeline,
        registry: Arc<dyn RegistryStore>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            pipeline,
            mode: AssignmentMode::Alias,
            default_threshold: 0.9,
            registry,
            gate: None,
        }
    }

    /// Build from configuration. `gate` is ignored when gating is disabled.
    pub fn from_config(
        config: &PromoteConfig,
        registry: Arc<dyn RegistryStore>,
        gate: Option<Arc<dyn QualityGate>>,
    ) -> Result<Self, ConfigError> {
        let pipeline = config.pipeline.build()?;
        let mut controller = Self::new(&config.model_name, pipeline, registry)
            .with_mode(config.pipeline.mode)
            .with_default_threshold(config.evaluation.default_threshold);
        if config.evaluation.gate_enabled {
            if let Some(gate) = gate {
                controller = controller.with_gate(gate);
            }
        }
        Ok(controller)
    }

    pub fn with_mode(mut self, mode: AssignmentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn QualityGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_default_threshold(mut self, threshold: f64) -> Self {
        self.default_threshold = threshold;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn pipeline(&self) -> &StagePipeline {
        &self.pipeline
    }

    pub fn mode(&self) -> AssignmentMode {
        self.mode
    }

    /// Promote the version held by the stage preceding `target` into `target`.
    ///
    /// `target` is an environment key (`dev`, `prod`, ...) or a stage name.
    /// Re-running with an unchanged source version rewrites the same value.
    /// In stage mode the version leaves its source stage, so a repeat finds
    /// the source empty and reports the target's holder as already promoted.
    pub async fn promote(&self, target: &str) -> Result<PromotionOutcome, PromotionError> {
        let transition = self.pipeline.resolve(target)?;
        let (source, target) = (transition.source, transition.target);

        let candidate = match self.require(source).await {
            Ok(candidate) => candidate,
            Err(err @ PromotionError::NoSourceAssignment { .. })
                if self.mode == AssignmentMode::Stage =>
            {
                let Some(held) = self.current(&target.name).await? else {
                    return Err(err);
                };
                tracing::info!(
                    model = %self.model_name,
                    version = held.version,
                    from = %source.name,
                    to = %target.name,
                    "Source stage is empty and target is occupied, nothing to promote"
                );
                return Ok(PromotionOutcome {
                    model_name: self.model_name.clone(),
                    source_stage: source.name.clone(),
                    target_stage: target.name.clone(),
                    version: held.version,
                    already_promoted: true,
                    evaluation: None,
                });
            }
            Err(err) => return Err(err),
        };
        tracing::info!(
            model = %self.model_name,
            version = candidate.version,
            from = %source.name,
            to = %target.name,
            "Resolved promotion candidate"
        );

        let evaluation = match (target.threshold, &self.gate) {
            (Some(threshold), Some(gate)) => {
                let eval = self.score(gate.as_ref(), &candidate, threshold).await?;
                if !eval.passed {
                    tracing::warn!(
                        model = %self.model_name,
                        version = eval.version,
                        accuracy = eval.accuracy,
                        threshold,
                        "Quality gate rejected promotion"
                    );
                    return Err(PromotionError::QualityGateFailed {
                        version: eval.version,
                        accuracy: eval.accuracy,
                        threshold,
                    });
                }
                Some(eval)
            }
            (Some(_), None) => {
                tracing::debug!(to = %target.name, "Quality gate disabled, skipping");
                None
            }
            (None, _) => None,
        };

        self.assign(&target.name, candidate.version).await?;
        tracing::info!(
            model = %self.model_name,
            version = candidate.version,
            stage = %target.name,
            mode = ?self.mode,
            "Promotion complete"
        );

        Ok(PromotionOutcome {
            model_name: self.model_name.clone(),
            source_stage: source.name.clone(),
            target_stage: target.name.clone(),
            version: candidate.version,
            already_promoted: false,
            evaluation,
        })
    }

    /// Score `version` against the threshold of the `environment` lane.
    ///
    /// The initial stage is not a promotion target and uses the default
    /// threshold. Read-only: the registry is never written.
    pub async fn evaluate(
        &self,
        version: VersionId,
        environment: &str,
    ) -> Result<Evaluation, PromotionError> {
        let threshold = if self.pipeline.position(environment.trim()) == Some(0) {
            self.default_threshold
        } else {
            let transition = self.pipeline.resolve(environment)?;
            transition.target.threshold.unwrap_or(self.default_threshold)
        };
        let model_version = self
            .registry
            .get_version(&self.model_name, version)
            .await?
            .ok_or_else(|| {
                RegistryError::not_found(format!("version {version} of model '{}'", self.model_name))
            })?;
        self.score(self.gate()?, &model_version, threshold).await
    }

    /// Evaluate whatever `key` currently refers to.
    ///
    /// A lane key (the environment of a promotion target, or its name when it
    /// has no environment) checks the candidate for that lane, the occupant of
    /// the preceding stage, against the lane's threshold exactly as
    /// [`promote`](Self::promote) would. Any other stage name checks the
    /// occupant of that stage against the default threshold. `threshold`
    /// overrides either.
    pub async fn check(
        &self,
        key: &str,
        threshold: Option<f64>,
    ) -> Result<Evaluation, PromotionError> {
        let gate = self.gate()?;
        let key = key.trim();

        let lane = self.pipeline.stages()[1..].iter().any(|s| s.lane() == key);

        let (stage, lane_threshold) = if lane {
            let transition = self.pipeline.resolve(key)?;
            (transition.source, transition.target.threshold)
        } else {
            let stage = self
                .pipeline
                .stages()
                .iter()
                .find(|s| s.name == key)
                .ok_or_else(|| PromotionError::InvalidEnvironment {
                    name: key.to_string(),
                    known: self.keys(),
                })?;
            (stage, None)
        };

        let candidate = self.require(stage).await?;
        let threshold = threshold
            .or(lane_threshold)
            .unwrap_or(self.default_threshold);
        self.score(gate, &candidate, threshold).await
    }

    /// Register a freshly trained artifact and place it in the initial stage.
    pub async fn register_candidate(&self, source: &str) -> Result<ModelVersion, PromotionError> {
        let registered = self
            .registry
            .register_version(&self.model_name, source)
            .await?;
        let initial = self.pipeline.initial();
        self.assign(&initial.name, registered.version).await?;
        tracing::info!(
            model = %self.model_name,
            version = registered.version,
            stage = %initial.name,
            source,
            "Registered candidate"
        );
        self.registry
            .get_version(&self.model_name, registered.version)
            .await?
            .ok_or_else(|| {
                RegistryError::not_found(format!(
                    "version {} of model '{}'",
                    registered.version, self.model_name
                ))
                .into()
            })
    }

    /// Version currently assigned to `stage`.
    pub async fn current(&self, stage: &str) -> Result<Option<ModelVersion>, PromotionError> {
        let found = match self.mode {
            AssignmentMode::Alias => {
                self.registry
                    .get_version_by_alias(&self.model_name, stage)
                    .await?
            }
            AssignmentMode::Stage => {
                self.registry
                    .get_latest_version(&self.model_name, stage)
                    .await?
            }
        };
        tracing::debug!(
            model = %self.model_name,
            stage,
            version = found.as_ref().map(|v| v.version),
            "Read stage assignment"
        );
        Ok(found)
    }

    /// Assignment of every stage, in pipeline order.
    pub async fn status(&self) -> Result<Vec<StageAssignment>, PromotionError> {
        let mut out = Vec::with_capacity(self.pipeline.len());
        for stage in self.pipeline.stages() {
            let version = self.current(&stage.name).await?.map(|v| v.version);
            out.push(StageAssignment {
                stage: stage.name.clone(),
                environment: stage.environment.clone(),
                version,
            });
        }
        Ok(out)
    }

    /// Resolve the version to serve: an explicit version wins, otherwise the
    /// occupant of `stage` (default: the terminal stage).
    pub async fn resolve_version(
        &self,
        version: Option<VersionId>,
        stage: Option<&str>,
    ) -> Result<ModelVersion, PromotionError> {
        if let Some(version) = version {
            return self
                .registry
                .get_version(&self.model_name, version)
                .await?
                .ok_or_else(|| {
                    RegistryError::not_found(format!(
                        "version {version} of model '{}'",
                        self.model_name
                    ))
                    .into()
                });
        }
        let name = stage.unwrap_or(&self.pipeline.terminal().name);
        self.current(name)
            .await?
            .ok_or_else(|| PromotionError::NoSourceAssignment {
                model: self.model_name.clone(),
                stage: name.to_string(),
            })
    }

    async fn require(&self, stage: &Stage) -> Result<ModelVersion, PromotionError> {
        self.current(&stage.name)
            .await?
            .ok_or_else(|| PromotionError::NoSourceAssignment {
                model: self.model_name.clone(),
                stage: stage.name.clone(),
            })
    }

    async fn assign(&self, stage: &str, version: VersionId) -> Result<(), PromotionError> {
        match self.mode {
            AssignmentMode::Alias => {
                self.registry
                    .set_alias(&self.model_name, stage, version)
                    .await?
            }
            AssignmentMode::Stage => {
                self.registry
                    .transition_stage(&self.model_name, version, stage)
                    .await?
            }
        }
        Ok(())
    }

    async fn score(
        &self,
        gate: &dyn QualityGate,
        version: &ModelVersion,
        threshold: f64,
    ) -> Result<Evaluation, PromotionError> {
        let value = gate.score(version).await?;
        let eval = Evaluation::judge(version.version, value, threshold)?;
        tracing::info!(
            model = %self.model_name,
            version = version.version,
            metric = gate.metric(),
            value,
            threshold,
            passed = eval.passed,
            "Evaluated model version"
        );
        Ok(eval)
    }

    fn gate(&self) -> Result<&dyn QualityGate, PromotionError> {
        self.gate.as_deref().ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "evaluation.gate_enabled".into(),
                message: "no quality gate is configured".into(),
            }
            .into()
        })
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.pipeline.stages().iter().map(|s| s.name.clone()).collect();
        keys.extend(
            self.pipeline
                .stages()
                .iter()
                .filter_map(|s| s.environment.clone()),
        );
        keys
    }
}
