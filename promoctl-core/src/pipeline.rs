//! Ordered promotion pipeline.
//!
//! A pipeline is a linear sequence of named stages. The first stage is filled
//! by the training producer; every later stage is filled only by promoting the
//! version held by its immediate predecessor. The last stage is the single
//! production stage. Both naming schemes seen in practice (the
//! Challenger/Champion alias chain and the dev/preprod/prod lanes) are just
//! different instances of this type.

use crate::error::{ConfigError, PromotionError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single named position in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Alias or stage label written to the registry.
    pub name: String,
    /// Lane key accepted by `promote <environment>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Minimum metric a version must reach to be promoted into this stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: None,
            threshold: None,
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// The key an operator uses to address this stage.
    pub fn lane(&self) -> &str {
        self.environment.as_deref().unwrap_or(&self.name)
    }

    fn matches(&self, key: &str) -> bool {
        self.name == key || self.environment.as_deref() == Some(key)
    }
}

/// A validated move from one stage to its immediate successor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition<'a> {
    pub source: &'a Stage,
    pub target: &'a Stage,
}

/// Linear sequence of stages with exactly one initial and one terminal stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagePipeline {
    stages: Vec<Stage>,
}

impl StagePipeline {
    /// Validate and build a pipeline.
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.len() < 2 {
            return Err(invalid("at least two stages are required"));
        }

        let mut names = HashSet::new();
        let mut lanes = HashSet::new();
        for stage in &stages {
            if stage.name.trim().is_empty() {
                return Err(invalid("stage names must not be empty"));
            }
            if !names.insert(stage.name.as_str()) {
                return Err(invalid(format!("duplicate stage '{}'", stage.name)));
            }
            if let Some(env) = &stage.environment {
                if env.trim().is_empty() {
                    return Err(invalid(format!(
                        "stage '{}' has an empty environment key",
                        stage.name
                    )));
                }
                if !lanes.insert(env.as_str()) {
                    return Err(invalid(format!("duplicate environment '{env}'")));
                }
            }
            if let Some(threshold) = stage.threshold {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(invalid(format!(
                        "threshold {threshold} for stage '{}' is outside [0, 1]",
                        stage.name
                    )));
                }
            }
        }

        // Environment keys and stage names share one namespace for lookups.
        for stage in &stages {
            if let Some(env) = &stage.environment {
                if env != &stage.name && names.contains(env.as_str()) {
                    return Err(invalid(format!(
                        "environment '{env}' of stage '{}' collides with a stage name",
                        stage.name
                    )));
                }
            }
        }

        if stages[0].threshold.is_some() {
            return Err(invalid(format!(
                "initial stage '{}' cannot carry a promotion threshold",
                stages[0].name
            )));
        }

        Ok(Self { stages })
    }

    /// `Challenger` → `Challenger-pre-test` → `Challenger-post-test` → `Champion`,
    /// addressed as the `dev`, `preprod` and `prod` lanes.
    pub fn challenger_champion() -> Self {
        Self {
            stages: challenger_champion_stages(),
        }
    }

    /// `candidate` → `dev` → `preprod` → `prod`, each promotion gated at 0.9.
    pub fn dev_preprod_prod() -> Self {
        Self {
            stages: vec![
                Stage::new("candidate"),
                Stage::new("dev").with_threshold(0.9),
                Stage::new("preprod").with_threshold(0.9),
                Stage::new("prod").with_threshold(0.9),
            ],
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage populated by the training producer.
    pub fn initial(&self) -> &Stage {
        &self.stages[0]
    }

    /// The production stage.
    pub fn terminal(&self) -> &Stage {
        &self.stages[self.stages.len() - 1]
    }

    /// Look up a stage by name or environment key.
    pub fn stage(&self, key: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.matches(key))
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.matches(key))
    }

    /// True only when `to` immediately follows `from`.
    pub fn is_adjacent(&self, from: &str, to: &str) -> bool {
        match (self.position(from), self.position(to)) {
            (Some(a), Some(b)) => b == a + 1,
            _ => false,
        }
    }

    /// Keys accepted as promotion targets, in pipeline order.
    pub fn lanes(&self) -> Vec<String> {
        self.stages[1..].iter().map(|s| s.lane().to_string()).collect()
    }

    /// Resolve a promotion target to the transition that fills it.
    pub fn resolve(&self, target: &str) -> Result<Transition<'_>, PromotionError> {
        let key = target.trim();
        match self.position(key) {
            Some(idx) if idx > 0 => Ok(Transition {
                source: &self.stages[idx - 1],
                target: &self.stages[idx],
            }),
            _ => Err(PromotionError::InvalidEnvironment {
                name: target.to_string(),
                known: self.lanes(),
            }),
        }
    }
}

impl Default for StagePipeline {
    fn default() -> Self {
        Self::challenger_champion()
    }
}

pub(crate) fn challenger_champion_stages() -> Vec<Stage> {
    vec![
        Stage::new("Challenger"),
        Stage::new("Challenger-pre-test")
            .with_environment("dev")
            .with_threshold(0.8),
        Stage::new("Challenger-post-test")
            .with_environment("preprod")
            .with_threshold(0.9),
        Stage::new("Champion")
            .with_environment("prod")
            .with_threshold(0.9),
    ]
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidPipeline {
        message: message.into(),
    }
}
