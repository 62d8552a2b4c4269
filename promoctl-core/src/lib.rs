//! # promoctl-core: gated promotion of registered model versions
//!
//! A trained model enters the registry under the initial stage of a
//! [`StagePipeline`] and moves forward one stage at a time until it reaches the
//! terminal (production) stage. Every move is performed by the
//! [`PromotionController`], which reads the version occupying the preceding
//! stage, optionally runs it through a [`QualityGate`], and then writes that
//! same version to the target stage in a single registry call.
//!
//! The registry itself is external. [`registry::MlflowRegistry`] talks to an
//! MLflow tracking server; [`registry::LocalRegistry`] keeps the same model in
//! a JSON file for local pipelines and tests.

pub mod config;
pub mod controller;
pub mod error;
pub mod gate;
pub mod persistence;
pub mod pipeline;
pub mod registry;

pub use config::{
    AssignmentMode, EvaluationConfig, PipelineConfig, PromoteConfig, RegistryBackend,
    RegistryConfig, ServingConfig, SplitPolicy, load_config,
};
pub use controller::{PromotionController, PromotionOutcome, StageAssignment};
pub use error::{ConfigError, PromotionError, RegistryError};
pub use gate::{Evaluation, QualityGate};
pub use pipeline::{Stage, StagePipeline, Transition};
pub use registry::{ModelVersion, RegistryStore, VersionId};
