//! # promoctl-ml: evaluation and serving for promoted models
//!
//! Everything promoctl needs to judge and serve a classifier without a Python
//! runtime:
//!
//! - [`dataset`] embeds the iris evaluation data.
//! - [`split`] derives the pinned evaluation rows from a [`SplitPolicy`].
//! - [`artifact`] defines the JSON classifier format stored in the registry.
//! - [`metrics`] computes accuracy.
//! - [`gate`] plugs the above into the controller as an [`ArtifactGate`].
//! - [`serving`] exposes a loaded artifact over HTTP.
//!
//! [`SplitPolicy`]: promoctl_core::SplitPolicy

pub mod artifact;
pub mod dataset;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod serving;
pub mod split;

pub use artifact::{Classifier, ModelArtifact, Node};
pub use dataset::Dataset;
pub use error::MlError;
pub use gate::ArtifactGate;
pub use metrics::accuracy;
pub use serving::{ServingState, SharedModel, router};
