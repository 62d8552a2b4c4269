//! Pinned evaluation splits.
//!
//! A [`SplitPolicy`] fully determines which rows the gate scores on. The same
//! policy over the same dataset always selects the same rows, so gate results
//! are comparable across runs and machines.

use crate::dataset::Dataset;
use promoctl_core::SplitPolicy;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Indices of the evaluation rows for a dataset of `len` rows, ascending.
pub fn select(policy: &SplitPolicy, len: usize) -> Vec<usize> {
    match *policy {
        SplitPolicy::Full => (0..len).collect(),
        SplitPolicy::Stride { step, offset } => {
            (offset..len).step_by(step.max(1)).collect()
        }
        SplitPolicy::SeededHoldout {
            test_fraction,
            seed,
        } => {
            let take = ((len as f64) * test_fraction.clamp(0.0, 1.0)).ceil() as usize;
            let mut indices: Vec<usize> = (0..len).collect();
            let mut rng = StdRng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
            indices.truncate(take.min(len));
            indices.sort_unstable();
            indices
        }
    }
}

/// The evaluation subset of `dataset` under `policy`.
pub fn apply(policy: &SplitPolicy, dataset: &Dataset) -> Dataset {
    let indices = select(policy, dataset.len());
    tracing::debug!(?policy, rows = indices.len(), of = dataset.len(), "Selected evaluation rows");
    dataset.subset(&indices)
}
