//! Small random-column datasets for quick pipeline runs.

use crate::artifacts::ArtifactLayout;
use crate::dataset::{io, TypedDataset};
use crate::error::{Result, SiftError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use tracing::info;

/// Name prefix of subsampled datasets.
pub const DEBUG_PREFIX: &str = "debug-";

/// Name of the debug dataset derived from `dataset`.
#[must_use]
pub fn debug_dataset_name(dataset: &str) -> String {
    format!("{DEBUG_PREFIX}{dataset}")
}

/// Keep `n_features` columns of `dataset` chosen by a shuffle seeded with
/// `seed`. Chosen columns keep their original order.
///
/// # Errors
///
/// Returns [`SiftError::FeatureBudgetExhausted`] if `n_features` is zero or
/// exceeds the dataset's feature count.
pub fn subsample_features(dataset: &TypedDataset, n_features: usize, seed: u64) -> Result<TypedDataset> {
    let available = dataset.n_features();
    if n_features == 0 || n_features > available {
        return Err(SiftError::FeatureBudgetExhausted {
            current: available,
            requested: n_features,
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut shuffled = dataset.feature_names();
    shuffled.shuffle(&mut rng);
    shuffled.truncate(n_features);

    let chosen: Vec<String> = dataset
        .feature_names()
        .into_iter()
        .filter(|name| shuffled.contains(name))
        .collect();
    dataset.splice_by_name(chosen.as_slice())
}

/// Subsample the base dataset `<cohort>/<dataset>` and write it as
/// `<cohort>/debug-<dataset>`.
///
/// # Errors
///
/// Returns IO/format errors and the errors of [`subsample_features`].
pub fn write_debug_dataset(
    layout: &ArtifactLayout,
    cohort: &str,
    dataset: &str,
    n_features: usize,
    seed: u64,
    id_column: &str,
) -> Result<TypedDataset> {
    let source = io::read_dataset(
        &layout.base_data(cohort, dataset),
        &layout.base_col_types(cohort, dataset),
        id_column,
    )?;
    let sampled = subsample_features(&source, n_features, seed)?;

    let target = debug_dataset_name(dataset);
    fs::create_dir_all(layout.dataset_dir(cohort, &target))?;
    io::write_dataset(
        &sampled,
        &layout.base_data(cohort, &target),
        &layout.base_col_types(cohort, &target),
    )?;
    info!(
        "Wrote {}/{} with {} of {} features",
        cohort,
        target,
        sampled.n_features(),
        source.n_features()
    );
    Ok(sampled)
}
