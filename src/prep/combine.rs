//! Join several base datasets of a cohort into one.

use crate::artifacts::ArtifactLayout;
use crate::dataset::{io, TypedDataset};
use crate::error::{Result, SiftError};
use std::fs;
use tracing::{debug, info};

/// Inner-join `sources` on the identifier column and write the result as
/// the base dataset `<root>/<cohort>/<target>`.
///
/// Rows follow the order of the first source. Returns the joined dataset.
///
/// # Errors
///
/// Returns [`SiftError::InvalidConfig`] with fewer than two sources or when
/// the target is one of them, [`SiftError::ColumnSetMismatch`] when sources
/// share a feature name, and IO/format errors from reading or writing.
pub fn combine_datasets(
    layout: &ArtifactLayout,
    cohort: &str,
    sources: &[String],
    target: &str,
    id_column: &str,
) -> Result<TypedDataset> {
    if sources.len() < 2 {
        return Err(SiftError::invalid_config(
            "sources",
            "at least two datasets are required",
        ));
    }
    if sources.iter().any(|s| s == target) {
        return Err(SiftError::invalid_config(
            "target",
            format!("'{target}' is also a source"),
        ));
    }

    let mut combined: Option<TypedDataset> = None;
    for source in sources {
        let ds = io::read_dataset(
            &layout.base_data(cohort, source),
            &layout.base_col_types(cohort, source),
            id_column,
        )?;
        debug!(
            "Loaded {}/{}: {} rows, {} features",
            cohort,
            source,
            ds.n_rows(),
            ds.n_features()
        );
        combined = Some(match combined {
            None => ds,
            Some(acc) => acc.inner_join(&ds)?,
        });
    }
    let combined = combined.ok_or_else(|| SiftError::unexpected("no datasets combined"))?;

    fs::create_dir_all(layout.dataset_dir(cohort, target))?;
    io::write_dataset(
        &combined,
        &layout.base_data(cohort, target),
        &layout.base_col_types(cohort, target),
    )?;
    info!(
        "Combined {} datasets into {}/{} ({} rows, {} features)",
        sources.len(),
        cohort,
        target,
        combined.n_rows(),
        combined.n_features()
    );
    Ok(combined)
}
