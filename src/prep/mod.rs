//! Dataset preparation ahead of a pipeline run.

pub mod combine;
pub mod subsample;

pub use combine::combine_datasets;
pub use subsample::{debug_dataset_name, subsample_features, write_debug_dataset, DEBUG_PREFIX};
