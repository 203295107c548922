//! Demo cohort data.
//!
//! Five individuals, three numeric and two nominal features. Small enough to
//! reason about by hand, large enough to survive two rounds of decay.

use crate::artifacts::ArtifactLayout;
use crate::dataset::{io, Column, ColumnType, ColumnTypes, FeatureFrame, TypedDataset};
use crate::error::Result;
use std::fs;
use std::path::Path;

/// Identifier column of the demo data.
pub const DEMO_ID_COLUMN: &str = "PTID";

const DEMO_ROWS: [[&str; 6]; 5] = [
    ["p1", "71", "M", "29", "1", "7.1"],
    ["p2", "65", "F", "24", "0", "6.2"],
    ["p3", "80", "F", "27", "2", "6.8"],
    ["p4", "58", "M", "21", "0", "5.9"],
    ["p5", "77", "M", "26", "1", "6.5"],
];

const DEMO_COLUMNS: [(&str, ColumnType); 5] = [
    ("AGE", ColumnType::Numeric),
    ("SEX", ColumnType::Nominal),
    ("MMSE", ColumnType::Numeric),
    ("APOE4", ColumnType::Nominal),
    ("HIPPO_VOL", ColumnType::Numeric),
];

/// The demo dataset in memory.
///
/// # Panics
///
/// Panics if the embedded rows and column types disagree.
#[must_use]
pub fn demo_dataset() -> TypedDataset {
    let ids = DEMO_ROWS.iter().map(|r| r[0].to_string()).collect();
    let columns = DEMO_COLUMNS
        .iter()
        .enumerate()
        .map(|(c, (name, _))| {
            Column::new(*name, DEMO_ROWS.iter().map(|r| r[c + 1].to_string()).collect())
        })
        .collect();
    let types = ColumnTypes::new(
        DEMO_COLUMNS
            .iter()
            .map(|(name, kind)| (name.to_string(), *kind))
            .collect(),
    )
    .expect("demo column types are unique");
    let frame = FeatureFrame::new(columns, DEMO_ROWS.len()).expect("demo frame is rectangular");
    TypedDataset::new(DEMO_ID_COLUMN, ids, frame, types).expect("demo dataset is consistent")
}

/// Write the demo dataset as the base dataset `<root>/<cohort>/<dataset>`.
///
/// # Errors
///
/// Returns an error if the files cannot be written.
pub fn write_demo_base(root: &Path, cohort: &str, dataset: &str) -> Result<()> {
    let layout = ArtifactLayout::new(root);
    fs::create_dir_all(layout.dataset_dir(cohort, dataset))?;
    io::write_dataset(
        &demo_dataset(),
        &layout.base_data(cohort, dataset),
        &layout.base_col_types(cohort, dataset),
    )
}
