//! Typed dataset model.
//!
//! A [`TypedDataset`] pairs a table of feature columns with a
//! [`ColumnTypes`] table and an identifier column that is never typed.
//! Every constructor and operation keeps the invariant that the type table
//! names exactly the feature columns, in the same order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ TypedDataset │────>│ FeatureFrame │     │ ColumnTypes  │
//! │  ids (PTID)  │────>│  columns     │<───>│  name → kind │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!        │
//!        v
//! select_by_type / splice_by_name / numeric_matrix / label / inner_join
//! ```

pub mod arff;
pub mod clustering;
pub mod io;

pub use clustering::Clustering;

use crate::error::{Result, SiftError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Column Types
// ============================================================================

/// Statistical type of a feature column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Continuous or count-valued column.
    Numeric,
    /// Finite category set.
    Nominal,
}

impl ColumnType {
    /// Parse a type tag for `column`.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::UnknownColumnType`] for anything other than
    /// `numeric` or `nominal`.
    pub fn parse(column: &str, value: &str) -> Result<Self> {
        value.parse().map_err(|_| SiftError::UnknownColumnType {
            column: column.to_string(),
            value: value.to_string(),
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Nominal => "nominal",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "numeric" => Ok(ColumnType::Numeric),
            "nominal" => Ok(ColumnType::Nominal),
            _ => Err(()),
        }
    }
}

/// Ordered mapping from column name to [`ColumnType`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnTypes {
    entries: Vec<(String, ColumnType)>,
}

impl ColumnTypes {
    /// Build a type table, rejecting duplicate column names.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::ColumnSetMismatch`] if a name appears twice.
    pub fn new(entries: Vec<(String, ColumnType)>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        for (name, _) in &entries {
            if !seen.insert(name.as_str()) {
                return Err(SiftError::column_mismatch(format!(
                    "column '{name}' is typed twice"
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Number of typed columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Type of a column, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ColumnType> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }

    /// Column names in table order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), *t))
    }

    /// Names of all columns of the given kind, in table order.
    #[must_use]
    pub fn columns_of(&self, kind: ColumnType) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, t)| *t == kind)
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Count of columns of the given kind.
    #[must_use]
    pub fn count_of(&self, kind: ColumnType) -> usize {
        self.entries.iter().filter(|(_, t)| *t == kind).count()
    }
}

// ============================================================================
// Feature Frame
// ============================================================================

/// A named column of raw cell values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub values: Vec<String>,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Distinct values, sorted.
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        self.values
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Parse every cell as `f64`.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::DataFormat`] naming the first unparsable cell.
    pub fn as_f64(&self) -> Result<Vec<f64>> {
        self.values
            .iter()
            .enumerate()
            .map(|(row, v)| {
                v.trim().parse::<f64>().map_err(|_| {
                    SiftError::data_format(
                        format!("column '{}'", self.name),
                        format!("row {row} value '{v}' is not numeric"),
                    )
                })
            })
            .collect()
    }
}

/// Column-major table of feature values, without the identifier column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFrame {
    columns: Vec<Column>,
    n_rows: usize,
}

impl FeatureFrame {
    /// Build a frame, checking every column has `n_rows` values.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::DataFormat`] on ragged columns.
    pub fn new(columns: Vec<Column>, n_rows: usize) -> Result<Self> {
        if let Some(bad) = columns.iter().find(|c| c.values.len() != n_rows) {
            return Err(SiftError::data_format(
                format!("column '{}'", bad.name),
                format!("expected {} rows, found {}", n_rows, bad.values.len()),
            ));
        }
        Ok(Self { columns, n_rows })
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Keep only the given rows, in the given order.
    fn take_rows(&self, rows: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(&c.name, rows.iter().map(|&r| c.values[r].clone()).collect()))
            .collect();
        Self {
            columns,
            n_rows: rows.len(),
        }
    }
}

// ============================================================================
// Typed Dataset
// ============================================================================

/// A feature table with its column types and per-row identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedDataset {
    id_column: String,
    ids: Vec<String>,
    frame: FeatureFrame,
    types: ColumnTypes,
}

impl TypedDataset {
    /// Assemble a dataset and check the type-table invariant.
    ///
    /// The type table is reordered to follow the frame's column order.
    ///
    /// # Errors
    ///
    /// - [`SiftError::ColumnSetMismatch`] if a feature column is untyped, a
    ///   type entry has no column, or the identifier column is typed.
    /// - [`SiftError::DataFormat`] if identifiers are duplicated or the row
    ///   counts disagree.
    pub fn new(
        id_column: impl Into<String>,
        ids: Vec<String>,
        frame: FeatureFrame,
        types: ColumnTypes,
    ) -> Result<Self> {
        let id_column = id_column.into();

        if ids.len() != frame.n_rows() {
            return Err(SiftError::data_format(
                format!("identifier column '{id_column}'"),
                format!("{} identifiers for {} rows", ids.len(), frame.n_rows()),
            ));
        }

        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(dup) = ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(SiftError::data_format(
                format!("identifier column '{id_column}'"),
                format!("duplicate identifier '{dup}'"),
            ));
        }

        if types.get(&id_column).is_some() {
            return Err(SiftError::column_mismatch(format!(
                "identifier column '{id_column}' must not be typed"
            )));
        }

        let mut ordered = Vec::with_capacity(frame.n_columns());
        for name in frame.names() {
            match types.get(name) {
                Some(kind) => ordered.push((name.to_string(), kind)),
                None => {
                    return Err(SiftError::column_mismatch(format!(
                        "column '{name}' has no declared type"
                    )))
                }
            }
        }
        if let Some(extra) = types.names().find(|n| frame.column(n).is_none()) {
            return Err(SiftError::column_mismatch(format!(
                "type declared for absent column '{extra}'"
            )));
        }

        Ok(Self {
            id_column,
            ids,
            frame,
            types: ColumnTypes::new(ordered)?,
        })
    }

    #[must_use]
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    #[must_use]
    pub fn frame(&self) -> &FeatureFrame {
        &self.frame
    }

    #[must_use]
    pub fn types(&self) -> &ColumnTypes {
        &self.types
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.ids.len()
    }

    /// Number of feature columns (identifier excluded).
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.frame.n_columns()
    }

    /// Feature column names in order.
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.frame.names().map(str::to_string).collect()
    }

    /// Sub-table of every column typed `kind`, with its ordered names.
    ///
    /// The identifier column is not part of the result; callers re-attach
    /// it from [`TypedDataset::ids`] when needed.
    #[must_use]
    pub fn select_by_type(&self, kind: ColumnType) -> (FeatureFrame, Vec<String>) {
        let names = self.types.columns_of(kind);
        let columns = names
            .iter()
            .filter_map(|n| self.frame.column(n).cloned())
            .collect();
        let frame = FeatureFrame {
            columns,
            n_rows: self.frame.n_rows(),
        };
        (frame, names)
    }

    /// Restrict the data and type table to exactly `names`, in that order.
    ///
    /// Identifiers are carried over unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::ColumnSetMismatch`] if a name is absent or repeated.
    pub fn splice_by_name<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut seen = HashSet::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        let mut types = Vec::with_capacity(names.len());

        for name in names {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(SiftError::column_mismatch(format!(
                    "column '{name}' requested twice"
                )));
            }
            let column = self.frame.column(name).ok_or_else(|| {
                SiftError::column_mismatch(format!("column '{name}' is not in the dataset"))
            })?;
            let kind = self.types.get(name).ok_or_else(|| {
                SiftError::column_mismatch(format!("column '{name}' has no declared type"))
            })?;
            columns.push(column.clone());
            types.push((name.to_string(), kind));
        }

        Ok(Self {
            id_column: self.id_column.clone(),
            ids: self.ids.clone(),
            frame: FeatureFrame {
                columns,
                n_rows: self.frame.n_rows(),
            },
            types: ColumnTypes::new(types)?,
        })
    }

    /// Numeric matrix for clustering.
    ///
    /// Numeric columns come first, followed by one indicator column
    /// `<name>_<value>` per sorted category of each nominal column. The
    /// expansion exists only in memory.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::DataFormat`] if a numeric cell does not parse.
    pub fn numeric_matrix(&self) -> Result<(Array2<f64>, Vec<String>)> {
        let (numeric, numeric_names) = self.select_by_type(ColumnType::Numeric);
        let (nominal, _) = self.select_by_type(ColumnType::Nominal);

        let mut names = numeric_names;
        let mut blocks: Vec<Vec<f64>> = Vec::new();

        for column in numeric.columns() {
            blocks.push(column.as_f64()?);
        }

        for column in nominal.columns() {
            for category in column.categories() {
                names.push(format!("{}_{}", column.name, category));
                blocks.push(
                    column
                        .values
                        .iter()
                        .map(|v| if *v == category { 1.0 } else { 0.0 })
                        .collect(),
                );
            }
        }

        let n_rows = self.n_rows();
        let mut matrix = Array2::<f64>::zeros((n_rows, blocks.len()));
        for (j, block) in blocks.iter().enumerate() {
            for (i, value) in block.iter().enumerate() {
                matrix[[i, j]] = *value;
            }
        }

        Ok((matrix, names))
    }

    /// Attach cluster labels by identifier.
    ///
    /// Every row must have exactly one label and every label must belong to
    /// a row of this dataset.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::UnexpectedState`] if the two sides disagree.
    pub fn label(&self, clustering: &Clustering) -> Result<LabeledDataset> {
        let by_id = clustering.by_id();

        let mut labels = Vec::with_capacity(self.n_rows());
        let mut unlabeled = Vec::new();
        for id in &self.ids {
            match by_id.get(id.as_str()) {
                Some(label) => labels.push(*label),
                None => unlabeled.push(id.clone()),
            }
        }

        if !unlabeled.is_empty() {
            return Err(SiftError::unexpected(format!(
                "{} individuals have no cluster label (first: '{}')",
                unlabeled.len(),
                unlabeled[0]
            )));
        }
        if by_id.len() != self.n_rows() {
            return Err(SiftError::unexpected(format!(
                "clustering labels {} individuals, dataset has {}",
                by_id.len(),
                self.n_rows()
            )));
        }

        Ok(LabeledDataset {
            dataset: self.clone(),
            labels,
        })
    }

    /// Inner-join another dataset on the identifier.
    ///
    /// Rows keep this dataset's order; features of `other` follow this
    /// dataset's features, and the two type tables are concatenated.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::ColumnSetMismatch`] if the identifier columns
    /// differ or a feature name appears on both sides.
    pub fn inner_join(&self, other: &TypedDataset) -> Result<Self> {
        if self.id_column != other.id_column {
            return Err(SiftError::column_mismatch(format!(
                "identifier columns differ: '{}' vs '{}'",
                self.id_column, other.id_column
            )));
        }
        if let Some(shared) = other.frame.names().find(|n| self.frame.column(n).is_some()) {
            return Err(SiftError::column_mismatch(format!(
                "column '{shared}' exists in both datasets"
            )));
        }

        let other_rows: HashMap<&str, usize> = other
            .ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut left_rows = Vec::new();
        let mut right_rows = Vec::new();
        for (i, id) in self.ids.iter().enumerate() {
            if let Some(&j) = other_rows.get(id.as_str()) {
                left_rows.push(i);
                right_rows.push(j);
            }
        }

        let left = self.frame.take_rows(&left_rows);
        let right = other.frame.take_rows(&right_rows);

        let ids = left_rows.iter().map(|&i| self.ids[i].clone()).collect();
        let mut columns = left.columns;
        columns.extend(right.columns);
        let types = self
            .types
            .iter()
            .chain(other.types.iter())
            .map(|(n, t)| (n.to_string(), t))
            .collect();

        Self::new(
            self.id_column.clone(),
            ids,
            FeatureFrame::new(columns, left_rows.len())?,
            ColumnTypes::new(types)?,
        )
    }
}

/// A dataset with one cluster label per row.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    pub dataset: TypedDataset,
    pub labels: Vec<usize>,
}
