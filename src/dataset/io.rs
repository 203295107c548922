//! CSV and plain-text persistence for datasets, column types, clusterings
//! and ranked feature lists.

use super::{Clustering, Column, ColumnType, ColumnTypes, FeatureFrame, TypedDataset};
use crate::error::{Result, SiftError};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Read a data CSV and split off the identifier column.
///
/// # Errors
///
/// Returns [`SiftError::MissingFile`] if the file does not exist and
/// [`SiftError::DataFormat`] if the identifier column is absent.
pub fn read_table(path: &Path, id_column: &str) -> Result<(Vec<String>, FeatureFrame)> {
    if !path.exists() {
        return Err(SiftError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let id_idx = headers.iter().position(|h| h == id_column).ok_or_else(|| {
        SiftError::data_format(
            path.display().to_string(),
            format!("identifier column '{id_column}' not found"),
        )
    })?;

    let mut ids = Vec::new();
    let mut values: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (i, cell) in record.iter().enumerate() {
            values[i].push(cell.to_string());
        }
    }

    let mut columns = Vec::with_capacity(headers.len().saturating_sub(1));
    for (i, (name, column)) in headers.into_iter().zip(values).enumerate() {
        if i == id_idx {
            ids = column;
        } else {
            columns.push(Column::new(name, column));
        }
    }

    let n_rows = ids.len();
    debug!(
        "Read {} rows x {} columns from {}",
        n_rows,
        columns.len(),
        path.display()
    );
    FeatureFrame::new(columns, n_rows).map(|frame| (ids, frame))
}

/// Read a single-row column-type CSV.
///
/// # Errors
///
/// Returns [`SiftError::UnknownColumnType`] for an unrecognised tag and
/// [`SiftError::DataFormat`] if the file does not have exactly one row.
pub fn read_col_types(path: &Path) -> Result<ColumnTypes> {
    if !path.exists() {
        return Err(SiftError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = reader.records();

    let row = match rows.next() {
        Some(row) => row?,
        None => {
            return Err(SiftError::data_format(
                path.display().to_string(),
                "column-type table has no row",
            ))
        }
    };
    if rows.next().is_some() {
        return Err(SiftError::data_format(
            path.display().to_string(),
            "column-type table has more than one row",
        ));
    }

    let entries = headers
        .into_iter()
        .zip(row.iter())
        .map(|(name, tag)| ColumnType::parse(&name, tag).map(|kind| (name, kind)))
        .collect::<Result<Vec<_>>>()?;

    ColumnTypes::new(entries)
}

/// Read a dataset from its data and column-type files.
///
/// # Errors
///
/// Propagates read errors and the [`TypedDataset::new`] invariant checks.
pub fn read_dataset(data_path: &Path, types_path: &Path, id_column: &str) -> Result<TypedDataset> {
    let (ids, frame) = read_table(data_path, id_column)?;
    let types = read_col_types(types_path)?;
    TypedDataset::new(id_column, ids, frame, types)
}

/// Write the identifier column followed by the feature columns.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_table(path: &Path, dataset: &TypedDataset) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![dataset.id_column().to_string()];
    header.extend(dataset.feature_names());
    writer.write_record(&header)?;

    let columns = dataset.frame().columns();
    for (row, id) in dataset.ids().iter().enumerate() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(id.as_str());
        record.extend(columns.iter().map(|c| c.values[row].as_str()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    debug!("Wrote data table to {}", path.display());
    Ok(())
}

/// Write a single-row column-type CSV.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_col_types(path: &Path, types: &ColumnTypes) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(types.names())?;
    writer.write_record(types.iter().map(|(_, t)| t.as_str()))?;
    writer.flush()?;
    Ok(())
}

/// Write both halves of a dataset.
///
/// # Errors
///
/// Returns an error if either file cannot be written.
pub fn write_dataset(dataset: &TypedDataset, data_path: &Path, types_path: &Path) -> Result<()> {
    write_table(data_path, dataset)?;
    write_col_types(types_path, dataset.types())
}

/// Write identifier and label columns.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_clustering(
    path: &Path,
    clustering: &Clustering,
    id_column: &str,
    label_column: &str,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([id_column, label_column])?;
    for (id, label) in clustering.ids().iter().zip(clustering.labels()) {
        writer.write_record([id.as_str(), label.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a clustering CSV; the score is supplied by the caller (it lives in
/// the file name, not the file).
///
/// # Errors
///
/// Returns [`SiftError::DataFormat`] if either column is absent or a label
/// is not a non-negative integer.
pub fn read_clustering(
    path: &Path,
    id_column: &str,
    label_column: &str,
    score: f64,
) -> Result<Clustering> {
    let (ids, frame) = read_table(path, id_column)?;
    let column = frame.column(label_column).ok_or_else(|| {
        SiftError::data_format(
            path.display().to_string(),
            format!("label column '{label_column}' not found"),
        )
    })?;

    let labels = column
        .values
        .iter()
        .map(|v| {
            v.trim().parse::<usize>().map_err(|_| {
                SiftError::data_format(
                    path.display().to_string(),
                    format!("cluster label '{v}' is not a non-negative integer"),
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Clustering::new(ids, labels, score)
}

/// Write one feature name per line.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_feature_list(path: &Path, names: &[String]) -> Result<()> {
    let mut content = String::new();
    for name in names {
        content.push_str(name);
        content.push('\n');
    }
    fs::write(path, content)?;
    Ok(())
}

/// Read a feature list, ignoring blank lines.
///
/// # Errors
///
/// Returns [`SiftError::MissingFile`] if the file does not exist.
pub fn read_feature_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(SiftError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
