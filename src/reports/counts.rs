//! Per-cluster category counts of one variable.

use crate::dataset::{io, Clustering};
use crate::error::{Result, SiftError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;

/// Counts of each category of a variable within each cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub variable: String,
    pub clusters: BTreeMap<usize, BTreeMap<String, usize>>,
    pub total: usize,
}

impl CategoryCounts {
    /// Tally `values` (identifier → category) by the cluster of each
    /// individual.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::UnexpectedState`] if a clustered individual has
    /// no value or the tally does not cover the whole clustering.
    pub fn tally(variable: &str, clustering: &Clustering, values: &HashMap<&str, &str>) -> Result<Self> {
        let mut clusters: BTreeMap<usize, BTreeMap<String, usize>> = BTreeMap::new();
        for (id, label) in clustering.ids().iter().zip(clustering.labels()) {
            let category = values.get(id.as_str()).ok_or_else(|| {
                SiftError::unexpected(format!("individual '{id}' has no value for {variable}"))
            })?;
            *clusters
                .entry(*label)
                .or_default()
                .entry((*category).to_string())
                .or_insert(0) += 1;
        }

        let total: usize = clusters.values().flat_map(|c| c.values()).sum();
        if total != clustering.len() {
            return Err(SiftError::unexpected(format!(
                "counted {total} individuals but the clustering has {}",
                clustering.len()
            )));
        }

        Ok(Self {
            variable: variable.to_string(),
            clusters,
            total,
        })
    }

    /// Text report, one block per cluster.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (cluster, counts) in &self.clusters {
            let cluster_total: usize = counts.values().sum();
            let _ = writeln!(
                out,
                "Cluster {}: {}/{} ({:.2}%)",
                cluster,
                cluster_total,
                self.total,
                percent(cluster_total, self.total)
            );
            for (category, count) in counts {
                let _ = writeln!(
                    out,
                    "\t{}: {}/{} ({:.2}%)",
                    category,
                    count,
                    cluster_total,
                    percent(*count, cluster_total)
                );
            }
            out.push('\n');
        }
        out
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Load a clustering file and a data file and tally `variable`.
///
/// # Errors
///
/// Returns [`SiftError::DataFormat`] if `variable` is not a column of the
/// data file, plus the errors of [`CategoryCounts::tally`].
pub fn category_counts(
    clustering_path: &Path,
    data_path: &Path,
    variable: &str,
    id_column: &str,
    cluster_column: &str,
) -> Result<CategoryCounts> {
    let clustering = io::read_clustering(clustering_path, id_column, cluster_column, 0.0)?;
    let (ids, frame) = io::read_table(data_path, id_column)?;
    let column = frame.column(variable).ok_or_else(|| {
        SiftError::data_format(
            data_path.display().to_string(),
            format!("column '{variable}' not found"),
        )
    })?;

    let values: HashMap<&str, &str> = ids
        .iter()
        .map(String::as_str)
        .zip(column.values.iter().map(String::as_str))
        .collect();
    CategoryCounts::tally(variable, &clustering, &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn clustering() -> Clustering {
        Clustering::new(
            vec!["p1".into(), "p2".into(), "p3".into(), "p4".into()],
            vec![0, 1, 0, 0],
            0.4,
        )
        .unwrap()
    }

    #[test]
    fn test_tally() {
        let values: HashMap<&str, &str> =
            [("p1", "M"), ("p2", "F"), ("p3", "F"), ("p4", "M")].into_iter().collect();
        let counts = CategoryCounts::tally("SEX", &clustering(), &values).unwrap();

        assert_eq!(counts.total, 4);
        assert_eq!(counts.clusters[&0]["M"], 2);
        assert_eq!(counts.clusters[&0]["F"], 1);
        assert_eq!(counts.clusters[&1]["F"], 1);
    }

    #[test]
    fn test_render() {
        let values: HashMap<&str, &str> =
            [("p1", "M"), ("p2", "F"), ("p3", "F"), ("p4", "M")].into_iter().collect();
        let report = CategoryCounts::tally("SEX", &clustering(), &values)
            .unwrap()
            .render();
        assert!(report.contains("Cluster 0: 3/4 (75.00%)"));
        assert!(report.contains("\tM: 2/3 (66.67%)"));
        assert!(report.contains("Cluster 1: 1/4 (25.00%)"));
    }

    #[test]
    fn test_missing_individual() {
        let values: HashMap<&str, &str> = [("p1", "M")].into_iter().collect();
        assert!(CategoryCounts::tally("SEX", &clustering(), &values).is_err());
    }

    #[test]
    fn test_from_files() {
        let dir = TempDir::new().expect("create temp dir");
        let clustering_path = dir.path().join("clustering-5-2-0.40.csv");
        let data_path = dir.path().join("data.csv");
        fs::write(&clustering_path, "PTID,cluster_id\np1,0\np2,1\n").unwrap();
        fs::write(&data_path, "PTID,SEX,AGE\np1,M,71\np2,F,65\np3,F,80\n").unwrap();

        let counts =
            category_counts(&clustering_path, &data_path, "SEX", "PTID", "cluster_id").unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.clusters[&1]["F"], 1);

        assert!(category_counts(&clustering_path, &data_path, "APOE4", "PTID", "cluster_id").is_err());
    }
}
