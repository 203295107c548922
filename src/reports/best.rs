//! Best clustering across every configuration of a dataset.

use crate::artifacts::{parse_artifact_name, ArtifactLayout, ArtifactName};
use crate::error::{Result, SiftError};
use serde::Serialize;
use std::path::PathBuf;
use walkdir::WalkDir;

/// One clustering artifact found on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredClustering {
    pub path: PathBuf,
    pub score: f64,
    pub n_kept_feats: usize,
    pub n_clusters: usize,
}

/// Highest score and every clustering that reached it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestClusterings {
    pub score: f64,
    pub clusterings: Vec<ScoredClustering>,
    /// Clustering artifacts inspected in total.
    pub scanned: usize,
}

/// All clustering artifacts under `<root>/<cohort>/<dataset>`, sorted by
/// path.
///
/// # Errors
///
/// Returns [`SiftError::MissingFile`] if the dataset directory is absent.
pub fn scan_clusterings(
    layout: &ArtifactLayout,
    cohort: &str,
    dataset: &str,
) -> Result<Vec<ScoredClustering>> {
    let dir = layout.dataset_dir(cohort, dataset);
    if !dir.is_dir() {
        return Err(SiftError::MissingFile { path: dir });
    }

    let mut found: Vec<ScoredClustering> = WalkDir::new(&dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            match parse_artifact_name(&name)? {
                ArtifactName::Clustering {
                    n_kept_feats,
                    n_clusters,
                    score,
                } => Some(ScoredClustering {
                    path: entry.path().to_path_buf(),
                    score,
                    n_kept_feats,
                    n_clusters,
                }),
                _ => None,
            }
        })
        .collect();
    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

/// Find the best clustering score of a dataset.
///
/// # Errors
///
/// Returns [`SiftError::MissingFile`] if the dataset directory is absent and
/// [`SiftError::UnexpectedState`] if it holds no clustering artifacts.
pub fn best_clusterings(layout: &ArtifactLayout, cohort: &str, dataset: &str) -> Result<BestClusterings> {
    let all = scan_clusterings(layout, cohort, dataset)?;
    let scanned = all.len();

    let best = all
        .iter()
        .map(|c| c.score)
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))
        .ok_or_else(|| {
            SiftError::unexpected(format!(
                "no clustering artifacts under {}",
                layout.dataset_dir(cohort, dataset).display()
            ))
        })?;

    Ok(BestClusterings {
        score: best,
        clusterings: all.into_iter().filter(|c| c.score == best).collect(),
        scanned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ConfigKey;
    use std::fs;
    use tempfile::TempDir;

    fn touch_clustering(layout: &ArtifactLayout, method: &str, k: usize, iter: usize, n: usize, score: f64) {
        let key = ConfigKey::new("demo", "feats", method, k);
        let paths = layout.iteration(&key, iter, n);
        fs::create_dir_all(&paths.dir).unwrap();
        fs::write(paths.clustering(score), "PTID,cluster_id\n").unwrap();
        fs::write(paths.data(), "PTID\n").unwrap();
    }

    #[test]
    fn test_best_across_configurations() {
        let dir = TempDir::new().expect("create temp dir");
        let layout = ArtifactLayout::new(dir.path());
        touch_clustering(&layout, "kmeans", 2, 0, 5, 0.31);
        touch_clustering(&layout, "kmeans", 2, 1, 4, 0.62);
        touch_clustering(&layout, "kmeans", 3, 0, 5, -0.1);
        touch_clustering(&layout, "kmedoids", 2, 0, 5, 0.62);

        let best = best_clusterings(&layout, "demo", "feats").unwrap();
        assert_eq!(best.score, 0.62);
        assert_eq!(best.scanned, 4);
        assert_eq!(best.clusterings.len(), 2);
        assert!(best.clusterings.iter().any(|c| c.path.to_string_lossy().contains("kmedoids")));
    }

    #[test]
    fn test_negative_scores() {
        let dir = TempDir::new().expect("create temp dir");
        let layout = ArtifactLayout::new(dir.path());
        touch_clustering(&layout, "kmeans", 2, 0, 5, -0.4);
        touch_clustering(&layout, "kmeans", 2, 1, 4, -0.2);

        let best = best_clusterings(&layout, "demo", "feats").unwrap();
        assert_eq!(best.score, -0.2);
    }

    #[test]
    fn test_no_clusterings() {
        let dir = TempDir::new().expect("create temp dir");
        let layout = ArtifactLayout::new(dir.path());
        fs::create_dir_all(layout.dataset_dir("demo", "feats")).unwrap();
        assert!(matches!(
            best_clusterings(&layout, "demo", "feats").unwrap_err(),
            SiftError::UnexpectedState { .. }
        ));
    }

    #[test]
    fn test_missing_dataset_dir() {
        let dir = TempDir::new().expect("create temp dir");
        let layout = ArtifactLayout::new(dir.path());
        assert!(matches!(
            best_clusterings(&layout, "demo", "feats").unwrap_err(),
            SiftError::MissingFile { .. }
        ));
    }
}
