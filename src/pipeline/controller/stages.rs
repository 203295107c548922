//! The five stages of one iteration.

use super::{IterationSummary, PipelineController};
use crate::artifacts::{ArtifactKind, ConfigKey, IterationPaths};
use crate::checkpoint::{IterationManifest, ManifestStore};
use crate::collab::{ClusterAssignment, RankRequest};
use crate::dataset::clustering::round_score;
use crate::dataset::{arff, io, Clustering, TypedDataset};
use crate::error::{Result, SiftError, StageContext};
use crate::pipeline::timeout::{run_blocking_with_timeout, run_with_timeout};
use crate::pipeline::{next_keep_count, IterationState, Stage};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// One iteration in progress: its directory, manifest and inputs.
pub(super) struct IterationRun<'a> {
    controller: &'a PipelineController,
    key: &'a ConfigKey,
    state: IterationState,
    dir: PathBuf,
    store: ManifestStore,
    manifest: IterationManifest,
}

impl<'a> IterationRun<'a> {
    /// Recreate the iteration directory and write a fresh manifest.
    pub(super) fn begin(
        controller: &'a PipelineController,
        key: &'a ConfigKey,
        state: IterationState,
    ) -> Result<Self> {
        let dir = controller.layout.iteration_dir(key, state.iteration);
        if dir.exists() {
            debug!("Clearing {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        let store = ManifestStore::new(&dir);
        let manifest = IterationManifest::new(key.clone(), state.iteration, &controller.run_id);
        store.save(&manifest)?;

        Ok(Self {
            controller,
            key,
            state,
            dir,
            store,
            manifest,
        })
    }

    /// Run all stages in order.
    pub(super) async fn execute(mut self) -> Result<IterationSummary> {
        let iteration = self.state.iteration;
        info!("Iteration {} of {}", iteration, self.key);

        let (dataset, paths) = self
            .select_features()
            .at_stage(iteration, Stage::SelectFeatures)?;
        let assignment = self
            .cluster(&dataset)
            .await
            .at_stage(iteration, Stage::Cluster)?;
        let clustering = self
            .score(&dataset, assignment, &paths)
            .at_stage(iteration, Stage::Score)?;
        self.export_labeled(&dataset, &clustering, &paths)
            .at_stage(iteration, Stage::ExportLabeled)?;
        let keep = self
            .rank_features(&dataset, &paths)
            .await
            .at_stage(iteration, Stage::RankFeatures)?;

        Ok(IterationSummary {
            iteration,
            n_kept_feats: dataset.n_features(),
            score: clustering.score(),
            keep,
            dir: self.dir,
        })
    }

    fn finish_stage(&mut self, stage: Stage) -> Result<()> {
        self.manifest.record_stage(stage);
        self.store.save(&self.manifest)
    }

    // ------------------------------------------------------------------------
    // SELECT_FEATURES
    // ------------------------------------------------------------------------

    fn load_input(&self) -> Result<TypedDataset> {
        let layout = &self.controller.layout;
        let id_column = &self.controller.config.id_column;

        if self.state.iteration == 0 {
            let data = layout.base_data(&self.key.cohort, &self.key.dataset);
            let types = layout.base_col_types(&self.key.cohort, &self.key.dataset);
            debug!("Loading base dataset {}", data.display());
            return io::read_dataset(&data, &types, id_column);
        }

        let previous = self
            .controller
            .locator
            .inspect(self.key, self.state.iteration - 1)?;
        let (data, _) = previous.artifact(ArtifactKind::Data)?;
        let (types, _) = previous.artifact(ArtifactKind::ColTypes)?;
        let (kept, _) = previous.artifact(ArtifactKind::KeptFeats)?;
        debug!(
            "Splicing {} to the features in {}",
            data.display(),
            kept.display()
        );

        let dataset = io::read_dataset(&data, &types, id_column)?;
        let names = io::read_feature_list(&kept)?;
        dataset.splice_by_name(names.as_slice())
    }

    fn select_features(&mut self) -> Result<(TypedDataset, IterationPaths)> {
        let dataset = self.load_input()?;
        let n = dataset.n_features();

        if n == 0 {
            return Err(SiftError::column_mismatch("dataset has no feature columns"));
        }
        check_label_column(&dataset, &self.controller.config.cluster_column)?;
        if let Some(expected) = self.state.n_kept_feats {
            if n != expected {
                return Err(SiftError::unexpected(format!(
                    "iteration {} expected {expected} features but assembled {n}",
                    self.state.iteration
                )));
            }
        }

        let paths = self
            .controller
            .layout
            .iteration(self.key, self.state.iteration, n);
        io::write_dataset(&dataset, &paths.data(), &paths.col_types())?;

        self.manifest.n_kept_feats = Some(n);
        self.manifest
            .record_artifact(ArtifactKind::Data, &paths.data())?;
        self.manifest
            .record_artifact(ArtifactKind::ColTypes, &paths.col_types())?;
        self.finish_stage(Stage::SelectFeatures)?;

        info!(
            "Selected {} features ({} rows) into {}",
            n,
            dataset.n_rows(),
            paths.data().display()
        );
        Ok((dataset, paths))
    }

    // ------------------------------------------------------------------------
    // CLUSTER
    // ------------------------------------------------------------------------

    async fn cluster(&mut self, dataset: &TypedDataset) -> Result<ClusterAssignment> {
        let (matrix, columns) = dataset.numeric_matrix()?;
        debug!(
            "Clustering a {}x{} matrix ({} expanded columns)",
            matrix.nrows(),
            matrix.ncols(),
            columns.len()
        );

        let clusterer = Arc::clone(&self.controller.clusterer);
        let name = clusterer.name().to_string();
        let n_clusters = self.key.n_clusters;
        let assignment = run_blocking_with_timeout(
            &name,
            self.controller.config.cluster_timeout,
            move || clusterer.cluster(&matrix, n_clusters),
        )
        .await?;

        self.finish_stage(Stage::Cluster)?;
        Ok(assignment)
    }

    // ------------------------------------------------------------------------
    // SCORE
    // ------------------------------------------------------------------------

    fn score(
        &mut self,
        dataset: &TypedDataset,
        assignment: ClusterAssignment,
        paths: &IterationPaths,
    ) -> Result<Clustering> {
        if assignment.labels.len() != dataset.n_rows() {
            return Err(SiftError::unexpected(format!(
                "clusterer returned {} labels for {} rows",
                assignment.labels.len(),
                dataset.n_rows()
            )));
        }
        if !assignment.score.is_finite() {
            return Err(SiftError::unexpected(format!(
                "clusterer returned a non-finite score ({})",
                assignment.score
            )));
        }

        let score = round_score(assignment.score);
        let clustering = Clustering::new(dataset.ids().to_vec(), assignment.labels, score)?;
        if !clustering.is_dense() {
            return Err(SiftError::unexpected(
                "cluster labels are not dense and 0-based",
            ));
        }
        if clustering.n_clusters() > self.key.n_clusters {
            return Err(SiftError::unexpected(format!(
                "clusterer produced {} clusters, {} requested",
                clustering.n_clusters(),
                self.key.n_clusters
            )));
        }

        let path = paths.clustering(score);
        io::write_clustering(
            &path,
            &clustering,
            &self.controller.config.id_column,
            &self.controller.config.cluster_column,
        )?;

        self.manifest.clustering_score = Some(score);
        self.manifest
            .record_artifact(ArtifactKind::Clustering, &path)?;
        self.finish_stage(Stage::Score)?;

        info!("Clustering score {:.2}", score);
        Ok(clustering)
    }

    // ------------------------------------------------------------------------
    // EXPORT_LABELED
    // ------------------------------------------------------------------------

    fn export_labeled(
        &mut self,
        dataset: &TypedDataset,
        clustering: &Clustering,
        paths: &IterationPaths,
    ) -> Result<()> {
        let labeled = dataset.label(clustering)?;
        let path = paths.arff();
        arff::write(
            &path,
            &self.key.cohort,
            &labeled,
            &self.controller.config.cluster_column,
        )?;

        self.manifest.record_artifact(ArtifactKind::Arff, &path)?;
        self.finish_stage(Stage::ExportLabeled)?;

        debug!("Wrote labeled export {}", path.display());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // RANK_FEATURES
    // ------------------------------------------------------------------------

    async fn rank_features(
        &mut self,
        dataset: &TypedDataset,
        paths: &IterationPaths,
    ) -> Result<usize> {
        let n = dataset.n_features();
        let keep = next_keep_count(n)?;

        let request = RankRequest {
            arff_path: paths.arff(),
            keep,
            target: self.controller.config.cluster_column.clone(),
        };
        let ranker = &self.controller.ranker;
        let ranked = run_with_timeout(
            ranker.name(),
            self.controller.config.rank_timeout,
            ranker.rank(&request),
        )
        .await?;

        check_ranking(&ranked, keep, &dataset.feature_names())?;

        let path = paths.kept_feats(keep);
        io::write_feature_list(&path, &ranked)?;

        self.manifest
            .record_artifact(ArtifactKind::KeptFeats, &path)?;
        self.manifest.record_stage(Stage::RankFeatures);
        self.manifest.mark_complete(keep);
        self.store.save(&self.manifest)?;

        info!("Kept {} of {} features", keep, n);
        Ok(keep)
    }
}

/// The export appends the cluster label as an attribute, so no feature may
/// carry its name.
fn check_label_column(dataset: &TypedDataset, cluster_column: &str) -> Result<()> {
    if dataset.frame().column(cluster_column).is_some() {
        return Err(SiftError::column_mismatch(format!(
            "feature '{cluster_column}' collides with the cluster label column"
        )));
    }
    Ok(())
}

/// A ranking must name exactly `keep` distinct features of the dataset.
fn check_ranking(ranked: &[String], keep: usize, available: &[String]) -> Result<()> {
    let violation = |detail: String| SiftError::RankingContractViolation {
        requested: keep,
        returned: ranked.len(),
        detail,
    };

    if ranked.len() != keep {
        return Err(violation("wrong number of features".to_string()));
    }

    let known: HashSet<&str> = available.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    for name in ranked {
        if !known.contains(name.as_str()) {
            return Err(violation(format!("unknown feature '{name}'")));
        }
        if !seen.insert(name.as_str()) {
            return Err(violation(format!("feature '{name}' listed twice")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_check_ranking_accepts_valid_list() {
        let available = names(&["AGE", "SEX", "MMSE"]);
        assert!(check_ranking(&names(&["MMSE", "AGE"]), 2, &available).is_ok());
    }

    #[test]
    fn test_check_ranking_wrong_length() {
        let available = names(&["AGE", "SEX", "MMSE"]);
        let err = check_ranking(&names(&["MMSE"]), 2, &available).unwrap_err();
        assert!(matches!(
            err,
            SiftError::RankingContractViolation {
                requested: 2,
                returned: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_check_ranking_unknown_name() {
        let available = names(&["AGE", "SEX"]);
        let err = check_ranking(&names(&["AGE", "PTID"]), 2, &available).unwrap_err();
        assert!(err.to_string().contains("PTID"));
    }

    #[test]
    fn test_check_label_column() {
        let ds = crate::testing::fixtures::demo_dataset();
        assert!(check_label_column(&ds, "cluster_id").is_ok());
        let err = check_label_column(&ds, "SEX").unwrap_err();
        assert!(matches!(err, SiftError::ColumnSetMismatch { .. }));
    }

    #[test]
    fn test_check_ranking_duplicate() {
        let available = names(&["AGE", "SEX"]);
        let err = check_ranking(&names(&["AGE", "AGE"]), 2, &available).unwrap_err();
        assert!(err.to_string().contains("twice"));
    }
}
