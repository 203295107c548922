//! Collaborator seams of the pipeline.
//!
//! The loop never clusters or ranks anything itself. It hands a numeric
//! matrix to a [`Clusterer`] and an ARFF file to a [`FeatureRanker`], and
//! checks what comes back. Default implementations live in the submodules;
//! tests substitute the mocks from [`crate::testing`].

pub mod clustering;
pub mod info_gain;
pub mod weka;

pub use clustering::{silhouette_score, KMeansClusterer, KMedoidsClusterer};
pub use info_gain::InfoGainRanker;
pub use weka::WekaRanker;

use crate::config::{PipelineSettings, RankerKind};
use crate::error::{Result, SiftError};
use async_trait::async_trait;
use ndarray::Array2;
use std::path::PathBuf;
use std::sync::Arc;

/// Labels for every row of a matrix plus one quality score.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    pub labels: Vec<usize>,
    pub score: f64,
}

/// In-process clustering algorithm.
///
/// Implementations are synchronous and CPU-bound; the controller runs them on
/// the blocking pool.
pub trait Clusterer: Send + Sync {
    /// Method name as it appears in the artifact layout.
    fn name(&self) -> &str;

    /// Partition the rows of `data` into `n_clusters` groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix cannot be clustered into the requested
    /// number of groups.
    fn cluster(&self, data: &Array2<f64>, n_clusters: usize) -> Result<ClusterAssignment>;
}

/// Input to a ranking call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankRequest {
    /// Labeled export to rank.
    pub arff_path: PathBuf,
    /// Number of names to return.
    pub keep: usize,
    /// Class attribute; every other attribute is a candidate.
    pub target: String,
}

/// Feature importance ranking against the cluster labels.
#[async_trait]
pub trait FeatureRanker: Send + Sync {
    fn name(&self) -> &str;

    /// The `keep` most informative attribute names, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the export cannot be read or the ranking tool
    /// fails.
    async fn rank(&self, request: &RankRequest) -> Result<Vec<String>>;
}

/// Clusterer registered under `method`.
///
/// # Errors
///
/// Returns [`SiftError::InvalidConfig`] for an unknown method name.
pub fn clusterer_for(method: &str, settings: &PipelineSettings) -> Result<Arc<dyn Clusterer>> {
    match method {
        "kmeans" => Ok(Arc::new(
            KMeansClusterer::new()
                .with_max_iterations(settings.kmeans.max_iterations)
                .with_seed(settings.kmeans.seed),
        )),
        "kmedoids" => Ok(Arc::new(
            KMedoidsClusterer::new()
                .with_max_iterations(settings.kmeans.max_iterations)
                .with_seed(settings.kmeans.seed),
        )),
        other => Err(SiftError::invalid_config(
            "clusterMethod",
            format!("unknown clustering method '{other}' (expected kmeans or kmedoids)"),
        )),
    }
}

/// Ranker selected by the settings.
///
/// # Errors
///
/// Returns [`SiftError::InvalidConfig`] if the Weka ranker is selected
/// without a jar path.
pub fn ranker_for(settings: &PipelineSettings) -> Result<Arc<dyn FeatureRanker>> {
    match settings.ranker {
        RankerKind::InfoGain => Ok(Arc::new(InfoGainRanker::new(settings.info_gain.bins))),
        RankerKind::Weka => {
            let jar = settings.weka_jar.clone().ok_or_else(|| {
                SiftError::invalid_config("wekaJar", "required when ranker is 'weka'")
            })?;
            Ok(Arc::new(WekaRanker::new(jar)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_clusterers() {
        let settings = PipelineSettings::default();
        assert_eq!(clusterer_for("kmeans", &settings).unwrap().name(), "kmeans");
        assert_eq!(
            clusterer_for("kmedoids", &settings).unwrap().name(),
            "kmedoids"
        );
    }

    #[test]
    fn test_unknown_clusterer() {
        let err = clusterer_for("spectral", &PipelineSettings::default()).err().unwrap();
        assert!(matches!(err, SiftError::InvalidConfig { .. }));
    }

    #[test]
    fn test_weka_requires_jar() {
        let settings = PipelineSettings {
            ranker: RankerKind::Weka,
            weka_jar: None,
            ..PipelineSettings::default()
        };
        assert!(ranker_for(&settings).is_err());
    }

    #[test]
    fn test_default_ranker_is_info_gain() {
        let ranker = ranker_for(&PipelineSettings::default()).unwrap();
        assert_eq!(ranker.name(), "infoGain");
    }
}
