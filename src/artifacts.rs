//! Artifact naming scheme.
//!
//! Every artifact path is derived from the configuration key, the iteration
//! number and the feature/cluster counts, so the same functions serve both
//! writing new checkpoints and parsing old ones during resume.
//!
//! ```text
//! <root>/<cohort>/<dataset>/data.csv                      base dataset
//! <root>/<cohort>/<dataset>/col-types.csv
//! <root>/<cohort>/<dataset>/<method>/k=<k>/iter<N>/
//!     data-<n>.csv
//!     col-types-<n>.csv
//!     clustering-<n>-<k>-<score>.csv
//!     data-<n>-<k>.arff
//!     kept_feats-<keep>-<k>.txt
//!     manifest.json
//! ```

use crate::dataset::clustering::format_score;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Prefix of iteration directory names.
pub const ITERATION_PREFIX: &str = "iter";

/// Manifest file name inside an iteration directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Advisory lock file inside a configuration directory.
pub const LOCK_FILE: &str = ".pipeline.lock";

const BASE_DATA_FILE: &str = "data.csv";
const BASE_COL_TYPES_FILE: &str = "col-types.csv";

// ============================================================================
// Configuration Key
// ============================================================================

/// Identity of one pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigKey {
    pub cohort: String,
    pub dataset: String,
    pub cluster_method: String,
    pub n_clusters: usize,
}

impl ConfigKey {
    #[must_use]
    pub fn new(
        cohort: impl Into<String>,
        dataset: impl Into<String>,
        cluster_method: impl Into<String>,
        n_clusters: usize,
    ) -> Self {
        Self {
            cohort: cohort.into(),
            dataset: dataset.into(),
            cluster_method: cluster_method.into(),
            n_clusters,
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/k={}",
            self.cohort, self.dataset, self.cluster_method, self.n_clusters
        )
    }
}

// ============================================================================
// Layout
// ============================================================================

/// Path builder rooted at the data directory.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<cohort>/<dataset>`
    #[must_use]
    pub fn dataset_dir(&self, cohort: &str, dataset: &str) -> PathBuf {
        self.root.join(cohort).join(dataset)
    }

    /// Base (unreduced) data table of a dataset.
    #[must_use]
    pub fn base_data(&self, cohort: &str, dataset: &str) -> PathBuf {
        self.dataset_dir(cohort, dataset).join(BASE_DATA_FILE)
    }

    /// Base column-type table of a dataset.
    #[must_use]
    pub fn base_col_types(&self, cohort: &str, dataset: &str) -> PathBuf {
        self.dataset_dir(cohort, dataset).join(BASE_COL_TYPES_FILE)
    }

    /// `<root>/<cohort>/<dataset>/<method>/k=<k>`
    #[must_use]
    pub fn config_dir(&self, key: &ConfigKey) -> PathBuf {
        self.dataset_dir(&key.cohort, &key.dataset)
            .join(&key.cluster_method)
            .join(format!("k={}", key.n_clusters))
    }

    /// Directory of one iteration.
    #[must_use]
    pub fn iteration_dir(&self, key: &ConfigKey, iteration: usize) -> PathBuf {
        self.config_dir(key).join(iteration_dir_name(iteration))
    }

    /// Artifact paths of an iteration running on `n_kept_feats` features.
    #[must_use]
    pub fn iteration(&self, key: &ConfigKey, iteration: usize, n_kept_feats: usize) -> IterationPaths {
        IterationPaths {
            dir: self.iteration_dir(key, iteration),
            n_kept_feats,
            n_clusters: key.n_clusters,
        }
    }
}

/// File names of one iteration's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub n_kept_feats: usize,
    pub n_clusters: usize,
}

impl IterationPaths {
    #[must_use]
    pub fn data(&self) -> PathBuf {
        self.dir.join(format!("data-{}.csv", self.n_kept_feats))
    }

    #[must_use]
    pub fn col_types(&self) -> PathBuf {
        self.dir.join(format!("col-types-{}.csv", self.n_kept_feats))
    }

    /// Clustering file for an already-rounded score.
    #[must_use]
    pub fn clustering(&self, score: f64) -> PathBuf {
        self.dir.join(format!(
            "clustering-{}-{}-{}.csv",
            self.n_kept_feats,
            self.n_clusters,
            format_score(score)
        ))
    }

    #[must_use]
    pub fn arff(&self) -> PathBuf {
        self.dir
            .join(format!("data-{}-{}.arff", self.n_kept_feats, self.n_clusters))
    }

    /// Ranked feature list holding `keep` names.
    #[must_use]
    pub fn kept_feats(&self, keep: usize) -> PathBuf {
        self.dir
            .join(format!("kept_feats-{}-{}.txt", keep, self.n_clusters))
    }

    #[must_use]
    pub fn manifest(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// `iter<N>`
#[must_use]
pub fn iteration_dir_name(iteration: usize) -> String {
    format!("{ITERATION_PREFIX}{iteration}")
}

/// Parse an iteration directory name. Leading zeros and signs are rejected
/// so that every number has exactly one directory name.
#[must_use]
pub fn parse_iteration_dir_name(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(ITERATION_PREFIX)?;
    if digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || (digits.len() > 1 && digits.starts_with('0'))
    {
        return None;
    }
    digits.parse().ok()
}

/// An artifact file name decoded into its components.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactName {
    Data { n_kept_feats: usize },
    ColTypes { n_kept_feats: usize },
    Clustering { n_kept_feats: usize, n_clusters: usize, score: f64 },
    Arff { n_kept_feats: usize, n_clusters: usize },
    KeptFeats { keep: usize, n_clusters: usize },
}

impl ArtifactName {
    /// Kind label used in reports and manifests.
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactName::Data { .. } => ArtifactKind::Data,
            ArtifactName::ColTypes { .. } => ArtifactKind::ColTypes,
            ArtifactName::Clustering { .. } => ArtifactKind::Clustering,
            ArtifactName::Arff { .. } => ArtifactKind::Arff,
            ArtifactName::KeptFeats { .. } => ArtifactKind::KeptFeats,
        }
    }
}

/// The five artifact kinds of a completed iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Data,
    ColTypes,
    Clustering,
    Arff,
    KeptFeats,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Data,
        ArtifactKind::ColTypes,
        ArtifactKind::Clustering,
        ArtifactKind::Arff,
        ArtifactKind::KeptFeats,
    ];
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Data => "data",
            ArtifactKind::ColTypes => "col-types",
            ArtifactKind::Clustering => "clustering",
            ArtifactKind::Arff => "arff",
            ArtifactKind::KeptFeats => "kept_feats",
        };
        f.write_str(name)
    }
}

fn artifact_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:",
            r"data-(?P<data>\d+)\.csv",
            r"|col-types-(?P<types>\d+)\.csv",
            r"|clustering-(?P<cn>\d+)-(?P<ck>\d+)-(?P<score>-?\d+\.\d+)\.csv",
            r"|data-(?P<an>\d+)-(?P<ak>\d+)\.arff",
            r"|kept_feats-(?P<keep>\d+)-(?P<kk>\d+)\.txt",
            r")$"
        ))
        .expect("artifact name pattern is valid")
    })
}

/// Decode an artifact file name; `None` for anything else.
#[must_use]
pub fn parse_artifact_name(file_name: &str) -> Option<ArtifactName> {
    let caps = artifact_pattern().captures(file_name)?;
    let num = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<usize>().ok());

    if let Some(n) = num("data") {
        return Some(ArtifactName::Data { n_kept_feats: n });
    }
    if let Some(n) = num("types") {
        return Some(ArtifactName::ColTypes { n_kept_feats: n });
    }
    if let (Some(n), Some(k)) = (num("cn"), num("ck")) {
        let score = caps.name("score")?.as_str().parse::<f64>().ok()?;
        return Some(ArtifactName::Clustering {
            n_kept_feats: n,
            n_clusters: k,
            score,
        });
    }
    if let (Some(n), Some(k)) = (num("an"), num("ak")) {
        return Some(ArtifactName::Arff {
            n_kept_feats: n,
            n_clusters: k,
        });
    }
    if let (Some(keep), Some(k)) = (num("keep"), num("kk")) {
        return Some(ArtifactName::KeptFeats {
            keep,
            n_clusters: k,
        });
    }
    None
}
