//! Pipeline settings.
//!
//! Settings live in `<project>/.cohortsift/settings.json` (camelCase keys).
//! A missing file yields the defaults; command-line flags override
//! individual fields after loading.

use crate::error::{Result, SiftError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding the settings file, relative to the project root.
pub const SETTINGS_DIR: &str = ".cohortsift";

const SETTINGS_FILE: &str = "settings.json";

/// Which feature ranker the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RankerKind {
    #[default]
    InfoGain,
    Weka,
}

/// K-means / k-medoids tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KMeansSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub seed: u64,
}

fn default_max_iterations() -> usize {
    300
}

impl Default for KMeansSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            seed: 0,
        }
    }
}

/// Information-gain ranker tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoGainSettings {
    #[serde(default = "default_bins")]
    pub bins: usize,
}

fn default_bins() -> usize {
    crate::collab::info_gain::DEFAULT_BINS
}

impl Default for InfoGainSettings {
    fn default() -> Self {
        Self {
            bins: default_bins(),
        }
    }
}

/// Project-level pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSettings {
    /// Artifact root, relative to the project unless absolute.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_id_column")]
    pub id_column: String,

    #[serde(default = "default_cluster_column")]
    pub cluster_column: String,

    #[serde(default = "default_cluster_method")]
    pub cluster_method: String,

    #[serde(default)]
    pub ranker: RankerKind,

    /// Path to `weka.jar`; required when `ranker` is `weka`.
    #[serde(default)]
    pub weka_jar: Option<PathBuf>,

    #[serde(default = "default_cluster_timeout")]
    pub cluster_timeout_secs: u64,

    #[serde(default = "default_rank_timeout")]
    pub rank_timeout_secs: u64,

    #[serde(default)]
    pub kmeans: KMeansSettings,

    #[serde(default)]
    pub info_gain: InfoGainSettings,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("clean-data")
}

fn default_id_column() -> String {
    "PTID".to_string()
}

fn default_cluster_column() -> String {
    "cluster_id".to_string()
}

fn default_cluster_method() -> String {
    "kmeans".to_string()
}

fn default_cluster_timeout() -> u64 {
    600
}

fn default_rank_timeout() -> u64 {
    1800
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            id_column: default_id_column(),
            cluster_column: default_cluster_column(),
            cluster_method: default_cluster_method(),
            ranker: RankerKind::default(),
            weka_jar: None,
            cluster_timeout_secs: default_cluster_timeout(),
            rank_timeout_secs: default_rank_timeout(),
            kmeans: KMeansSettings::default(),
            info_gain: InfoGainSettings::default(),
        }
    }
}

impl PipelineSettings {
    /// Load settings for a project, or defaults if none are saved.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Config`] if the file exists but cannot be read
    /// or parsed.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = Self::settings_path(project_dir);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            SiftError::config_with_path(format!("cannot read settings: {e}"), path.clone())
        })?;
        serde_json::from_str(&content).map_err(|e| {
            SiftError::config_with_path(format!("cannot parse settings: {e}"), path.clone())
        })
    }

    /// `<project>/.cohortsift/settings.json`
    #[must_use]
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(SETTINGS_DIR).join(SETTINGS_FILE)
    }

    /// Artifact root resolved against the project directory.
    #[must_use]
    pub fn resolve_data_dir(&self, project_dir: &Path) -> PathBuf {
        if self.data_dir.is_absolute() {
            self.data_dir.clone()
        } else {
            project_dir.join(&self.data_dir)
        }
    }

    #[must_use]
    pub fn cluster_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster_timeout_secs)
    }

    #[must_use]
    pub fn rank_timeout(&self) -> Duration {
        Duration::from_secs(self.rank_timeout_secs)
    }

    /// Check field values that deserialisation cannot.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.id_column.trim().is_empty() {
            return Err(SiftError::invalid_config("idColumn", "must not be empty"));
        }
        if self.cluster_column.trim().is_empty() {
            return Err(SiftError::invalid_config("clusterColumn", "must not be empty"));
        }
        if self.id_column == self.cluster_column {
            return Err(SiftError::invalid_config(
                "clusterColumn",
                "must differ from idColumn",
            ));
        }
        if self.cluster_timeout_secs == 0 {
            return Err(SiftError::invalid_config(
                "clusterTimeoutSecs",
                "must be greater than 0",
            ));
        }
        if self.rank_timeout_secs == 0 {
            return Err(SiftError::invalid_config(
                "rankTimeoutSecs",
                "must be greater than 0",
            ));
        }
        if self.kmeans.max_iterations == 0 {
            return Err(SiftError::invalid_config(
                "kmeans.maxIterations",
                "must be greater than 0",
            ));
        }
        if self.info_gain.bins == 0 {
            return Err(SiftError::invalid_config("infoGain.bins", "must be greater than 0"));
        }
        if self.ranker == RankerKind::Weka && self.weka_jar.is_none() {
            return Err(SiftError::invalid_config(
                "wekaJar",
                "required when ranker is 'weka'",
            ));
        }
        Ok(())
    }
}
