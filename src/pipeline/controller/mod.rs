//! Pipeline controller.
//!
//! The [`PipelineController`] owns the iteration loop: it takes the
//! configuration lock, asks the [`CheckpointLocator`] where to start,
//! discards directories the locator reports as stale, and then runs one
//! iteration after another until the requested total is reached.
//!
//! # Dependency Injection
//!
//! The clustering and ranking collaborators are trait objects, so tests run
//! the full loop against the mocks in [`crate::testing`].
//!
//! # Example
//!
//! ```rust,ignore
//! use cohortsift::artifacts::{ArtifactLayout, ConfigKey};
//! use cohortsift::collab::{InfoGainRanker, KMeansClusterer};
//! use cohortsift::pipeline::{PipelineController, PipelineRequest};
//! use std::sync::Arc;
//!
//! let controller = PipelineController::new(
//!     ArtifactLayout::new("clean-data"),
//!     Arc::new(KMeansClusterer::new()),
//!     Arc::new(InfoGainRanker::default()),
//! );
//! let request = PipelineRequest::new(ConfigKey::new("demo", "feats", "kmeans", 2), 2);
//! let outcome = controller.run(&request).await?;
//! ```

mod stages;

use super::lock::ConfigLock;
use super::{IterationState, PipelineRequest};
use crate::artifacts::{ArtifactLayout, ConfigKey};
use crate::checkpoint::{CheckpointLocator, ResumePoint};
use crate::collab::{Clusterer, FeatureRanker};
use crate::config::PipelineSettings;
use crate::error::{Result, SiftError};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use stages::IterationRun;

// ============================================================================
// Controller Configuration
// ============================================================================

/// Tunables of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineControllerConfig {
    /// Identifier column of every data table.
    pub id_column: String,

    /// Label column of clustering files and class attribute of the export.
    pub cluster_column: String,

    pub cluster_timeout: Duration,
    pub rank_timeout: Duration,

    /// Draw a progress bar on stderr.
    pub show_progress: bool,
}

impl Default for PipelineControllerConfig {
    fn default() -> Self {
        Self {
            id_column: "PTID".to_string(),
            cluster_column: "cluster_id".to_string(),
            cluster_timeout: Duration::from_secs(600),
            rank_timeout: Duration::from_secs(1800),
            show_progress: false,
        }
    }
}

impl PipelineControllerConfig {
    #[must_use]
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            id_column: settings.id_column.clone(),
            cluster_column: settings.cluster_column.clone(),
            cluster_timeout: settings.cluster_timeout(),
            rank_timeout: settings.rank_timeout(),
            show_progress: false,
        }
    }

    #[must_use]
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    #[must_use]
    pub fn with_cluster_column(mut self, column: impl Into<String>) -> Self {
        self.cluster_column = column.into();
        self
    }

    #[must_use]
    pub fn with_cluster_timeout(mut self, timeout: Duration) -> Self {
        self.cluster_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_rank_timeout(mut self, timeout: Duration) -> Self {
        self.rank_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Result of one finished iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationSummary {
    pub iteration: usize,
    pub n_kept_feats: usize,
    pub score: f64,
    pub keep: usize,
    pub dir: PathBuf,
}

/// Result of a whole run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Where the run started.
    pub start: ResumePoint,
    /// Iterations executed by this run, in order.
    pub iterations: Vec<IterationSummary>,
    /// State the next run would start from.
    pub final_state: IterationState,
}

// ============================================================================
// Controller
// ============================================================================

/// Runs the iteration state machine for one configuration at a time.
pub struct PipelineController {
    layout: ArtifactLayout,
    locator: CheckpointLocator,
    clusterer: Arc<dyn Clusterer>,
    ranker: Arc<dyn FeatureRanker>,
    config: PipelineControllerConfig,
    run_id: String,
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("layout", &self.layout)
            .field("clusterer", &self.clusterer.name())
            .field("ranker", &self.ranker.name())
            .field("config", &self.config)
            .field("run_id", &self.run_id)
            .finish()
    }
}

impl PipelineController {
    #[must_use]
    pub fn new(
        layout: ArtifactLayout,
        clusterer: Arc<dyn Clusterer>,
        ranker: Arc<dyn FeatureRanker>,
    ) -> Self {
        Self {
            locator: CheckpointLocator::new(layout.clone()),
            layout,
            clusterer,
            ranker,
            config: PipelineControllerConfig::default(),
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PipelineControllerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    #[must_use]
    pub fn config(&self) -> &PipelineControllerConfig {
        &self.config
    }

    /// Identifier stamped into every manifest this controller writes.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn check_request(&self, request: &PipelineRequest) -> Result<()> {
        let key = &request.key;
        if key.n_clusters == 0 {
            return Err(SiftError::invalid_config("nClusters", "must be at least 1"));
        }
        if key.cluster_method != self.clusterer.name() {
            return Err(SiftError::invalid_config(
                "clusterMethod",
                format!(
                    "configuration names '{}' but the clusterer is '{}'",
                    key.cluster_method,
                    self.clusterer.name()
                ),
            ));
        }
        if self.config.id_column == self.config.cluster_column {
            return Err(SiftError::invalid_config(
                "clusterColumn",
                "must differ from the identifier column",
            ));
        }
        Ok(())
    }

    /// Remove iteration directories that a fresh run or a resume must not
    /// see again.
    fn discard(&self, key: &ConfigKey, start: &ResumePoint, resume: bool) -> Result<()> {
        let doomed: Vec<PathBuf> = if resume {
            start.stale.clone()
        } else {
            self.locator
                .iteration_dirs(key)?
                .into_iter()
                .map(|(_, dir)| dir)
                .collect()
        };

        for dir in doomed {
            warn!("Removing {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    fn progress_bar(&self, start: usize, total: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style);
        }
        pb.set_position(start as u64);
        pb
    }

    /// Run (or resume) a configuration until `n_iterations` iterations
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any stage, wrapped with its
    /// iteration and stage, or a lock, resume or configuration error raised
    /// before the loop starts.
    pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineOutcome> {
        self.check_request(request)?;
        let key = &request.key;

        let config_dir = self.layout.config_dir(key);
        let _lock = ConfigLock::acquire(&config_dir)?;

        let start = self.locator.locate(key, request.resume)?;
        self.discard(key, &start, request.resume)?;

        let mut state = IterationState::from(&start);
        if request.resume {
            info!(
                "Resuming {} at iteration {} ({} features)",
                key,
                state.iteration,
                state
                    .n_kept_feats
                    .map_or_else(|| "all".to_string(), |n| n.to_string())
            );
        } else {
            info!("Starting {} from scratch", key);
        }

        let mut iterations = Vec::new();
        if state.iteration >= request.n_iterations {
            info!(
                "{} already has {} iterations; nothing to run",
                key, state.iteration
            );
            return Ok(PipelineOutcome {
                start,
                iterations,
                final_state: state,
            });
        }

        let pb = self.progress_bar(state.iteration, request.n_iterations);
        while state.iteration < request.n_iterations {
            pb.set_message(format!("Iteration {}", state.iteration));

            let run = IterationRun::begin(self, key, state)?;
            let summary = run.execute().await?;

            info!(
                "Iteration {} done: {} features, score {:.2}, keeping {}",
                summary.iteration, summary.n_kept_feats, summary.score, summary.keep
            );
            state = state.advance(summary.keep);
            iterations.push(summary);
            pb.inc(1);
        }
        pb.finish_and_clear();

        Ok(PipelineOutcome {
            start,
            iterations,
            final_state: state,
        })
    }
}
