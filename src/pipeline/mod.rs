//! The iterative feature-reduction loop.
//!
//! One iteration walks five stages in a fixed order:
//!
//! ```text
//! SELECT_FEATURES → CLUSTER → SCORE → EXPORT_LABELED → RANK_FEATURES
//!        ^                                                   │
//!        └──────────── IterationState { i + 1, keep } ───────┘
//! ```
//!
//! The only state carried between iterations is [`IterationState`]. Every
//! stage reads its inputs from and writes its outputs to the artifact tree,
//! which is what makes a run resumable.

pub mod controller;
pub mod lock;
pub mod timeout;

pub use controller::{
    IterationSummary, PipelineController, PipelineControllerConfig, PipelineOutcome,
};
pub use lock::ConfigLock;

use crate::artifacts::ConfigKey;
use crate::checkpoint::ResumePoint;
use crate::error::{Result, SiftError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fraction of features kept by each ranking stage.
pub const DECAY_FACTOR: f64 = 0.9;

// ============================================================================
// Stage
// ============================================================================

/// A step of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    SelectFeatures,
    Cluster,
    Score,
    ExportLabeled,
    RankFeatures,
}

impl Stage {
    /// Stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::SelectFeatures,
        Stage::Cluster,
        Stage::Score,
        Stage::ExportLabeled,
        Stage::RankFeatures,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::SelectFeatures => "SELECT_FEATURES",
            Stage::Cluster => "CLUSTER",
            Stage::Score => "SCORE",
            Stage::ExportLabeled => "EXPORT_LABELED",
            Stage::RankFeatures => "RANK_FEATURES",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Decay Schedule
// ============================================================================

/// `floor(current × 0.9)`, computed exactly in integers.
///
/// # Errors
///
/// Returns [`SiftError::FeatureBudgetExhausted`] when the result is zero.
pub fn next_keep_count(current: usize) -> Result<usize> {
    let keep = current.saturating_mul(9) / 10;
    if keep == 0 {
        return Err(SiftError::FeatureBudgetExhausted {
            current,
            requested: keep,
        });
    }
    Ok(keep)
}

/// One row of a decay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleStep {
    pub iteration: usize,
    pub n_kept_feats: usize,
    pub keep: usize,
}

/// Feature counts for `n_iterations` iterations starting from `n_features`.
///
/// # Errors
///
/// Returns [`SiftError::FeatureBudgetExhausted`] for the first iteration
/// whose keep-count would be zero.
pub fn decay_schedule(n_features: usize, n_iterations: usize) -> Result<Vec<ScheduleStep>> {
    let mut steps = Vec::with_capacity(n_iterations);
    let mut current = n_features;
    for iteration in 0..n_iterations {
        let keep = next_keep_count(current)?;
        steps.push(ScheduleStep {
            iteration,
            n_kept_feats: current,
            keep,
        });
        current = keep;
    }
    Ok(steps)
}

// ============================================================================
// Iteration State
// ============================================================================

/// Value threaded from one iteration into the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationState {
    pub iteration: usize,
    /// `None` means "all features of the base dataset".
    pub n_kept_feats: Option<usize>,
}

impl IterationState {
    #[must_use]
    pub fn initial() -> Self {
        Self {
            iteration: 0,
            n_kept_feats: None,
        }
    }

    /// State produced by a finished iteration that kept `keep` features.
    #[must_use]
    pub fn advance(self, keep: usize) -> Self {
        Self {
            iteration: self.iteration + 1,
            n_kept_feats: Some(keep),
        }
    }
}

impl From<&ResumePoint> for IterationState {
    fn from(point: &ResumePoint) -> Self {
        Self {
            iteration: point.iteration,
            n_kept_feats: point.n_kept_feats,
        }
    }
}

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    pub key: ConfigKey,
    /// Total iterations, counting ones already completed when resuming.
    pub n_iterations: usize,
    pub resume: bool,
}

impl PipelineRequest {
    #[must_use]
    pub fn new(key: ConfigKey, n_iterations: usize) -> Self {
        Self {
            key,
            n_iterations,
            resume: false,
        }
    }

    #[must_use]
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }
}
