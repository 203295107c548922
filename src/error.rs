//! Custom error types for cohortsift.
//!
//! Every failure the pipeline can hit is a variant of [`SiftError`]. All of
//! them are fatal to the current run: nothing is retried, and the iteration
//! directory that was being written is left for the next resume to discard.

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

/// Main error type for cohortsift operations
#[derive(Error, Debug)]
pub enum SiftError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Missing required file
    #[error("Missing required file: {path}")]
    MissingFile { path: PathBuf },

    // =========================================================================
    // Checkpoint Errors
    // =========================================================================
    /// Nothing usable to resume from
    #[error("Cannot resume from {root}: {reason}")]
    InvalidResumeState { root: PathBuf, reason: String },

    /// Another run holds the configuration lock
    #[error("Another pipeline run is active for {root}")]
    PipelineBusy { root: PathBuf },

    // =========================================================================
    // Feature Budget Errors
    // =========================================================================
    /// The ranking collaborator broke its output contract
    #[error("Ranking contract violated: requested {requested} features, got {returned} ({detail})")]
    RankingContractViolation {
        requested: usize,
        returned: usize,
        detail: String,
    },

    /// The decay schedule would request zero features
    #[error("Feature budget exhausted: {current} retained features decay to {requested}")]
    FeatureBudgetExhausted { current: usize, requested: usize },

    // =========================================================================
    // Typed Dataset Errors
    // =========================================================================
    /// Data columns and column-type table disagree
    #[error("Column set mismatch: {detail}")]
    ColumnSetMismatch { detail: String },

    /// A column type that is neither numeric nor nominal
    #[error("Unknown column type '{value}' for column '{column}'")]
    UnknownColumnType { column: String, value: String },

    /// Malformed tabular or ARFF content
    #[error("Malformed data in {source_name}: {message}")]
    DataFormat {
        source_name: String,
        message: String,
    },

    /// An invariant the pipeline relies on did not hold
    #[error("Unexpected state: {message}")]
    UnexpectedState { message: String },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// A collaborator call exceeded its time budget
    #[error("Collaborator '{collaborator}' timed out after {timeout_ms}ms")]
    CollaboratorTimeout { collaborator: String, timeout_ms: u64 },

    /// A collaborator failed outright
    #[error("Collaborator '{collaborator}' failed: {message}")]
    Collaborator {
        collaborator: String,
        message: String,
    },

    // =========================================================================
    // Stage Context
    // =========================================================================
    /// An error raised inside a pipeline stage
    #[error("Iteration {iteration}, stage {stage}: {source}")]
    StageFailed {
        iteration: usize,
        stage: Stage,
        #[source]
        source: Box<SiftError>,
    },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// CSV error wrapper
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Collaborator internals reported through anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SiftError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a resume error
    pub fn invalid_resume(root: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidResumeState {
            root: root.into(),
            reason: reason.into(),
        }
    }

    /// Create a column set mismatch error
    pub fn column_mismatch(detail: impl Into<String>) -> Self {
        Self::ColumnSetMismatch {
            detail: detail.into(),
        }
    }

    /// Create a data format error
    pub fn data_format(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataFormat {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an unexpected state error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedState {
            message: message.into(),
        }
    }

    /// Create a collaborator failure
    pub fn collaborator(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Attach iteration and stage context.
    ///
    /// Errors that already carry stage context are returned unchanged.
    pub fn at_stage(self, iteration: usize, stage: Stage) -> Self {
        match self {
            Self::StageFailed { .. } => self,
            other => Self::StageFailed {
                iteration,
                stage,
                source: Box::new(other),
            },
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// The innermost error, with stage context stripped.
    #[must_use]
    pub fn root_cause(&self) -> &SiftError {
        match self {
            Self::StageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Iteration and stage the error was raised in, if known.
    #[must_use]
    pub fn stage_context(&self) -> Option<(usize, Stage)> {
        match self {
            Self::StageFailed {
                iteration, stage, ..
            } => Some((*iteration, *stage)),
            _ => None,
        }
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self.root_cause() {
            Self::InvalidResumeState { .. } | Self::PipelineBusy { .. } => 2,
            Self::RankingContractViolation { .. } => 3,
            Self::FeatureBudgetExhausted { .. } => 4,
            Self::ColumnSetMismatch { .. }
            | Self::UnknownColumnType { .. }
            | Self::DataFormat { .. } => 5,
            Self::MissingFile { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            Self::CollaboratorTimeout { .. } | Self::Collaborator { .. } | Self::Other(_) => 8,
            _ => 1,
        }
    }
}

/// Type alias for cohortsift results
pub type Result<T> = std::result::Result<T, SiftError>;

/// Extension trait for tagging errors with the stage they happened in
pub trait StageContext<T> {
    fn at_stage(self, iteration: usize, stage: Stage) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn at_stage(self, iteration: usize, stage: Stage) -> Result<T> {
        self.map_err(|e| e.at_stage(iteration, stage))
    }
}
