//! cohortsift - iterative feature reduction for cohort subgroup discovery
//!
//! Clusters a cohort's typed dataset, ranks its features against the cluster
//! labels, keeps the top nine tenths and repeats. Every iteration leaves a
//! directory of human-readable artifacts plus a manifest, so an interrupted
//! run resumes from the last complete iteration.
//!
//! # Architecture
//!
//! - [`artifacts`] - Artifact naming and directory layout
//! - [`checkpoint`] - Iteration manifests and resume-point detection
//! - [`collab`] - Clustering and feature-ranking collaborators
//! - [`config`] - Project settings
//! - [`dataset`] - Typed tabular data, CSV and ARFF I/O
//! - [`error`] - Error types
//! - [`pipeline`] - The iteration state machine
//! - [`prep`] - Dataset preparation (combine, subsample)
//! - [`reports`] - Best-score and category-count reports
//! - [`testing`] - Mock collaborators and demo data
//!
//! # Example
//!
//! ```rust,ignore
//! use cohortsift::{ArtifactLayout, ConfigKey, PipelineController, PipelineRequest};
//! use cohortsift::collab::{KMeansClusterer, InfoGainRanker};
//! use std::sync::Arc;
//!
//! let controller = PipelineController::new(
//!     ArtifactLayout::new("clean-data"),
//!     Arc::new(KMeansClusterer::new()),
//!     Arc::new(InfoGainRanker::new(10)),
//! );
//! let request = PipelineRequest::new(ConfigKey::new("adni", "feats", "kmeans", 3), 5);
//! let outcome = controller.run(&request).await?;
//! ```

pub mod artifacts;
pub mod checkpoint;
pub mod collab;
pub mod config;
pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod prep;
pub mod reports;
pub mod testing;

// Re-export commonly used types
pub use error::{Result, SiftError, StageContext};

pub use artifacts::{ArtifactKind, ArtifactLayout, ArtifactName, ConfigKey};
pub use checkpoint::{CheckpointLocator, IterationManifest, ManifestStore, ResumePoint};
pub use collab::{ClusterAssignment, Clusterer, FeatureRanker, RankRequest};
pub use config::{PipelineSettings, RankerKind};
pub use dataset::{Clustering, ColumnType, ColumnTypes, TypedDataset};
pub use pipeline::{
    decay_schedule, IterationState, PipelineController, PipelineControllerConfig,
    PipelineOutcome, PipelineRequest, Stage,
};
