//! Per-iteration checkpoints.
//!
//! Every iteration directory carries a [`IterationManifest`] next to its
//! artifacts. The manifest records which stages finished, the clustering
//! score, the keep-count handed to the next iteration and a SHA-256 digest of
//! every artifact. It is rewritten atomically after each stage, so a
//! directory whose manifest is not marked complete was interrupted.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ CheckpointLocator│────>│ ManifestStore    │────>│ IterationManifest│
//! │ scan / locate    │     │ load / save      │     │ stages, digests  │
//! └──────────────────┘     └──────────────────┘     └──────────────────┘
//!          │
//!          v
//! ┌──────────────────┐
//! │ ResumePoint      │  next iteration, seed keep-count, stale dirs
//! └──────────────────┘
//! ```

pub mod locator;
pub mod persistence;

pub use locator::{CheckpointLocator, IterationRecord, ResumePoint};
pub use persistence::ManifestStore;

use crate::artifacts::{ArtifactKind, ConfigKey};
use crate::error::Result;
use crate::pipeline::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

// ============================================================================
// Artifact Records
// ============================================================================

/// File name and content digest of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub file_name: String,
    pub sha256: String,
}

/// Outcome of re-hashing an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestStatus {
    Ok,
    Mismatch,
    Missing,
}

/// SHA-256 of a file's contents, hex encoded.
///
/// # Errors
///
/// Returns an IO error if the file cannot be read.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ============================================================================
// Iteration Manifest
// ============================================================================

/// Durable record of one iteration's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationManifest {
    pub version: u32,
    pub run_id: String,
    pub config: ConfigKey,
    pub iteration: usize,

    /// Feature count this iteration runs on, known once features are selected.
    pub n_kept_feats: Option<usize>,

    /// Stages finished, in execution order.
    #[serde(default)]
    pub completed_stages: Vec<Stage>,

    pub clustering_score: Option<f64>,

    /// Keep-count produced by the ranking stage; seeds the next iteration.
    pub next_n_kept_feats: Option<usize>,

    #[serde(default)]
    pub artifacts: BTreeMap<ArtifactKind, ArtifactRecord>,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IterationManifest {
    /// Fresh manifest for an iteration that is about to start.
    #[must_use]
    pub fn new(config: ConfigKey, iteration: usize, run_id: impl Into<String>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            run_id: run_id.into(),
            config,
            iteration,
            n_kept_feats: None,
            completed_stages: Vec::new(),
            clustering_score: None,
            next_n_kept_feats: None,
            artifacts: BTreeMap::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    #[must_use]
    pub fn is_version_compatible(&self) -> bool {
        self.version == MANIFEST_VERSION
    }

    /// Record a finished stage. Repeats are ignored.
    pub fn record_stage(&mut self, stage: Stage) {
        if !self.completed_stages.contains(&stage) {
            self.completed_stages.push(stage);
        }
    }

    #[must_use]
    pub fn has_stage(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Hash an artifact on disk and record it under `kind`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read.
    pub fn record_artifact(&mut self, kind: ArtifactKind, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sha256 = file_digest(path)?;
        self.artifacts
            .insert(kind, ArtifactRecord { file_name, sha256 });
        Ok(())
    }

    /// Seal the manifest after the ranking stage.
    pub fn mark_complete(&mut self, next_n_kept_feats: usize) {
        self.next_n_kept_feats = Some(next_n_kept_feats);
        self.completed_at = Some(Utc::now());
    }

    /// Complete means every stage ran and every artifact was recorded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
            && self.next_n_kept_feats.is_some()
            && Stage::ALL.iter().all(|s| self.has_stage(*s))
            && ArtifactKind::ALL
                .iter()
                .all(|k| self.artifacts.contains_key(k))
    }

    /// Re-hash every recorded artifact under `dir`.
    #[must_use]
    pub fn verify(&self, dir: &Path) -> Vec<(ArtifactKind, DigestStatus)> {
        self.artifacts
            .iter()
            .map(|(kind, record)| {
                let path = dir.join(&record.file_name);
                let status = if !path.exists() {
                    DigestStatus::Missing
                } else {
                    match file_digest(&path) {
                        Ok(digest) if digest == record.sha256 => DigestStatus::Ok,
                        _ => DigestStatus::Mismatch,
                    }
                };
                (*kind, status)
            })
            .collect()
    }

    /// One-line description for status output.
    #[must_use]
    pub fn summary(&self) -> String {
        let features = self
            .n_kept_feats
            .map_or_else(|| "?".to_string(), |n| n.to_string());
        let score = self
            .clustering_score
            .map_or_else(|| "-".to_string(), |s| format!("{s:.2}"));
        let next = self
            .next_n_kept_feats
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        format!(
            "iter{}: {} features, score {}, next {} ({}/{} stages)",
            self.iteration,
            features,
            score,
            next,
            self.completed_stages.len(),
            Stage::ALL.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn manifest() -> IterationManifest {
        IterationManifest::new(ConfigKey::new("demo", "feats", "kmeans", 2), 0, "run-1")
    }

    #[test]
    fn test_new_manifest_is_incomplete() {
        let m = manifest();
        assert!(!m.is_complete());
        assert!(m.is_version_compatible());
        assert!(m.completed_stages.is_empty());
    }

    #[test]
    fn test_record_stage_ignores_repeats() {
        let mut m = manifest();
        m.record_stage(Stage::SelectFeatures);
        m.record_stage(Stage::SelectFeatures);
        assert_eq!(m.completed_stages, vec![Stage::SelectFeatures]);
    }

    #[test]
    fn test_complete_requires_all_stages_and_artifacts() {
        let dir = TempDir::new().expect("create temp dir");
        let mut m = manifest();

        for (i, kind) in ArtifactKind::ALL.iter().enumerate() {
            let path = dir.path().join(format!("artifact-{i}"));
            fs::write(&path, format!("content {i}")).expect("write");
            m.record_artifact(*kind, &path).expect("record");
        }
        m.mark_complete(4);
        assert!(!m.is_complete());

        for stage in Stage::ALL {
            m.record_stage(stage);
        }
        assert!(m.is_complete());
    }

    #[test]
    fn test_verify_detects_tampering() {
        let dir = TempDir::new().expect("create temp dir");
        let data = dir.path().join("data-5.csv");
        let arff = dir.path().join("data-5-2.arff");
        fs::write(&data, "PTID,AGE\np1,71\n").expect("write");
        fs::write(&arff, "@RELATION X\n").expect("write");

        let mut m = manifest();
        m.record_artifact(ArtifactKind::Data, &data).expect("record");
        m.record_artifact(ArtifactKind::Arff, &arff).expect("record");

        fs::write(&data, "PTID,AGE\np1,72\n").expect("write");
        fs::remove_file(&arff).expect("remove");

        let statuses: BTreeMap<_, _> = m.verify(dir.path()).into_iter().collect();
        assert_eq!(statuses[&ArtifactKind::Data], DigestStatus::Mismatch);
        assert_eq!(statuses[&ArtifactKind::Arff], DigestStatus::Missing);
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("empty");
        fs::write(&path, "").expect("write");
        assert_eq!(
            file_digest(&path).expect("digest"),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_manifest_json_uses_stage_names() {
        let mut m = manifest();
        m.record_stage(Stage::ExportLabeled);
        let json = serde_json::to_string(&m).expect("serialize");
        assert!(json.contains("EXPORT_LABELED"));
    }
}
