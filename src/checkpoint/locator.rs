//! Recovers the resume point of a configuration from the filesystem.
//!
//! The locator never writes. It reads iteration directories in numeric
//! order, decides which ones completed, and reports where the next run must
//! start and which keep-count seeds it.

use super::{IterationManifest, ManifestStore};
use crate::artifacts::{
    parse_artifact_name, parse_iteration_dir_name, ArtifactKind, ArtifactLayout, ArtifactName,
    ConfigKey,
};
use crate::error::{Result, SiftError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a run picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    /// Iteration to run next.
    pub iteration: usize,
    /// Feature count seeding `iteration`; `None` means the full base dataset.
    pub n_kept_feats: Option<usize>,
    /// Iteration directories at or after `iteration`, to be discarded.
    pub stale: Vec<PathBuf>,
}

impl ResumePoint {
    /// Start from scratch.
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            iteration: 0,
            n_kept_feats: None,
            stale: Vec::new(),
        }
    }
}

/// What the locator found in one iteration directory.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub iteration: usize,
    pub dir: PathBuf,
    pub manifest: Option<IterationManifest>,
    /// Artifact files present, by kind. A kind with several candidates keeps
    /// all of them so ambiguity can be reported.
    pub files: BTreeMap<ArtifactKind, Vec<(String, ArtifactName)>>,
}

impl IterationRecord {
    /// Read one iteration directory.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be listed.
    pub fn read(dir: &Path, iteration: usize, n_clusters: usize) -> Result<Self> {
        let mut files: BTreeMap<ArtifactKind, Vec<(String, ArtifactName)>> = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(parsed) = parse_artifact_name(&file_name) else {
                continue;
            };
            if !matches_clusters(&parsed, n_clusters) {
                debug!("Ignoring {} (different cluster count)", file_name);
                continue;
            }
            files
                .entry(parsed.kind())
                .or_default()
                .push((file_name, parsed));
        }
        for candidates in files.values_mut() {
            candidates.sort_by(|a, b| a.0.cmp(&b.0));
        }

        let manifest = ManifestStore::new(dir).load()?;
        Ok(Self {
            iteration,
            dir: dir.to_path_buf(),
            manifest,
            files,
        })
    }

    /// Whether all five artifact kinds exist (and, with a manifest, whether
    /// it is sealed).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        let all_present = ArtifactKind::ALL
            .iter()
            .all(|k| self.files.get(k).is_some_and(|v| !v.is_empty()));
        match &self.manifest {
            Some(manifest) => all_present && manifest.is_complete(),
            None => all_present,
        }
    }

    /// The single file of `kind`; a missing or ambiguous kind is an error.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::InvalidResumeState`] if zero or several files
    /// match and the manifest does not disambiguate.
    pub fn artifact(&self, kind: ArtifactKind) -> Result<(PathBuf, ArtifactName)> {
        let candidates = self.files.get(&kind).map(Vec::as_slice).unwrap_or_default();

        if let Some(record) = self.manifest.as_ref().and_then(|m| m.artifacts.get(&kind)) {
            if let Some((name, parsed)) = candidates.iter().find(|(n, _)| *n == record.file_name) {
                return Ok((self.dir.join(name), parsed.clone()));
            }
        }

        match candidates {
            [(name, parsed)] => Ok((self.dir.join(name), parsed.clone())),
            [] => Err(SiftError::invalid_resume(
                &self.dir,
                format!("no {kind} artifact"),
            )),
            _ => Err(SiftError::invalid_resume(
                &self.dir,
                format!("{} candidate {kind} artifacts", candidates.len()),
            )),
        }
    }

    /// Keep-count this iteration handed to its successor.
    ///
    /// The manifest's recorded value is authoritative; the `kept_feats` file
    /// name must agree with it.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::InvalidResumeState`] if the two disagree or no
    /// ranked list can be found.
    pub fn next_keep_count(&self) -> Result<usize> {
        let (_, parsed) = self.artifact(ArtifactKind::KeptFeats)?;
        let from_name = match parsed {
            ArtifactName::KeptFeats { keep, .. } => keep,
            other => {
                return Err(SiftError::unexpected(format!(
                    "expected a kept_feats artifact, found {other:?}"
                )))
            }
        };

        match self.manifest.as_ref().and_then(|m| m.next_n_kept_feats) {
            Some(recorded) if recorded != from_name => Err(SiftError::invalid_resume(
                &self.dir,
                format!(
                    "manifest records keep-count {recorded} but ranked list is named for {from_name}"
                ),
            )),
            Some(recorded) => Ok(recorded),
            None => Ok(from_name),
        }
    }

    /// Feature count this iteration ran on.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::InvalidResumeState`] if no data artifact exists.
    pub fn n_kept_feats(&self) -> Result<usize> {
        if let Some(n) = self.manifest.as_ref().and_then(|m| m.n_kept_feats) {
            return Ok(n);
        }
        match self.artifact(ArtifactKind::Data)?.1 {
            ArtifactName::Data { n_kept_feats } => Ok(n_kept_feats),
            other => Err(SiftError::unexpected(format!(
                "expected a data artifact, found {other:?}"
            ))),
        }
    }
}

fn matches_clusters(name: &ArtifactName, n_clusters: usize) -> bool {
    match name {
        ArtifactName::Data { .. } | ArtifactName::ColTypes { .. } => true,
        ArtifactName::Clustering { n_clusters: k, .. }
        | ArtifactName::Arff { n_clusters: k, .. }
        | ArtifactName::KeptFeats { n_clusters: k, .. } => *k == n_clusters,
    }
}

/// Filesystem scanner for one artifact root.
#[derive(Debug, Clone)]
pub struct CheckpointLocator {
    layout: ArtifactLayout,
}

impl CheckpointLocator {
    #[must_use]
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    #[must_use]
    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Iteration numbers and directories under a configuration, ascending.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the configuration directory exists but cannot
    /// be listed. A missing directory yields an empty list.
    pub fn iteration_dirs(&self, key: &ConfigKey) -> Result<Vec<(usize, PathBuf)>> {
        let root = self.layout.config_dir(key);
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut dirs = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(n) = parse_iteration_dir_name(&name.to_string_lossy()) {
                dirs.push((n, entry.path()));
            }
        }
        dirs.sort_by_key(|(n, _)| *n);
        Ok(dirs)
    }

    /// Read every iteration directory of a configuration.
    ///
    /// # Errors
    ///
    /// Propagates directory listing errors.
    pub fn scan(&self, key: &ConfigKey) -> Result<Vec<IterationRecord>> {
        self.iteration_dirs(key)?
            .into_iter()
            .map(|(n, dir)| IterationRecord::read(&dir, n, key.n_clusters))
            .collect()
    }

    /// Read a single iteration directory.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::InvalidResumeState`] if the directory is absent.
    pub fn inspect(&self, key: &ConfigKey, iteration: usize) -> Result<IterationRecord> {
        let dir = self.layout.iteration_dir(key, iteration);
        if !dir.is_dir() {
            return Err(SiftError::invalid_resume(
                &dir,
                "iteration directory does not exist",
            ));
        }
        IterationRecord::read(&dir, iteration, key.n_clusters)
    }

    /// Decide where a run starts.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::InvalidResumeState`] when resuming from a
    /// configuration with no iteration directories or with an inconsistent
    /// last completed iteration.
    pub fn locate(&self, key: &ConfigKey, resume: bool) -> Result<ResumePoint> {
        if !resume {
            return Ok(ResumePoint::fresh());
        }

        let root = self.layout.config_dir(key);
        let records = self.scan(key)?;
        if records.is_empty() {
            return Err(SiftError::invalid_resume(
                &root,
                "no iteration directories to resume from",
            ));
        }

        let mut last_complete: Option<usize> = None;
        for (expected, record) in records.iter().enumerate() {
            if record.iteration != expected || !record.is_complete() {
                break;
            }
            last_complete = Some(expected);
        }

        let (iteration, n_kept_feats) = match last_complete {
            None => (0, None),
            Some(k) => (k + 1, Some(records[k].next_keep_count()?)),
        };

        let stale: Vec<PathBuf> = records
            .iter()
            .filter(|r| r.iteration >= iteration)
            .map(|r| r.dir.clone())
            .collect();
        for dir in &stale {
            warn!("Discarding incomplete or orphaned iteration at {}", dir.display());
        }

        debug!(
            "Resume point for {}: iteration {}, seed {:?}",
            key, iteration, n_kept_feats
        );
        Ok(ResumePoint {
            iteration,
            n_kept_feats,
            stale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;
    use tempfile::TempDir;

    fn key() -> ConfigKey {
        ConfigKey::new("demo", "feats", "kmeans", 2)
    }

    fn temp_locator() -> (CheckpointLocator, TempDir) {
        let dir = TempDir::new().expect("create temp dir");
        (CheckpointLocator::new(ArtifactLayout::new(dir.path())), dir)
    }

    /// Write a finished iteration running on `n` features and keeping `keep`.
    fn complete_iteration(locator: &CheckpointLocator, iteration: usize, n: usize, keep: usize) {
        let paths = locator.layout().iteration(&key(), iteration, n);
        fs::create_dir_all(&paths.dir).expect("mkdir");

        let mut manifest = IterationManifest::new(key(), iteration, "run");
        manifest.n_kept_feats = Some(n);
        let files = [
            (ArtifactKind::Data, paths.data()),
            (ArtifactKind::ColTypes, paths.col_types()),
            (ArtifactKind::Clustering, paths.clustering(0.5)),
            (ArtifactKind::Arff, paths.arff()),
            (ArtifactKind::KeptFeats, paths.kept_feats(keep)),
        ];
        for (kind, path) in &files {
            fs::write(path, "x").expect("write");
            manifest.record_artifact(*kind, path).expect("record");
        }
        for stage in Stage::ALL {
            manifest.record_stage(stage);
        }
        manifest.mark_complete(keep);
        ManifestStore::new(&paths.dir).save(&manifest).expect("save");
    }

    fn partial_iteration(locator: &CheckpointLocator, iteration: usize, n: usize) {
        let paths = locator.layout().iteration(&key(), iteration, n);
        fs::create_dir_all(&paths.dir).expect("mkdir");
        fs::write(paths.data(), "x").expect("write");
        fs::write(paths.col_types(), "x").expect("write");
        let mut manifest = IterationManifest::new(key(), iteration, "run");
        manifest.record_stage(Stage::SelectFeatures);
        ManifestStore::new(&paths.dir).save(&manifest).expect("save");
    }

    #[test]
    fn test_fresh_start_without_resume() {
        let (locator, _dir) = temp_locator();
        complete_iteration(&locator, 0, 5, 4);
        assert_eq!(locator.locate(&key(), false).unwrap(), ResumePoint::fresh());
    }

    #[test]
    fn test_resume_with_missing_root() {
        let (locator, _dir) = temp_locator();
        let err = locator.locate(&key(), true).unwrap_err();
        assert!(matches!(err, SiftError::InvalidResumeState { .. }));
    }

    #[test]
    fn test_resume_with_no_iteration_dirs() {
        let (locator, _dir) = temp_locator();
        let root = locator.layout().config_dir(&key());
        fs::create_dir_all(root.join("notes")).unwrap();
        let err = locator.locate(&key(), true).unwrap_err();
        assert!(matches!(err, SiftError::InvalidResumeState { .. }));
    }

    #[test]
    fn test_resume_after_partial_iteration() {
        let (locator, _dir) = temp_locator();
        complete_iteration(&locator, 0, 5, 4);
        complete_iteration(&locator, 1, 4, 3);
        partial_iteration(&locator, 2, 3);

        let point = locator.locate(&key(), true).unwrap();
        assert_eq!(point.iteration, 2);
        assert_eq!(point.n_kept_feats, Some(3));
        assert_eq!(point.stale.len(), 1);
        assert!(point.stale[0].ends_with("iter2"));
    }

    #[test]
    fn test_resume_after_last_complete_iteration() {
        let (locator, _dir) = temp_locator();
        complete_iteration(&locator, 0, 5, 4);

        let point = locator.locate(&key(), true).unwrap();
        assert_eq!(point.iteration, 1);
        assert_eq!(point.n_kept_feats, Some(4));
        assert!(point.stale.is_empty());
    }

    #[test]
    fn test_incomplete_first_iteration_restarts() {
        let (locator, _dir) = temp_locator();
        partial_iteration(&locator, 0, 5);

        let point = locator.locate(&key(), true).unwrap();
        assert_eq!(point.iteration, 0);
        assert_eq!(point.n_kept_feats, None);
        assert_eq!(point.stale.len(), 1);
    }

    #[test]
    fn test_numeric_ordering() {
        let (locator, _dir) = temp_locator();
        let mut n = 200;
        for i in 0..=10 {
            let keep = n * 9 / 10;
            complete_iteration(&locator, i, n, keep);
            n = keep;
        }

        let dirs = locator.iteration_dirs(&key()).unwrap();
        let numbers: Vec<usize> = dirs.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, (0..=10).collect::<Vec<_>>());

        let point = locator.locate(&key(), true).unwrap();
        assert_eq!(point.iteration, 11);
        assert_eq!(point.n_kept_feats, Some(n));
    }

    #[test]
    fn test_gap_stops_the_prefix() {
        let (locator, _dir) = temp_locator();
        complete_iteration(&locator, 0, 5, 4);
        complete_iteration(&locator, 2, 3, 2);

        let point = locator.locate(&key(), true).unwrap();
        assert_eq!(point.iteration, 1);
        assert_eq!(point.n_kept_feats, Some(4));
        assert_eq!(point.stale.len(), 1);
    }

    #[test]
    fn test_manifest_and_file_name_must_agree() {
        let (locator, _dir) = temp_locator();
        complete_iteration(&locator, 0, 5, 4);

        let paths = locator.layout().iteration(&key(), 0, 5);
        let store = ManifestStore::new(&paths.dir);
        let mut manifest = store.load().unwrap().unwrap();
        manifest.next_n_kept_feats = Some(3);
        store.save(&manifest).unwrap();

        let err = locator.locate(&key(), true).unwrap_err();
        assert!(matches!(err, SiftError::InvalidResumeState { .. }));
    }

    #[test]
    fn test_tree_without_manifests() {
        let (locator, _dir) = temp_locator();
        let paths = locator.layout().iteration(&key(), 0, 5);
        fs::create_dir_all(&paths.dir).unwrap();
        for path in [
            paths.data(),
            paths.col_types(),
            paths.clustering(0.31),
            paths.arff(),
            paths.kept_feats(4),
        ] {
            fs::write(path, "x").unwrap();
        }

        let point = locator.locate(&key(), true).unwrap();
        assert_eq!(point.iteration, 1);
        assert_eq!(point.n_kept_feats, Some(4));
    }

    #[test]
    fn test_other_cluster_counts_are_ignored() {
        let (locator, _dir) = temp_locator();
        let paths = locator.layout().iteration(&key(), 0, 5);
        fs::create_dir_all(&paths.dir).unwrap();
        fs::write(paths.dir.join("kept_feats-4-3.txt"), "x").unwrap();

        let record = locator.inspect(&key(), 0).unwrap();
        assert!(!record.files.contains_key(&ArtifactKind::KeptFeats));
    }
}
