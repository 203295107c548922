//! Atomic manifest storage.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::warn;

use super::IterationManifest;
use crate::artifacts::MANIFEST_FILE;
use crate::error::{Result, SiftError};

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file guarding manifest writes.
const LOCK_FILE: &str = ".manifest.lock";

/// Reads and writes the manifest of one iteration directory.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    #[must_use]
    pub fn tmp_path(&self) -> PathBuf {
        self.dir.join(format!("{MANIFEST_FILE}{TMP_SUFFIX}"))
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Write the manifest via temp file and rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken or the file cannot be
    /// written.
    pub fn save(&self, manifest: &IterationManifest) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let lock_file = File::create(self.lock_path())?;
        FileExt::lock_exclusive(&lock_file).map_err(|e| {
            SiftError::unexpected(format!("Failed to acquire manifest lock: {e}"))
        })?;

        let tmp_path = self.tmp_path();
        let json = serde_json::to_string_pretty(manifest)?;

        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, self.manifest_path())?;

        FileExt::unlock(&lock_file).map_err(|e| {
            SiftError::unexpected(format!("Failed to release manifest lock: {e}"))
        })?;
        Ok(())
    }

    /// Load the manifest. Absent, unreadable-as-JSON or version-incompatible
    /// manifests all yield `None`; the iteration is then judged by its
    /// artifacts alone.
    ///
    /// # Errors
    ///
    /// Returns an error only for IO failures other than a missing file.
    pub fn load(&self) -> Result<Option<IterationManifest>> {
        let path = self.manifest_path();

        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let manifest: IterationManifest = match serde_json::from_str(&contents) {
            Ok(m) => m,
            Err(e) => {
                warn!("Corrupted manifest at {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        if !manifest.is_version_compatible() {
            warn!(
                "Incompatible manifest version {} at {} (supported: {})",
                manifest.version,
                path.display(),
                super::MANIFEST_VERSION
            );
            return Ok(None);
        }

        Ok(Some(manifest))
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.manifest_path().exists()
    }
}
