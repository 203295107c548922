//! Advisory lock serialising runs against one configuration directory.

use crate::artifacts::LOCK_FILE;
use crate::error::{Result, SiftError};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct ConfigLock {
    file: File,
    path: PathBuf,
}

impl ConfigLock {
    /// Take the lock of `config_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::PipelineBusy`] if another process holds the lock.
    pub fn acquire(config_dir: &Path) -> Result<Self> {
        fs::create_dir_all(config_dir)?;
        let path = config_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        FileExt::try_lock_exclusive(&file).map_err(|_| SiftError::PipelineBusy {
            root: config_dir.to_path_buf(),
        })?;

        debug!("Acquired {}", path.display());
        Ok(Self { file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ConfigLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
