//! Local and remote storage owned transiently by one request.
//!
//! [`TempStore`] creates scoped temp files in a configured spool directory;
//! they are removed when their handle drops, so every exit path of a
//! processing run cleans up its local artifacts. [`blob`] covers the remote
//! side with the same guarantee.

pub mod blob;

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Scoped temp-file store rooted in a spool directory.
pub struct TempStore {
    spool_dir: PathBuf,
}

impl TempStore {
    /// Creates the store, making the spool directory if needed.
    ///
    /// # Errors
    /// - If the directory cannot be created
    pub fn new(spool_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(spool_dir)?;
        Ok(Self {
            spool_dir: spool_dir.to_path_buf(),
        })
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    /// Creates an empty scoped file. Removed from disk when the returned
    /// handle drops.
    ///
    /// Prefixes come from the audio fingerprint, so concurrent uploads of
    /// different content never collide.
    ///
    /// # Errors
    /// - If the file cannot be created
    pub fn create_scoped(&self, prefix: &str, suffix: &str) -> std::io::Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.spool_dir)
    }

    /// Creates a scoped file holding the given bytes.
    ///
    /// # Errors
    /// - If the file cannot be created or written
    pub fn write_scoped(
        &self,
        prefix: &str,
        suffix: &str,
        bytes: &[u8],
    ) -> std::io::Result<NamedTempFile> {
        let mut file = self.create_scoped(prefix, suffix)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file)
    }
}
