//! Request-scoped staging of uploaded bytes
//!
//! Uploads are written to a uniquely named temporary file inside the staging
//! directory. The name is random; only the sanitized extension of the
//! client filename is kept, so concurrent requests with the same filename
//! never collide and the client never chooses a path.

use crate::audio::extension_hint;
use crate::error::{Result, SoundprobeError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{trace, warn};

const STAGING_PREFIX: &str = "upload-";
const STAGING_RAND_BYTES: usize = 16;

/// A staged upload, removed on [`release`](StagedUpload::release) or drop
#[derive(Debug)]
pub struct StagedUpload {
    file: Option<NamedTempFile>,
    path: PathBuf,
}

impl StagedUpload {
    /// Write `bytes` to a fresh file in `dir`
    pub fn create(dir: &Path, filename: &str, bytes: &[u8]) -> Result<Self> {
        let suffix = extension_hint(filename)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();

        let mut file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(&suffix)
            .rand_bytes(STAGING_RAND_BYTES)
            .tempfile_in(dir)
            .map_err(SoundprobeError::Staging)?;

        // On failure the NamedTempFile is dropped here and removes itself
        file.write_all(bytes).map_err(SoundprobeError::Staging)?;
        file.flush().map_err(SoundprobeError::Staging)?;

        let path = file.path().to_path_buf();
        trace!("Staged {} bytes at {}", bytes.len(), path.display());

        Ok(Self {
            file: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.file.is_none()
    }

    /// Remove the staged file
    ///
    /// Idempotent. A removal failure is logged and otherwise ignored.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            match file.close() {
                Ok(()) => trace!("Released {}", self.path.display()),
                Err(e) => warn!("Failed to remove staged upload {}: {}", self.path.display(), e),
            }
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        self.release();
    }
}
