use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::encode::EncodedAudioFile;

/// Hands an encoded recording to the user
pub trait Download: Send + Sync {
    /// Returns where the file ended up
    fn deliver(&self, file: &EncodedAudioFile) -> Result<PathBuf>;
}

/// Writes recordings into a directory under their suggested filename
pub struct DirectoryDownload {
    dir: PathBuf,
}

impl DirectoryDownload {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Download for DirectoryDownload {
    fn deliver(&self, file: &EncodedAudioFile) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output directory: {:?}", self.dir))?;

        let path = self.dir.join(&file.filename);
        fs::write(&path, &file.bytes)
            .with_context(|| format!("Failed to write recording: {:?}", path))?;

        info!(
            "Saved {} ({}, {} bytes, {:.1}s)",
            path.display(),
            file.mime_type(),
            file.bytes.len(),
            file.duration_secs()
        );
        Ok(path)
    }
}
