//! Artifact storage capability.
//!
//! The pipeline never builds output paths itself: it asks an
//! [`ArtifactStore`] for them. Every name the store hands out starts with the
//! job id, and page temp files add the page index plus a random suffix, so
//! concurrent jobs sharing one directory never collide.

use crate::job::JobId;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Read/write access to named blobs in a shared output area.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Directory for short-lived intermediate files.
    fn scratch_dir(&self) -> &Path;

    /// Final artifact path: `<job_id>_<stem><suffix>`.
    fn artifact_path(&self, job_id: JobId, stem: &str, suffix: &str) -> PathBuf;

    /// Fresh, collision-free scratch file `<job_id>_<tag>_<random><ext>`.
    /// Removed on drop.
    fn temp_file(&self, job_id: JobId, tag: &str, ext: &str) -> io::Result<NamedTempFile>;

    /// Scratch file for one page: `<job_id>_p<index>_<random><ext>`.
    fn page_temp(&self, job_id: JobId, index: usize, ext: &str) -> io::Result<NamedTempFile> {
        self.temp_file(job_id, &format!("p{}", index), ext)
    }

    /// Write `text` atomically (temp file + rename).
    async fn write_text(&self, path: &Path, text: &str) -> io::Result<()>;

    /// Copy a file verbatim. Returns bytes copied.
    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Move a file, replacing the destination.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Size of a stored file in bytes.
    async fn size(&self, path: &Path) -> io::Result<u64>;

    /// Best-effort removal. Failure is logged, never returned.
    async fn remove(&self, path: &Path);
}

/// [`ArtifactStore`] backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    output_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl LocalStore {
    /// Create the store, creating `output_dir` and its `tmp/` scratch area.
    pub fn new(output_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let output_dir = output_dir.into();
        let scratch_dir = output_dir.join("tmp");
        std::fs::create_dir_all(&scratch_dir)?;
        Ok(Self {
            output_dir,
            scratch_dir,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    fn artifact_path(&self, job_id: JobId, stem: &str, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}{}", job_id, sanitize_stem(stem), suffix))
    }

    fn temp_file(&self, job_id: JobId, tag: &str, ext: &str) -> io::Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(&format!("{}_{}_", job_id, tag))
            .suffix(ext)
            .tempfile_in(&self.scratch_dir)
    }

    async fn write_text(&self, path: &Path, text: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension("txt.tmp");
        tokio::fs::write(&tmp_path, text).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        debug!("Wrote {} bytes to {}", text.len(), path.display());
        Ok(())
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        tokio::fs::copy(from, to).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(tokio::fs::metadata(path).await?.len())
    }

    async fn remove(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}

/// File stem safe to embed in an artifact name.
pub fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}
