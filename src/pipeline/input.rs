//! Input inspection and resolution.
//!
//! Inspection ([`inspect_source`]) is synchronous and runs at submission: it
//! decides the [`SourceKind`] and rejects inputs the mode cannot handle
//! before a job exists. Resolution ([`resolve_input`]) runs inside the
//! worker and turns an http(s) source into a local file.
//!
//! ## Why download to a temp dir?
//!
//! pdfium and the external tools want a file-system path. Downloading into a
//! `TempDir` under the scratch area gives them one, and the directory is
//! removed when the [`ResolvedInput`] is dropped, even if the job fails.

use crate::error::JobError;
use crate::pipeline::mode::ProcessingMode;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "webp", "gif"];

/// What kind of document a source is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Multi-page document, processed page by page.
    Pdf,
    /// Standalone image, one adapter call.
    Image,
    /// Plain text, translated in one call.
    Text,
}

impl SourceKind {
    /// Kind implied by a file extension, if any.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Text),
            e if IMAGE_EXTENSIONS.contains(&e) => Some(Self::Image),
            _ => None,
        }
    }

    /// Kind implied by the first bytes of a file.
    pub fn sniff(head: &[u8]) -> Option<Self> {
        if head.starts_with(b"%PDF") {
            Some(Self::Pdf)
        } else if image::guess_format(head).is_ok() {
            Some(Self::Image)
        } else {
            None
        }
    }

    /// Why `mode` cannot process this kind, if it cannot.
    pub fn unsupported_reason(self, mode: ProcessingMode) -> Option<&'static str> {
        match (self, mode) {
            (Self::Text, ProcessingMode::Translate) => None,
            (Self::Text, _) => Some("plain-text sources can only be translated"),
            _ => None,
        }
    }
}

/// A validated submission input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSource {
    /// Local path or http(s) URL as submitted.
    pub input: String,
    pub kind: SourceKind,
}

impl JobSource {
    pub fn is_url(&self) -> bool {
        is_url(&self.input)
    }

    /// File stem used in artifact names.
    pub fn stem(&self) -> String {
        let name = if self.is_url() {
            reqwest::Url::parse(&self.input)
                .ok()
                .and_then(|u| {
                    u.path_segments()
                        .and_then(|mut s| s.next_back().map(str::to_string))
                })
                .unwrap_or_default()
        } else {
            self.input.clone()
        };
        Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".to_string())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Validate an input for `mode` without starting any work.
pub fn inspect_source(input: &str, mode: ProcessingMode) -> Result<JobSource, JobError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(JobError::Validation("no input file given".into()));
    }

    let kind = if is_url(input) {
        reqwest::Url::parse(input).map_err(|e| JobError::UnsupportedSource {
            path: PathBuf::from(input),
            mode: mode.to_string(),
            reason: format!("invalid URL: {}", e),
        })?;
        let path_part = input.split(['?', '#']).next().unwrap_or(input);
        SourceKind::from_extension(Path::new(path_part)).unwrap_or(SourceKind::Pdf)
    } else {
        inspect_local(Path::new(input), mode)?
    };

    if let Some(reason) = kind.unsupported_reason(mode) {
        return Err(JobError::UnsupportedSource {
            path: PathBuf::from(input),
            mode: mode.to_string(),
            reason: reason.to_string(),
        });
    }

    Ok(JobSource {
        input: input.to_string(),
        kind,
    })
}

fn inspect_local(path: &Path, mode: ProcessingMode) -> Result<SourceKind, JobError> {
    if !path.is_file() {
        return Err(JobError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut head = [0u8; 16];
    let read = std::fs::File::open(path)
        .and_then(|mut f| f.read(&mut head))
        .map_err(|_| JobError::FileNotFound {
            path: path.to_path_buf(),
        })?;
    let head = &head[..read];

    let unsupported = |reason: String| JobError::UnsupportedSource {
        path: path.to_path_buf(),
        mode: mode.to_string(),
        reason,
    };

    match SourceKind::from_extension(path) {
        Some(SourceKind::Pdf) if !head.starts_with(b"%PDF") => Err(unsupported(format!(
            "not a valid PDF (first bytes: {:?})",
            String::from_utf8_lossy(&head[..head.len().min(4)])
        ))),
        Some(kind) => Ok(kind),
        None => SourceKind::sniff(head)
            .ok_or_else(|| unsupported("unrecognised file type".to_string())),
    }
}

/// The resolved input: either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// The `TempDir` is kept alive until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Make the source available as a local file.
pub async fn resolve_input(
    source: &JobSource,
    scratch_dir: &Path,
    timeout_secs: u64,
) -> Result<ResolvedInput, JobError> {
    if source.is_url() {
        download_url(source, scratch_dir, timeout_secs).await
    } else {
        debug!("Resolved local input: {}", source.input);
        Ok(ResolvedInput::Local(PathBuf::from(&source.input)))
    }
}

async fn download_url(
    source: &JobSource,
    scratch_dir: &Path,
    timeout_secs: u64,
) -> Result<ResolvedInput, JobError> {
    let url = source.input.as_str();
    info!("Downloading {}", url);
    let failed = |reason: String| JobError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {}s", timeout_secs))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    match source.kind {
        SourceKind::Pdf if !bytes.starts_with(b"%PDF") => {
            return Err(failed("response is not a PDF".into()));
        }
        SourceKind::Image if image::guess_format(&bytes).is_err() => {
            return Err(failed("response is not an image".into()));
        }
        _ => {}
    }

    let temp_dir = tempfile::Builder::new()
        .prefix("download_")
        .tempdir_in(scratch_dir)
        .map_err(|e| JobError::Internal(format!("Failed to create temp dir: {}", e)))?;
    let ext = match source.kind {
        SourceKind::Pdf => "pdf",
        SourceKind::Text => "txt",
        SourceKind::Image => image::guess_format(&bytes)
            .ok()
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("png"),
    };
    let file_path = temp_dir.path().join(format!("{}.{}", source.stem(), ext));

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| JobError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to {}", bytes.len(), file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}
