//! Error types for the edgequake-scan2text library.
//!
//! Four error types reflect four distinct failure scopes:
//!
//! * [`JobError`] — **Fatal or synchronous**: the submission is rejected
//!   (unknown mode, missing input, bad options) or a single job cannot
//!   continue (unhandled pipeline failure). Validation variants are returned
//!   from [`crate::JobRegistry::submit`] before a job exists; the others end up
//!   rendered into that job's own snapshot and never reach other jobs.
//!
//! * [`AdapterError`] — an external call (OCR engine, generative-text
//!   service) still failed after every retry attempt. Callers decide whether
//!   it is fatal; the page iterator never treats it as such.
//!
//! * [`PageError`] — **Non-fatal**: one page of a multi-page document failed
//!   and was replaced by an inline marker in the output text.
//!
//! * [`ToolError`] — an external process (tesseract, ocrmypdf, hocr2pdf,
//!   ghostscript) or the pdfium backend failed.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal and validation errors returned by the edgequake-scan2text library.
#[derive(Debug, Error)]
pub enum JobError {
    // ── Submission errors ─────────────────────────────────────────────────
    /// Processing mode string did not name a known mode.
    #[error("Unrecognized processing mode '{mode}'\nExpected one of: OCR, OCR + AI, AI, TRANSLATE.")]
    UnknownMode { mode: String },

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The input kind cannot be processed in the requested mode.
    #[error("Unsupported source '{path}' for mode {mode}: {reason}")]
    UnsupportedSource {
        path: PathBuf,
        mode: String,
        reason: String,
    },

    /// Job options failed validation.
    #[error("Invalid job options: {0}")]
    Validation(String),

    /// No job with that id is known to the registry.
    #[error("Job not found: {job_id}")]
    NotFound { job_id: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured LLM provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Worker errors ─────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    /// URL input could not be downloaded.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Could not write an artifact.
    #[error("Failed to write artifact '{path}': {source}")]
    ArtifactWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stage failed in a way the pipeline cannot absorb.
    #[error("Pipeline failed during {stage}: {detail}")]
    Pipeline { stage: String, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Whether this error rejects a submission before any job exists.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownMode { .. }
                | Self::FileNotFound { .. }
                | Self::UnsupportedSource { .. }
                | Self::Validation(_)
        )
    }
}

/// An external call that failed on every attempt.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("{operation} failed after {attempts} attempts: {detail}")]
pub struct AdapterError {
    /// Short name of the wrapped call, e.g. `"ai_extract"`.
    pub operation: String,
    pub attempts: u32,
    /// Message of the last failure.
    pub detail: String,
}

/// A non-fatal error for a single page.
///
/// Rendered inline into the accumulated text; the job carries on with the
/// next page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// An adapter call failed after retries.
    #[error("Page {page}: {source}")]
    AdapterFailed {
        page: usize,
        #[source]
        source: AdapterError,
    },
}

impl PageError {
    pub fn page(&self) -> usize {
        match self {
            Self::RenderFailed { page, .. } | Self::AdapterFailed { page, .. } => *page,
        }
    }
}

/// Failure of an external process or of the pdfium backend.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The executable could not be found.
    #[error("{tool} not found at '{path}'")]
    NotFound { tool: String, path: PathBuf },

    /// The process ran but exited unsuccessfully.
    #[error("{tool} failed ({status}): {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The process succeeded but produced nothing usable.
    #[error("{tool} produced no usable output: {detail}")]
    EmptyOutput { tool: String, detail: String },

    /// pdfium returned an error.
    #[error("pdfium: {0}")]
    Pdfium(String),

    /// The generative-text service returned an error.
    #[error("LLM API error: {0}")]
    Llm(String),

    /// I/O error around the tool invocation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Creates a failure from a finished process's status and stderr.
    pub fn failed(tool: impl Into<String>, status: std::process::ExitStatus, stderr: &[u8]) -> Self {
        Self::Failed {
            tool: tool.into(),
            status: status.to_string(),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_mode_display_lists_modes() {
        let e = JobError::UnknownMode {
            mode: "FAX".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("FAX"), "got: {msg}");
        assert!(msg.contains("TRANSLATE"));
        assert!(e.is_validation());
    }

    #[test]
    fn not_found_is_not_validation() {
        let e = JobError::NotFound {
            job_id: "abc".into(),
        };
        assert!(!e.is_validation());
        assert!(e.to_string().contains("abc"));
    }

    #[test]
    fn adapter_error_display() {
        let e = AdapterError {
            operation: "ai_translate".into(),
            attempts: 3,
            detail: "503 Service Unavailable".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("ai_translate"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn page_error_reports_page() {
        let e = PageError::AdapterFailed {
            page: 2,
            source: AdapterError {
                operation: "local_extract".into(),
                attempts: 3,
                detail: "boom".into(),
            },
        };
        assert_eq!(e.page(), 2);
        assert!(e.to_string().starts_with("Page 2:"));
    }

    #[test]
    fn tool_not_found_display() {
        let e = ToolError::NotFound {
            tool: "tesseract".into(),
            path: PathBuf::from("/usr/bin/tesseract"),
        };
        assert!(e.to_string().contains("tesseract not found"));
    }
}
