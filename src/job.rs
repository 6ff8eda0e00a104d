//! Per-job state: identifiers, snapshots, results and the single writer.
//!
//! A job's state lives in a `tokio::sync::watch` channel. The registry keeps
//! the receiving end (any number of readers); the one `watch::Sender` is
//! owned by the [`JobReporter`] handed to the job's worker. `JobReporter` is
//! not `Clone`, so exactly one writer exists per job and it is the worker.
//!
//! The only other mutation is the [`CancelFlag`], a one-way atomic bit the
//! registry sets on request and the worker polls at stage and page
//! boundaries.
//!
//! ```text
//!  submit ──► JobReporter (worker task) ──send_modify──► watch ──► poll / watch
//!  cancel ──► CancelFlag ◄──────────────── polled by worker
//! ```

use crate::pipeline::mode::ProcessingMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

pub const STATUS_UPLOADED: &str = "📤 File uploaded";
pub const STATUS_CANCEL_REQUESTED: &str = "⏹️ Cancellation requested";
pub const STATUS_CANCELLED: &str = "⏹️ Cancelled";
pub const STATUS_COMPLETED: &str = "✅ Processing completed";

/// Unique job identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Severity implied by the current status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Lifecycle phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Uploaded,
    Extracting,
    Correcting,
    Translating,
    Embedding,
    Compressing,
    Completed,
    Cancelled,
    Error,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }
}

/// Artifacts and text produced by a successful run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Accumulated text (with page markers for multi-page sources).
    pub text: String,
    pub text_path: Option<PathBuf>,
    /// Searchable (possibly compressed) PDF, for OCR modes on PDF sources.
    pub pdf_path: Option<PathBuf>,
    /// Uncompressed PDF retained because of `keep_original`.
    pub original_pdf_path: Option<PathBuf>,
}

/// Terminal result of a job. Written exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    Output(PipelineOutput),
    Cancelled,
    Failed { message: String },
}

impl JobResult {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Output(_) => "output",
            Self::Cancelled => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }
}

/// A non-fatal event recorded during a run (degraded embedding, no
/// compression gain, failed pages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobNote {
    pub severity: Severity,
    pub message: String,
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub mode: ProcessingMode,
    /// Source file name or URL as submitted.
    pub source: String,
    /// 0–100.
    pub progress: u8,
    pub status: String,
    pub severity: Severity,
    pub phase: JobPhase,
    pub current_page: usize,
    pub total_pages: usize,
    pub cancelled: bool,
    pub notes: Vec<JobNote>,
    pub result: Option<JobResult>,
}

impl JobSnapshot {
    pub(crate) fn uploaded(job_id: JobId, mode: ProcessingMode, source: String) -> Self {
        Self {
            job_id,
            mode,
            source,
            progress: 0,
            status: STATUS_UPLOADED.to_string(),
            severity: Severity::Info,
            phase: JobPhase::Uploaded,
            current_page: 0,
            total_pages: 0,
            cancelled: false,
            notes: Vec::new(),
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Apply a pending cancel request the worker has not observed yet.
    pub(crate) fn with_cancel_request(mut self, requested: bool) -> Self {
        if requested && !self.is_terminal() {
            self.cancelled = true;
            self.status = STATUS_CANCEL_REQUESTED.to_string();
            self.severity = Severity::Warning;
        }
        self
    }
}

/// Acknowledgement returned by [`crate::JobRegistry::cancel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelAck {
    pub job_id: JobId,
    /// The flag was already set before this request.
    pub already_requested: bool,
    /// The job had already finished; nothing changed.
    pub already_terminal: bool,
}

/// One-way cancellation bit shared between the registry and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns whether it was already set.
    pub fn cancel(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The single writer of a job's state.
///
/// Progress only moves forward through this type; the one exception is
/// [`JobReporter::cancelled`], which resets it to 0. The terminal methods
/// consume the reporter, dropping the sender, so nothing can be written
/// after a terminal state.
pub struct JobReporter {
    job_id: JobId,
    tx: watch::Sender<JobSnapshot>,
    cancel: CancelFlag,
}

impl JobReporter {
    /// Create the writer and the first reader for a new job.
    pub fn new(
        job_id: JobId,
        mode: ProcessingMode,
        source: impl Into<String>,
        cancel: CancelFlag,
    ) -> (Self, watch::Receiver<JobSnapshot>) {
        let (tx, rx) = watch::channel(JobSnapshot::uploaded(job_id, mode, source.into()));
        (Self { job_id, tx, cancel }, rx)
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.tx.borrow().clone()
    }

    /// Enter a new phase with its status text.
    pub fn phase(&mut self, phase: JobPhase, status: impl Into<String>) {
        let status = status.into();
        debug!(job_id = %self.job_id, ?phase, "{}", status);
        self.tx.send_modify(|s| {
            s.phase = phase;
            s.status = status;
            s.severity = Severity::Info;
        });
    }

    /// Replace the status text, keeping the phase.
    pub fn status(&mut self, status: impl Into<String>, severity: Severity) {
        let status = status.into();
        self.tx.send_modify(|s| {
            s.status = status;
            s.severity = severity;
        });
    }

    /// Record a non-fatal event and show it as the current status.
    pub fn note(&mut self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|s| {
            s.status = message.clone();
            s.severity = severity;
            s.notes.push(JobNote { severity, message });
        });
    }

    /// Raise progress to `progress` (clamped to 100). Never lowers it.
    pub fn progress(&mut self, progress: u8) {
        let progress = progress.min(100);
        self.tx.send_if_modified(|s| {
            if progress > s.progress {
                s.progress = progress;
                true
            } else {
                false
            }
        });
    }

    /// Publish the page count. Fixed once set to a non-zero value.
    pub fn total_pages(&mut self, total: usize) {
        self.tx.send_if_modified(|s| {
            if s.total_pages == 0 && total > 0 {
                s.total_pages = total;
                true
            } else {
                false
            }
        });
    }

    /// Page `page` finished; advance the counter and progress together.
    pub fn page_done(&mut self, page: usize, progress: u8, status: impl Into<String>) {
        let status = status.into();
        let progress = progress.min(100);
        self.tx.send_modify(|s| {
            s.current_page = page;
            s.progress = s.progress.max(progress);
            s.status = status;
        });
    }

    /// Terminal success.
    pub fn completed(self, output: PipelineOutput) -> JobSnapshot {
        self.tx.send_modify(|s| {
            s.progress = 100;
            s.phase = JobPhase::Completed;
            s.status = STATUS_COMPLETED.to_string();
            s.severity = if s.notes.iter().any(|n| n.severity >= Severity::Warning) {
                Severity::Warning
            } else {
                Severity::Success
            };
            s.result = Some(JobResult::Output(output));
        });
        self.snapshot()
    }

    /// Terminal cancellation. Resets progress to 0.
    pub fn cancelled(self) -> JobSnapshot {
        self.tx.send_modify(|s| {
            s.progress = 0;
            s.phase = JobPhase::Cancelled;
            s.status = STATUS_CANCELLED.to_string();
            s.severity = Severity::Warning;
            s.cancelled = true;
            s.result = Some(JobResult::Cancelled);
        });
        self.snapshot()
    }

    /// Terminal failure.
    pub fn failed(self, message: impl Into<String>) -> JobSnapshot {
        let message = message.into();
        self.tx.send_modify(|s| {
            s.phase = JobPhase::Error;
            s.status = format!("❌ Error: {}", message);
            s.severity = Severity::Error;
            s.result = Some(JobResult::Failed { message });
        });
        self.snapshot()
    }
}

impl fmt::Debug for JobReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobReporter")
            .field("job_id", &self.job_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter() -> (JobReporter, watch::Receiver<JobSnapshot>, CancelFlag) {
        let flag = CancelFlag::new();
        let (r, rx) = JobReporter::new(JobId::new(), ProcessingMode::Ocr, "scan.pdf", flag.clone());
        (r, rx, flag)
    }

    #[test]
    fn initial_snapshot_is_uploaded() {
        let (_r, rx, _) = reporter();
        let s = rx.borrow().clone();
        assert_eq!(s.progress, 0);
        assert_eq!(s.status, STATUS_UPLOADED);
        assert_eq!(s.phase, JobPhase::Uploaded);
        assert!(!s.cancelled);
        assert!(s.result.is_none());
    }

    #[test]
    fn progress_never_decreases() {
        let (mut r, rx, _) = reporter();
        r.progress(40);
        r.progress(10);
        assert_eq!(rx.borrow().progress, 40);
        r.page_done(1, 20, "page 1");
        assert_eq!(rx.borrow().progress, 40);
        assert_eq!(rx.borrow().current_page, 1);
        r.progress(250);
        assert_eq!(rx.borrow().progress, 100);
    }

    #[test]
    fn total_pages_fixed_once_set() {
        let (mut r, rx, _) = reporter();
        r.total_pages(3);
        r.total_pages(7);
        assert_eq!(rx.borrow().total_pages, 3);
    }

    #[test]
    fn cancel_resets_progress() {
        let (mut r, rx, flag) = reporter();
        r.progress(60);
        assert!(!flag.cancel());
        assert!(flag.cancel());
        assert!(r.is_cancelled());
        let s = r.cancelled();
        assert_eq!(s.progress, 0);
        assert_eq!(s.result, Some(JobResult::Cancelled));
        assert_eq!(rx.borrow().status, STATUS_CANCELLED);
    }

    #[test]
    fn warnings_downgrade_completion_severity() {
        let (mut r, _rx, _) = reporter();
        r.note(Severity::Info, "ℹ️ Compression gave no size reduction");
        let (mut r2, _rx2, _) = reporter();
        r2.note(Severity::Warning, "⚠️ degraded");
        assert_eq!(r.completed(PipelineOutput::default()).severity, Severity::Success);
        assert_eq!(r2.completed(PipelineOutput::default()).severity, Severity::Warning);
    }

    #[test]
    fn pending_cancel_overlay_only_before_terminal() {
        let (r, rx, _) = reporter();
        let s = rx.borrow().clone().with_cancel_request(true);
        assert_eq!(s.status, STATUS_CANCEL_REQUESTED);
        let done = r.failed("boom").with_cancel_request(true);
        assert!(done.status.contains("boom"));
        assert_eq!(done.severity, Severity::Error);
    }

    #[test]
    fn job_id_parses_back() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }
}
