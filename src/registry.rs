//! Job registry and runner.
//!
//! ```text
//!  submit ──► validate ──► JobEntry { rx, cancel } ──► DashMap
//!                 │
//!                 └─► tokio::spawn(run_job) ──► Pipeline::run(&mut reporter)
//!                                                   │
//!                      completed / cancelled / failed ◄┘  (reporter consumed)
//! ```
//!
//! The registry never writes job state. It holds the read side of each
//! job's watch channel plus its cancel flag; the worker task owns the only
//! writer. A panic inside the pipeline is caught at the task boundary and
//! becomes a terminal ERROR for that job alone.

use crate::config::{JobOptions, PipelineConfig};
use crate::error::JobError;
use crate::job::{CancelAck, CancelFlag, JobId, JobReporter, JobSnapshot};
use crate::pipeline::input::inspect_source;
use crate::pipeline::mode::ProcessingMode;
use crate::pipeline::{JobRequest, Pipeline, RunOutcome};
use crate::stream::{snapshot_stream, SnapshotStream};
use dashmap::DashMap;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn, Instrument};

struct JobEntry {
    rx: watch::Receiver<JobSnapshot>,
    cancel: CancelFlag,
}

impl JobEntry {
    fn snapshot(&self) -> JobSnapshot {
        self.rx
            .borrow()
            .clone()
            .with_cancel_request(self.cancel.is_cancelled())
    }
}

/// In-memory table of jobs plus the pipeline that runs them.
///
/// Cheap to clone; clones share the same jobs. Jobs are not persisted and
/// disappear with the process.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<DashMap<JobId, JobEntry>>,
    pipeline: Arc<Pipeline>,
}

impl JobRegistry {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Registry over a pipeline with the default backends.
    pub fn from_config(config: PipelineConfig) -> Result<Self, JobError> {
        Ok(Self::new(Pipeline::from_config(config)?))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Validate a submission and start its worker.
    ///
    /// Returns as soon as the job is registered. Must be called from within
    /// a tokio runtime.
    pub fn submit(
        &self,
        input: &str,
        mode: ProcessingMode,
        options: JobOptions,
    ) -> Result<JobId, JobError> {
        options.validate(mode)?;
        let source = inspect_source(input, mode)?;

        let job_id = JobId::new();
        let cancel = CancelFlag::new();
        let (reporter, rx) = JobReporter::new(job_id, mode, source.input.clone(), cancel.clone());
        self.jobs.insert(job_id, JobEntry { rx, cancel });

        info!("Submitted {} job {} for {}", mode, job_id, source.input);
        let request = JobRequest {
            source,
            mode,
            options,
        };
        let span = info_span!("job", job_id = %job_id, mode = %mode);
        tokio::spawn(run_job(Arc::clone(&self.pipeline), request, reporter).instrument(span));

        Ok(job_id)
    }

    /// [`submit`](Self::submit) with the mode given by name ("OCR",
    /// "OCR + AI", "AI", "TRANSLATE").
    pub fn submit_named(
        &self,
        input: &str,
        mode: &str,
        options: JobOptions,
    ) -> Result<JobId, JobError> {
        let mode: ProcessingMode = mode.parse()?;
        self.submit(input, mode, options)
    }

    /// Current state of a job.
    pub fn poll(&self, job_id: JobId) -> Result<JobSnapshot, JobError> {
        self.entry(job_id, JobEntry::snapshot)
    }

    /// Request cooperative cancellation. Idempotent.
    ///
    /// The worker sees the flag at its next stage or page boundary; an
    /// in-flight external call is allowed to finish.
    pub fn cancel(&self, job_id: JobId) -> Result<CancelAck, JobError> {
        self.entry(job_id, |entry| {
            if entry.rx.borrow().is_terminal() {
                return CancelAck {
                    job_id,
                    already_requested: entry.cancel.is_cancelled(),
                    already_terminal: true,
                };
            }
            let already_requested = entry.cancel.cancel();
            if !already_requested {
                info!("Cancellation requested for job {}", job_id);
            }
            CancelAck {
                job_id,
                already_requested,
                already_terminal: false,
            }
        })
    }

    /// Stream of snapshots for a job, ending after its terminal state.
    pub fn watch(&self, job_id: JobId) -> Result<SnapshotStream, JobError> {
        self.entry(job_id, |entry| {
            snapshot_stream(entry.rx.clone(), entry.cancel.clone())
        })
    }

    /// Snapshots of every known job, in no particular order.
    pub fn list(&self) -> Vec<JobSnapshot> {
        self.jobs.iter().map(|e| e.value().snapshot()).collect()
    }

    fn entry<T>(&self, job_id: JobId, f: impl FnOnce(&JobEntry) -> T) -> Result<T, JobError> {
        self.jobs
            .get(&job_id)
            .map(|e| f(e.value()))
            .ok_or_else(|| JobError::NotFound {
                job_id: job_id.to_string(),
            })
    }
}

/// Worker body: run the pipeline, then write exactly one terminal state.
async fn run_job(pipeline: Arc<Pipeline>, request: JobRequest, mut reporter: JobReporter) {
    let outcome = AssertUnwindSafe(pipeline.run(&request, &mut reporter))
        .catch_unwind()
        .await;

    let snapshot = match outcome {
        Ok(Ok(RunOutcome::Completed(output))) => reporter.completed(output),
        Ok(Ok(RunOutcome::Cancelled)) => reporter.cancelled(),
        Ok(Err(e)) => {
            error!("Job failed: {}", e);
            reporter.failed(e.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Job panicked: {}", message);
            reporter.failed(format!("internal error: {}", message))
        }
    };

    match snapshot.result {
        Some(ref r) if snapshot.notes.is_empty() => info!("Job finished: {}", r.kind()),
        Some(ref r) => warn!(
            "Job finished with {} note(s): {}",
            snapshot.notes.len(),
            r.kind()
        ),
        None => {}
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let p: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(p.as_ref()), "boom");
        let p: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(p.as_ref()), "bang");
        let p: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(p.as_ref()), "worker panicked");
    }
}
