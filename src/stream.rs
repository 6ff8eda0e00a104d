//! Streaming job observation: a snapshot per state change.
//!
//! ## Why stream?
//!
//! Long documents take minutes. Polling works for a web handler, but a
//! terminal progress bar or a WebSocket wants every change as it happens.
//! [`SnapshotStream`] yields the current snapshot immediately, then one per
//! change, and ends after the terminal snapshot (when the worker drops its
//! reporter).
//!
//! Intermediate states may be coalesced if the consumer is slower than the
//! worker; the terminal snapshot is never skipped.

use crate::job::{CancelFlag, JobSnapshot};
use futures::StreamExt;
use std::pin::Pin;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::Stream;

/// A boxed stream of job snapshots.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = JobSnapshot> + Send>>;

pub(crate) fn snapshot_stream(rx: watch::Receiver<JobSnapshot>, cancel: CancelFlag) -> SnapshotStream {
    Box::pin(
        WatchStream::new(rx).map(move |snapshot| snapshot.with_cancel_request(cancel.is_cancelled())),
    )
}

/// Drain a stream and return its last snapshot.
pub async fn last_snapshot(mut stream: SnapshotStream) -> Option<JobSnapshot> {
    let mut last = None;
    while let Some(snapshot) = stream.next().await {
        last = Some(snapshot);
    }
    last
}
