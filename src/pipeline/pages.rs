//! Page iterator: drive one adapter chain per page of a PDF.
//!
//! ```text
//!  page_count ──► total_pages published
//!  for i in 1..=N:
//!      cancelled? ──► stop (current_page stays at i-1)
//!      render page i ──► <job>_p<i>_<rand>.png
//!      adapter chain(png) ──► text | inline error marker
//!      remove png, current_page = i, progress = span.at(i, N)
//!      sleep(page_delay) unless i == N
//! ```
//!
//! A page whose rendering or adapter chain fails does not stop the
//! document: its text is replaced by `[Page N: ❌ <error>]` and the
//! iterator moves on.

use crate::config::PageMarker;
use crate::error::{JobError, PageError};
use crate::job::{JobId, JobReporter, Severity};
use crate::pipeline::mode::StageSpan;
use crate::pipeline::render::PdfBackend;
use crate::storage::ArtifactStore;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What iterating a document produced.
#[derive(Debug)]
pub enum PageRun {
    Completed {
        text: String,
        failed: Vec<PageError>,
    },
    /// Cancellation was observed before `next_page`.
    Cancelled { next_page: usize },
}

/// Everything the iterator needs besides the per-page work.
pub struct PageIterator<'a> {
    pub job_id: JobId,
    pub backend: &'a dyn PdfBackend,
    pub store: &'a dyn ArtifactStore,
    pub marker: &'a PageMarker,
    pub page_delay: Duration,
}

/// Inline replacement for a page that failed.
pub fn error_marker(error: &PageError) -> String {
    let detail = match error {
        PageError::RenderFailed { detail, .. } => detail.clone(),
        PageError::AdapterFailed { source, .. } => source.to_string(),
    };
    format!("[Page {}: ❌ {}]", error.page(), detail)
}

impl PageIterator<'_> {
    /// Run `per_page(page_number, png_path)` for every page of `pdf`.
    ///
    /// `label` prefixes the per-page status, e.g. "🔍 Extracting text".
    pub async fn run<F, Fut>(
        &self,
        pdf: &Path,
        reporter: &mut JobReporter,
        span: StageSpan,
        label: &str,
        mut per_page: F,
    ) -> Result<PageRun, JobError>
    where
        F: FnMut(usize, PathBuf) -> Fut,
        Fut: Future<Output = Result<String, PageError>>,
    {
        let total = self
            .backend
            .page_count(pdf)
            .await
            .map_err(|e| JobError::Pipeline {
                stage: "page count".into(),
                detail: e.to_string(),
            })?;
        reporter.total_pages(total);
        info!("Processing {} pages", total);

        let mut text = String::new();
        let mut failed = Vec::new();

        for page in 1..=total {
            if reporter.is_cancelled() {
                info!("Cancellation observed before page {}", page);
                return Ok(PageRun::Cancelled { next_page: page });
            }
            reporter.status(
                format!("{} (page {}/{})", label, page, total),
                Severity::Info,
            );

            let result = self.process_page(pdf, page, &mut per_page).await;
            let page_text = match result {
                Ok(t) => t,
                Err(e) => {
                    warn!("{}", e);
                    let marker = error_marker(&e);
                    reporter.note(Severity::Warning, format!("⚠️ {}", e));
                    failed.push(e);
                    marker
                }
            };
            text.push_str(&self.marker.render(page, &page_text));

            reporter.page_done(
                page,
                span.at(page, total),
                format!("{} ({}/{} pages done)", label, page, total),
            );

            if page < total && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        Ok(PageRun::Completed { text, failed })
    }

    async fn process_page<F, Fut>(
        &self,
        pdf: &Path,
        page: usize,
        per_page: &mut F,
    ) -> Result<String, PageError>
    where
        F: FnMut(usize, PathBuf) -> Fut,
        Fut: Future<Output = Result<String, PageError>>,
    {
        let render_failed = |detail: String| PageError::RenderFailed { page, detail };

        let png = self
            .store
            .page_temp(self.job_id, page, ".png")
            .map_err(|e| render_failed(e.to_string()))?;
        let path = png.path().to_path_buf();

        let result = match self.backend.render_page(pdf, page - 1, &path).await {
            Ok(()) => per_page(page, path).await,
            Err(e) => Err(render_failed(e.to_string())),
        };

        if let Err(e) = png.close() {
            debug!("Could not remove page image for page {}: {}", page, e);
        }
        result
    }
}
