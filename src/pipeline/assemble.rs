//! Artifact assembler: searchable PDF and optional compression.
//!
//! Two embedding paths:
//!
//! * **Plain**: hand the original PDF to the [`PdfEmbedder`] (ocrmypdf).
//! * **AI-corrected**: per page, rasterise → hOCR → AI word correction →
//!   corrected hOCR → [`TextLayerEngine`] page PDF; then merge the pages.
//!   The corrected text is written to a sidecar file first and removed once
//!   the merged PDF exists, the path falls back, or the job is cancelled.
//!
//! If either path fails, the original PDF is copied to the output path
//! unmodified and the job carries on with a warning.
//!
//! Compression runs on the finished artifact and only replaces it when the
//! result is strictly smaller.

use crate::config::CompressionSettings;
use crate::error::{JobError, ToolError};
use crate::job::{JobId, JobReporter, Severity};
use crate::pipeline::adapters::Adapters;
use crate::pipeline::mode::StageSpan;
use crate::pipeline::postprocess::{hocr_words, replace_hocr_words};
use crate::pipeline::render::PdfBackend;
use crate::storage::ArtifactStore;
use crate::tools::{PdfCompressor, PdfEmbedder, TextLayerEngine};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

pub const STATUS_EMBED_FALLBACK: &str = "⚠️ Failed to embed OCR; original PDF copied.";
pub const STATUS_NO_REDUCTION: &str = "ℹ️ Compression gave no size reduction";
pub const STATUS_COMPRESS_FAILED: &str = "⚠️ Compression failed; uncompressed PDF kept.";

/// Result of an embedding attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embedded {
    /// Output carries a text layer.
    TextLayer,
    /// Embedding failed; output is a verbatim copy of the input.
    Copied,
    /// Cancellation observed between pages; output may not exist.
    Cancelled,
}

/// Result of compression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compressed {
    /// Artifact replaced by a smaller file. `original` is set when the
    /// uncompressed file was kept.
    Smaller {
        before: u64,
        after: u64,
        original: Option<PathBuf>,
    },
    NoGain,
    Failed,
}

pub struct Assembler<'a> {
    pub job_id: JobId,
    pub backend: &'a dyn PdfBackend,
    pub embedder: &'a dyn PdfEmbedder,
    pub text_layer: &'a dyn TextLayerEngine,
    pub compressor: &'a dyn PdfCompressor,
    pub store: &'a dyn ArtifactStore,
    pub adapters: &'a Adapters,
}

impl Assembler<'_> {
    /// Plain path: ocrmypdf, falling back to a copy.
    pub async fn embed_plain(
        &self,
        input: &Path,
        output: &Path,
        reporter: &mut JobReporter,
    ) -> Result<Embedded, JobError> {
        match self.embedder.embed(input, output).await {
            Ok(()) => Ok(Embedded::TextLayer),
            Err(e) => {
                warn!("Embedding failed: {}", e);
                self.fall_back(input, output, reporter).await
            }
        }
    }

    /// AI-corrected path, falling back to a copy.
    pub async fn embed_corrected(
        &self,
        input: &Path,
        output: &Path,
        sidecar: &Path,
        corrected_text: &str,
        reporter: &mut JobReporter,
        span: StageSpan,
    ) -> Result<Embedded, JobError> {
        self.store
            .write_text(sidecar, corrected_text)
            .await
            .map_err(|source| JobError::ArtifactWriteFailed {
                path: sidecar.to_path_buf(),
                source,
            })?;

        match self.build_corrected(input, output, reporter, span).await {
            Ok(true) => {
                self.store.remove(sidecar).await;
                Ok(Embedded::TextLayer)
            }
            Ok(false) => {
                self.store.remove(sidecar).await;
                Ok(Embedded::Cancelled)
            }
            Err(e) => {
                warn!("AI-corrected embedding failed: {}", e);
                self.store.remove(sidecar).await;
                self.fall_back(input, output, reporter).await
            }
        }
    }

    /// Returns `Ok(false)` if cancelled between pages.
    async fn build_corrected(
        &self,
        input: &Path,
        output: &Path,
        reporter: &mut JobReporter,
        span: StageSpan,
    ) -> Result<bool, ToolError> {
        let total = self.backend.page_count(input).await?;
        let mut page_pdfs: Vec<NamedTempFile> = Vec::with_capacity(total);

        for page in 1..=total {
            if reporter.is_cancelled() {
                return Ok(false);
            }
            reporter.status(
                format!("📄 Embedding corrected text (page {}/{})", page, total),
                Severity::Info,
            );

            let png = self.store.page_temp(self.job_id, page, ".png")?;
            self.backend.render_page(input, page - 1, png.path()).await?;

            let hocr = self
                .adapters
                .local_hocr(png.path())
                .await
                .map_err(|e| ToolError::EmptyOutput {
                    tool: "ocr engine".into(),
                    detail: e.to_string(),
                })?;
            let words = hocr_words(&hocr);
            let corrected = self.adapters.ai_correct_words(&words).await;
            let hocr = replace_hocr_words(&hocr, &corrected);

            let page_pdf = self.store.page_temp(self.job_id, page, ".pdf")?;
            self.text_layer
                .render_page(png.path(), &hocr, page_pdf.path())
                .await?;
            page_pdfs.push(page_pdf);

            if let Err(e) = png.close() {
                warn!("Could not remove page image: {}", e);
            }
            reporter.progress(span.at(page, total));
        }

        let paths: Vec<PathBuf> = page_pdfs.iter().map(|f| f.path().to_path_buf()).collect();
        self.backend.merge(&paths, output).await?;
        info!("Merged {} corrected pages into {}", total, output.display());
        Ok(true)
    }

    async fn fall_back(
        &self,
        input: &Path,
        output: &Path,
        reporter: &mut JobReporter,
    ) -> Result<Embedded, JobError> {
        self.store
            .copy(input, output)
            .await
            .map_err(|source| JobError::ArtifactWriteFailed {
                path: output.to_path_buf(),
                source,
            })?;
        reporter.note(Severity::Warning, STATUS_EMBED_FALLBACK);
        Ok(Embedded::Copied)
    }

    /// Compress `pdf` in place if that makes it smaller.
    ///
    /// With `keep_original`, the uncompressed file is copied to `original`
    /// before being replaced. Any failure leaves `pdf` as it was and is
    /// reported as a warning.
    pub async fn compress(
        &self,
        pdf: &Path,
        original: &Path,
        settings: &CompressionSettings,
        reporter: &mut JobReporter,
    ) -> Result<Compressed, JobError> {
        let tmp = self
            .store
            .temp_file(self.job_id, "compressed", ".pdf")
            .map_err(|e| JobError::Internal(format!("Failed to create temp file: {}", e)))?;

        if let Err(e) = self.compressor.compress(pdf, tmp.path(), settings).await {
            warn!("Compression failed: {}", e);
            reporter.note(Severity::Warning, STATUS_COMPRESS_FAILED);
            return Ok(Compressed::Failed);
        }

        let before = self.size(pdf).await?;
        let after = match self.store.size(tmp.path()).await {
            Ok(n) if n > 0 => n,
            _ => {
                warn!("Compressor produced no output");
                reporter.note(Severity::Warning, STATUS_COMPRESS_FAILED);
                return Ok(Compressed::Failed);
            }
        };

        if after >= before {
            info!("Compression no gain: {} → {} bytes", before, after);
            reporter.note(Severity::Info, STATUS_NO_REDUCTION);
            return Ok(Compressed::NoGain);
        }

        let kept = if settings.keep_original {
            if let Err(e) = self.store.copy(pdf, original).await {
                warn!("Could not keep uncompressed PDF: {}", e);
                reporter.note(Severity::Warning, STATUS_COMPRESS_FAILED);
                return Ok(Compressed::Failed);
            }
            Some(original.to_path_buf())
        } else {
            None
        };
        // `pdf` is untouched until this rename succeeds.
        let tmp_path = tmp.into_temp_path();
        if let Err(e) = self.store.rename(&tmp_path, pdf).await {
            warn!("Could not replace {} with compressed output: {}", pdf.display(), e);
            if let Some(copy) = &kept {
                self.store.remove(copy).await;
            }
            reporter.note(Severity::Warning, STATUS_COMPRESS_FAILED);
            return Ok(Compressed::Failed);
        }
        // Renamed away; the drop-time removal finds nothing.
        drop(tmp_path);

        info!("Compressed {} → {} bytes", before, after);
        reporter.status(
            format!(
                "✅ Compressed PDF: {} KB → {} KB",
                before.div_ceil(1024),
                after.div_ceil(1024)
            ),
            Severity::Success,
        );
        Ok(Compressed::Smaller {
            before,
            after,
            original: kept,
        })
    }

    async fn size(&self, path: &Path) -> Result<u64, JobError> {
        self.store.size(path).await.map_err(|e| JobError::Pipeline {
            stage: "compress".into(),
            detail: format!("cannot stat {}: {}", path.display(), e),
        })
    }
}
