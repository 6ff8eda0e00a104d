//! The job pipeline: mode dispatch over a fixed stage table.
//!
//! Each submodule implements one concern. Every backend can be replaced
//! through [`PipelineBuilder`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ pages ──▶ adapters ──▶ assemble ──▶ finalize
//! (URL/path) (pdfium) (retry+nonce) (embed/compress) (text artifact)
//! ```
//!
//! 1. [`input`]    — validate at submission, download URLs in the worker
//! 2. [`pages`]    — one adapter chain per page, inline markers for failures
//! 3. [`adapters`] — OCR engine and generative-text calls behind [`retry`]
//! 4. [`assemble`] — searchable PDF (plain or AI-corrected) and compression
//! 5. [`mode`]     — which stages run, and their progress ranges
//!
//! Cancellation is checked before every stage and every page. Once seen,
//! nothing further starts and the run returns [`RunOutcome::Cancelled`].

pub mod adapters;
pub mod assemble;
pub mod encode;
pub mod input;
pub mod llm;
pub mod mode;
pub mod pages;
pub mod postprocess;
pub mod render;
pub mod retry;

use crate::config::{JobOptions, PipelineConfig};
use crate::error::{JobError, PageError};
use crate::job::{JobReporter, PipelineOutput, Severity};
use crate::storage::{ArtifactStore, LocalStore};
use crate::tools::{
    Ghostscript, Hocr2Pdf, OcrEngine, OcrMyPdf, PdfCompressor, PdfEmbedder, Tesseract,
    TextLayerEngine,
};
use adapters::Adapters;
use assemble::{Assembler, Compressed, Embedded};
use input::{JobSource, SourceKind};
use llm::{LlmTextGenerator, TextGenerator};
use mode::{ProcessingMode, Stage, StageSpan};
use pages::{PageIterator, PageRun};
use render::{PdfBackend, PdfiumBackend};
use retry::RetryPolicy;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// One validated submission.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub source: JobSource,
    pub mode: ProcessingMode,
    pub options: JobOptions,
}

/// How a run ended, short of an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(PipelineOutput),
    Cancelled,
}

/// Return `Cancelled` from the enclosing run if the flag is set.
macro_rules! checkpoint {
    ($reporter:expr) => {
        if $reporter.is_cancelled() {
            info!("Cancellation observed");
            return Ok(RunOutcome::Cancelled);
        }
    };
}

/// The backends one pipeline drives. Shared by every job.
pub struct Pipeline {
    config: PipelineConfig,
    adapters: Adapters,
    backend: Arc<dyn PdfBackend>,
    embedder: Arc<dyn PdfEmbedder>,
    text_layer: Arc<dyn TextLayerEngine>,
    compressor: Arc<dyn PdfCompressor>,
    store: Arc<dyn ArtifactStore>,
}

impl Pipeline {
    /// Pipeline with the default backends: tesseract, edgequake-llm,
    /// ocrmypdf, hocr2pdf, Ghostscript, pdfium and a [`LocalStore`] on
    /// `config.output_dir`.
    pub fn from_config(config: PipelineConfig) -> Result<Self, JobError> {
        Self::builder(config).build()
    }

    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            ocr: None,
            generator: None,
            backend: None,
            embedder: None,
            text_layer: None,
            compressor: None,
            store: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Drive one job to completion or cancellation.
    ///
    /// Per-page and per-stage failures are absorbed into the output and the
    /// job's notes; an `Err` means the job as a whole failed.
    pub async fn run(
        &self,
        request: &JobRequest,
        reporter: &mut JobReporter,
    ) -> Result<RunOutcome, JobError> {
        let mode = request.mode;
        info!("Starting {} job for {}", mode, request.source.input);

        checkpoint!(reporter);
        let resolved = input::resolve_input(
            &request.source,
            self.store.scratch_dir(),
            self.config.download_timeout_secs,
        )
        .await?;
        let path = resolved.path();

        let mut output = PipelineOutput::default();
        let stem = request.source.stem();
        let job_id = reporter.job_id();
        let custom = request.options.prompt.as_deref();

        // ── Stage 1: extract / translate ─────────────────────────────────
        let first = mode.stages()[0];
        checkpoint!(reporter);
        self.enter(reporter, first);

        let text = match (mode, request.source.kind) {
            (ProcessingMode::Ocr | ProcessingMode::OcrAi, SourceKind::Pdf) => {
                match self
                    .iterate(path, mode, reporter, first, |adapters, page, png| async move {
                        adapters
                            .local_extract(&png)
                            .await
                            .map_err(|source| PageError::AdapterFailed { page, source })
                    })
                    .await?
                {
                    Some(text) => text,
                    None => return Ok(RunOutcome::Cancelled),
                }
            }
            (ProcessingMode::Ai, SourceKind::Pdf) => {
                match self
                    .iterate(path, mode, reporter, first, |adapters, page, png| async move {
                        adapters
                            .ai_extract(&png, custom)
                            .await
                            .map_err(|source| PageError::AdapterFailed { page, source })
                    })
                    .await?
                {
                    Some(text) => text,
                    None => return Ok(RunOutcome::Cancelled),
                }
            }
            (ProcessingMode::Translate, SourceKind::Pdf) => {
                let language = target_language(request)?;
                match self
                    .iterate(path, mode, reporter, first, |adapters, page, png| async move {
                        let to_page_err = |source| PageError::AdapterFailed { page, source };
                        let text = adapters.local_extract(&png).await.map_err(to_page_err)?;
                        adapters
                            .ai_translate(&text, language, custom)
                            .await
                            .map_err(to_page_err)
                    })
                    .await?
                {
                    Some(text) => text,
                    None => return Ok(RunOutcome::Cancelled),
                }
            }
            (ProcessingMode::Ocr | ProcessingMode::OcrAi, SourceKind::Image) => self
                .adapters
                .local_extract(path)
                .await
                .map_err(|e| stage_failed(Stage::Extract, e))?,
            (ProcessingMode::Ai, SourceKind::Image) => self
                .adapters
                .ai_extract(path, custom)
                .await
                .map_err(|e| stage_failed(Stage::Extract, e))?,
            (ProcessingMode::Translate, SourceKind::Image) => {
                let language = target_language(request)?;
                let text = self
                    .adapters
                    .local_extract(path)
                    .await
                    .map_err(|e| stage_failed(Stage::Extract, e))?;
                self.adapters
                    .ai_translate(&text, language, custom)
                    .await
                    .map_err(|e| stage_failed(Stage::Translate, e))?
            }
            (ProcessingMode::Translate, SourceKind::Text) => {
                let language = target_language(request)?;
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    JobError::Pipeline {
                        stage: "read".into(),
                        detail: e.to_string(),
                    }
                })?;
                self.adapters
                    .ai_translate(&text, language, custom)
                    .await
                    .map_err(|e| stage_failed(Stage::Translate, e))?
            }
            (_, SourceKind::Text) => {
                return Err(JobError::UnsupportedSource {
                    path: path.to_path_buf(),
                    mode: mode.to_string(),
                    reason: "plain-text sources can only be translated".into(),
                })
            }
        };
        reporter.progress(first.end);
        output.text = text;

        // ── Stage 2: AI correction (OCR + AI) ────────────────────────────
        if let Some(span) = mode.span(Stage::Correct) {
            checkpoint!(reporter);
            self.enter(reporter, span);
            match self.adapters.ai_correct(&output.text, custom).await {
                Ok(corrected) => output.text = corrected,
                Err(e) => {
                    warn!("AI correction failed, keeping OCR text: {}", e);
                    reporter.note(
                        Severity::Warning,
                        "⚠️ AI correction failed; OCR text kept.",
                    );
                }
            }
            reporter.progress(span.end);
        }

        // ── Stage 3/4: embed + compress (PDF sources only) ──────────────
        if request.source.kind == SourceKind::Pdf {
            if let Some(span) = mode.span(Stage::Embed) {
                checkpoint!(reporter);
                self.enter(reporter, span);
                let pdf_path = self.store.artifact_path(job_id, &stem, "_ocr.pdf");
                let assembler = self.assembler(reporter);
                let embedded = if mode == ProcessingMode::OcrAi {
                    let sidecar = self.store.artifact_path(job_id, &stem, "_ocr.txt");
                    assembler
                        .embed_corrected(path, &pdf_path, &sidecar, &output.text, reporter, span)
                        .await?
                } else {
                    assembler.embed_plain(path, &pdf_path, reporter).await?
                };
                if embedded == Embedded::Cancelled {
                    return Ok(RunOutcome::Cancelled);
                }
                reporter.progress(span.end);
                output.pdf_path = Some(pdf_path);
            }

            if let (Some(span), Some(pdf_path)) = (mode.span(Stage::Compress), &output.pdf_path) {
                let settings = &request.options.compression;
                if settings.enabled {
                    checkpoint!(reporter);
                    self.enter(reporter, span);
                    let original = self.store.artifact_path(job_id, &stem, "_ocr_original.pdf");
                    let compressed = self
                        .assembler(reporter)
                        .compress(pdf_path, &original, settings, reporter)
                        .await?;
                    if let Compressed::Smaller {
                        original: Some(kept),
                        ..
                    } = compressed
                    {
                        output.original_pdf_path = Some(kept);
                    }
                    reporter.progress(span.end);
                }
            }
        }

        // ── Finalize: text artifact ──────────────────────────────────────
        if let Some(span) = mode.span(Stage::Finalize) {
            checkpoint!(reporter);
            self.enter(reporter, span);
        }
        let suffix = if mode == ProcessingMode::Translate {
            "_translation.txt"
        } else {
            ".txt"
        };
        let text_path = self.store.artifact_path(job_id, &stem, suffix);
        self.store
            .write_text(&text_path, &output.text)
            .await
            .map_err(|source| JobError::ArtifactWriteFailed {
                path: text_path.clone(),
                source,
            })?;
        output.text_path = Some(text_path);

        info!("{} job finished", mode);
        Ok(RunOutcome::Completed(output))
    }

    fn enter(&self, reporter: &mut JobReporter, span: StageSpan) {
        match span.stage.phase() {
            Some(phase) => reporter.phase(phase, span.stage.status()),
            None => reporter.status(span.stage.status(), Severity::Info),
        }
        reporter.progress(span.start);
    }

    fn assembler(&self, reporter: &JobReporter) -> Assembler<'_> {
        Assembler {
            job_id: reporter.job_id(),
            backend: self.backend.as_ref(),
            embedder: self.embedder.as_ref(),
            text_layer: self.text_layer.as_ref(),
            compressor: self.compressor.as_ref(),
            store: self.store.as_ref(),
            adapters: &self.adapters,
        }
    }

    /// Run the page iterator; `None` means cancelled.
    async fn iterate<'s, F, Fut>(
        &'s self,
        pdf: &Path,
        mode: ProcessingMode,
        reporter: &mut JobReporter,
        span: StageSpan,
        per_page: F,
    ) -> Result<Option<String>, JobError>
    where
        F: Fn(&'s Adapters, usize, std::path::PathBuf) -> Fut,
        Fut: std::future::Future<Output = Result<String, PageError>>,
    {
        let iterator = PageIterator {
            job_id: reporter.job_id(),
            backend: self.backend.as_ref(),
            store: self.store.as_ref(),
            marker: self.config.page_markers.for_mode(mode),
            page_delay: self.config.page_delay(),
        };
        let adapters = &self.adapters;
        let run = iterator
            .run(pdf, reporter, span, span.stage.status(), |page, png| {
                per_page(adapters, page, png)
            })
            .await?;
        match run {
            PageRun::Completed { text, failed } => {
                if !failed.is_empty() {
                    warn!("{} page(s) failed and were marked inline", failed.len());
                }
                Ok(Some(text))
            }
            PageRun::Cancelled { .. } => Ok(None),
        }
    }
}

fn target_language(request: &JobRequest) -> Result<&str, JobError> {
    request
        .options
        .target_language
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| JobError::Validation("TRANSLATE mode requires a target language".into()))
}

fn stage_failed(stage: Stage, e: crate::error::AdapterError) -> JobError {
    JobError::Pipeline {
        stage: format!("{:?}", stage).to_lowercase(),
        detail: e.to_string(),
    }
}

/// Builder for [`Pipeline`]; any backend not set gets its default.
pub struct PipelineBuilder {
    config: PipelineConfig,
    ocr: Option<Arc<dyn OcrEngine>>,
    generator: Option<Arc<dyn TextGenerator>>,
    backend: Option<Arc<dyn PdfBackend>>,
    embedder: Option<Arc<dyn PdfEmbedder>>,
    text_layer: Option<Arc<dyn TextLayerEngine>>,
    compressor: Option<Arc<dyn PdfCompressor>>,
    store: Option<Arc<dyn ArtifactStore>>,
}

impl PipelineBuilder {
    pub fn ocr_engine(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn pdf_backend(mut self, backend: Arc<dyn PdfBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn PdfEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn text_layer(mut self, engine: Arc<dyn TextLayerEngine>) -> Self {
        self.text_layer = Some(engine);
        self
    }

    pub fn compressor(mut self, compressor: Arc<dyn PdfCompressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<Pipeline, JobError> {
        let c = self.config;
        let store: Arc<dyn ArtifactStore> = match self.store {
            Some(s) => s,
            None => Arc::new(LocalStore::new(&c.output_dir).map_err(|e| {
                JobError::InvalidConfig(format!(
                    "cannot create output dir '{}': {}",
                    c.output_dir.display(),
                    e
                ))
            })?),
        };
        let ocr = self
            .ocr
            .unwrap_or_else(|| Arc::new(Tesseract::new(&c.tesseract_path, &c.language)));
        let generator = self
            .generator
            .unwrap_or_else(|| Arc::new(LlmTextGenerator::new(c.clone())));
        let adapters = Adapters::new(
            generator,
            ocr,
            c.prompts.clone(),
            RetryPolicy::from_config(&c),
        );

        Ok(Pipeline {
            adapters,
            backend: self.backend.unwrap_or_else(|| {
                Arc::new(PdfiumBackend::new(
                    c.pdfium_lib_path.clone(),
                    c.dpi,
                    c.max_rendered_pixels,
                ))
            }),
            embedder: self
                .embedder
                .unwrap_or_else(|| Arc::new(OcrMyPdf::new(&c.ocrmypdf_path, &c.language))),
            text_layer: self
                .text_layer
                .unwrap_or_else(|| Arc::new(Hocr2Pdf::new(&c.hocr2pdf_path))),
            compressor: self
                .compressor
                .unwrap_or_else(|| Arc::new(Ghostscript::new(&c.ghostscript_path))),
            store,
            config: c,
        })
    }
}
