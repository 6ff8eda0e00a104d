//! # edgequake-scan2text
//!
//! Turn scanned PDFs and images into corrected or translated text and
//! searchable PDFs, as background jobs with live progress and cooperative
//! cancellation.
//!
//! ## Why this crate?
//!
//! A scanned document passes through several unreliable backends: a local
//! OCR engine, a remote generative-text model, PDF embedding and compression
//! tools. Any of them can fail on any page. This crate runs each document as
//! an independent job that retries external calls, marks failed pages inline
//! instead of aborting, and reports progress that a UI can poll or stream.
//!
//! ## Pipeline Overview
//!
//! ```text
//! submit(file, mode, options) ──► JobId
//!  │
//!  ├─ 1. Input     validate now; download URLs inside the worker
//!  ├─ 2. Pages     rasterise each page via pdfium (spawn_blocking)
//!  ├─ 3. Adapters  tesseract / LLM per page, bounded retries with a nonce
//!  ├─ 4. Correct   OCR + AI: whole-text correction
//!  ├─ 5. Assemble  searchable PDF (ocrmypdf, or corrected hOCR + merge)
//!  ├─ 6. Compress  Ghostscript, kept only if smaller
//!  └─ 7. Finalize  text artifact, terminal snapshot
//! ```
//!
//! | Mode        | Stages                                          |
//! |-------------|-------------------------------------------------|
//! | `OCR`       | extract → embed → compress? → finalize          |
//! | `OCR + AI`  | extract → correct → embed (AI) → compress? → finalize |
//! | `AI`        | extract (vision model) → finalize               |
//! | `TRANSLATE` | extract + translate per page → finalize         |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_scan2text::{JobOptions, JobRegistry, PipelineConfig, ProcessingMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let registry = JobRegistry::from_config(PipelineConfig::default())?;
//!     let options = JobOptions::default().with_target_language("Spanish");
//!     let id = registry.submit("scan.pdf", ProcessingMode::Translate, options)?;
//!
//!     let stream = registry.watch(id)?;
//!     if let Some(done) = edgequake_scan2text::stream::last_snapshot(stream).await {
//!         println!("{} ({}%)", done.status, done.progress);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scan2text` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-scan2text = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! `tesseract`, `ocrmypdf`, `hocr2pdf` (ExactImage) and `gs` are invoked as
//! processes; their paths are configurable on [`PipelineConfig`]. pdfium is
//! loaded dynamically (`PDFIUM_LIB_PATH` or the system library). Every
//! backend sits behind a trait and can be replaced through
//! [`Pipeline::builder`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod prompts;
pub mod registry;
pub mod storage;
pub mod stream;
pub mod tools;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CompressionSettings, ImageFormat, JobOptions, PageMarker, PageMarkers, PipelineConfig,
    PipelineConfigBuilder,
};
pub use error::{AdapterError, JobError, PageError, ToolError};
pub use job::{
    CancelAck, JobId, JobNote, JobPhase, JobResult, JobSnapshot, PipelineOutput, Severity,
};
pub use pipeline::input::SourceKind;
pub use pipeline::llm::TextGenerator;
pub use pipeline::mode::ProcessingMode;
pub use pipeline::render::PdfBackend;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use prompts::PromptSet;
pub use registry::JobRegistry;
pub use storage::{ArtifactStore, LocalStore};
pub use stream::SnapshotStream;
pub use tools::{OcrEngine, PdfCompressor, PdfEmbedder, TextLayerEngine};
