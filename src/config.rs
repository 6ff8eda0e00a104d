//! Configuration types for the job pipeline.
//!
//! Two layers of configuration exist because they have different lifetimes:
//!
//! * [`PipelineConfig`] is deployment-wide: tool locations, OCR language,
//!   retry policy, LLM provider. Built once through
//!   [`PipelineConfigBuilder`] and shared by every job.
//! * [`JobOptions`] travels with one submission: target language, custom
//!   prompt, compression settings. It is immutable once the job starts.

use crate::error::JobError;
use crate::pipeline::mode::ProcessingMode;
use crate::prompts::PromptSet;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Deployment-wide configuration for the pipeline.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_scan2text::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .output_dir("/tmp/scan2text")
///     .language("spa")
///     .max_attempts(3)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Directory receiving artifacts and scratch files. Default: `outputs`.
    pub output_dir: PathBuf,

    /// Tesseract/ocrmypdf language code, fixed per deployment. Default: `eng`.
    pub language: String,

    /// Rendering DPI used when rasterising a PDF page for OCR. Range: 72–600. Default: 300.
    ///
    /// Tesseract is tuned for ~300 DPI input; lower values lose small print.
    pub dpi: u32,

    /// Cap on either rendered dimension, in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Attempts per external call, including the first. Default: 3.
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds. Default: 2000.
    pub retry_delay_ms: u64,

    /// Delay after each page of a multi-page document, in milliseconds. Default: 1000.
    ///
    /// Keeps page-by-page AI calls under the service's rate limits.
    pub page_delay_ms: u64,

    /// Page markers used by each mode when accumulating text.
    pub page_markers: PageMarkers,

    /// HTTP timeout for downloading URL inputs, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Path to the `tesseract` executable. Default: `tesseract` (from `PATH`).
    pub tesseract_path: PathBuf,

    /// Path to the `ocrmypdf` executable. Default: `ocrmypdf`.
    pub ocrmypdf_path: PathBuf,

    /// Path to the `hocr2pdf` executable used by the AI text-layer engine.
    pub hocr2pdf_path: PathBuf,

    /// Path to the Ghostscript executable. Default: `gs`.
    pub ghostscript_path: PathBuf,

    /// Explicit pdfium library to bind. Falls back to `PDFIUM_LIB_PATH`, then
    /// the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// LLM model identifier, e.g. "gemini-2.0-flash".
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 8192.
    pub max_tokens: usize,

    /// Deployment-level prompt overrides.
    pub prompts: PromptSet,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            language: "eng".to_string(),
            dpi: 300,
            max_rendered_pixels: 4000,
            max_attempts: 3,
            retry_delay_ms: 2000,
            page_delay_ms: 1000,
            page_markers: PageMarkers::default(),
            download_timeout_secs: 120,
            tesseract_path: PathBuf::from("tesseract"),
            ocrmypdf_path: PathBuf::from("ocrmypdf"),
            hocr2pdf_path: PathBuf::from("hocr2pdf"),
            ghostscript_path: PathBuf::from("gs"),
            pdfium_lib_path: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            prompts: PromptSet::default(),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("output_dir", &self.output_dir)
            .field("language", &self.language)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("page_delay_ms", &self.page_delay_ms)
            .field("page_markers", &self.page_markers)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.page_delay_ms = ms;
        self
    }

    pub fn page_markers(mut self, markers: PageMarkers) -> Self {
        self.config.page_markers = markers;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn ocrmypdf_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ocrmypdf_path = path.into();
        self
    }

    pub fn hocr2pdf_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.hocr2pdf_path = path.into();
        self
    }

    pub fn ghostscript_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ghostscript_path = path.into();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn prompts(mut self, prompts: PromptSet) -> Self {
        self.config.prompts = prompts;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, JobError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(JobError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.language.trim().is_empty() {
            return Err(JobError::InvalidConfig("OCR language must not be empty".into()));
        }
        if c.dpi < 72 || c.dpi > 600 {
            return Err(JobError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        Ok(self.config)
    }
}

// ── Per-job options ──────────────────────────────────────────────────────

/// Options travelling with a single submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOptions {
    /// Target language for [`ProcessingMode::Translate`], e.g. "Spanish".
    pub target_language: Option<String>,

    /// Custom instruction replacing the mode's default prompt.
    pub prompt: Option<String>,

    /// Compression applied to the PDF artifact after embedding.
    pub compression: CompressionSettings,
}

impl JobOptions {
    pub fn with_target_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = Some(language.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_compression(mut self, compression: CompressionSettings) -> Self {
        self.compression = compression;
        self
    }

    /// Check the options against the requested mode.
    pub fn validate(&self, mode: ProcessingMode) -> Result<(), JobError> {
        if mode == ProcessingMode::Translate
            && self
                .target_language
                .as_deref()
                .map_or(true, |l| l.trim().is_empty())
        {
            return Err(JobError::Validation(
                "TRANSLATE mode requires a target language".into(),
            ));
        }
        self.compression.validate()
    }
}

/// Image format Ghostscript re-encodes embedded images with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossy DCT; honours [`CompressionSettings::quality`]. (default)
    #[default]
    Jpeg,
    /// Lossless Flate.
    Png,
}

/// Compression applied to a finished PDF artifact.
///
/// The compressed file only replaces the artifact when it is strictly
/// smaller than the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionSettings {
    pub enabled: bool,
    /// Resolution embedded images are downsampled to. Range: 36–600. Default: 150.
    pub target_dpi: u32,
    /// JPEG quality. Range: 1–100. Default: 85.
    pub quality: u8,
    pub image_format: ImageFormat,
    /// Keep the uncompressed artifact next to the compressed one.
    pub keep_original: bool,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            target_dpi: 150,
            quality: 85,
            image_format: ImageFormat::Jpeg,
            keep_original: false,
        }
    }
}

impl CompressionSettings {
    /// Enabled settings with defaults for everything else.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if !self.enabled {
            return Ok(());
        }
        if !(36..=600).contains(&self.target_dpi) {
            return Err(JobError::Validation(format!(
                "compression DPI must be 36–600, got {}",
                self.target_dpi
            )));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(JobError::Validation(format!(
                "compression quality must be 1–100, got {}",
                self.quality
            )));
        }
        Ok(())
    }
}

// ── Page markers ─────────────────────────────────────────────────────────

/// Delimiter written in front of each page's text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PageMarker {
    /// Pages are joined with a blank line and no label.
    None,
    /// `Page N:` on its own line. (default)
    #[default]
    Heading,
    /// `[Page N]` on its own line.
    Bracket,
    /// Custom line; `{n}` is replaced with the page number.
    Custom(String),
}

impl PageMarker {
    /// Render one page's text, including its marker and the trailing blank line.
    pub fn render(&self, page_num: usize, text: &str) -> String {
        let body = text.trim_end();
        match self {
            PageMarker::None => format!("{}\n\n", body),
            PageMarker::Heading => format!("Page {}:\n{}\n\n", page_num, body),
            PageMarker::Bracket => format!("[Page {}]\n{}\n\n", page_num, body),
            PageMarker::Custom(tpl) => {
                format!("{}\n{}\n\n", tpl.replace("{n}", &page_num.to_string()), body)
            }
        }
    }
}

/// Which [`PageMarker`] each mode uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMarkers {
    pub ocr: PageMarker,
    pub ai: PageMarker,
    pub translate: PageMarker,
}

impl Default for PageMarkers {
    fn default() -> Self {
        Self {
            ocr: PageMarker::Heading,
            ai: PageMarker::Heading,
            translate: PageMarker::Heading,
        }
    }
}

impl PageMarkers {
    /// Same marker for every mode.
    pub fn uniform(marker: PageMarker) -> Self {
        Self {
            ocr: marker.clone(),
            ai: marker.clone(),
            translate: marker,
        }
    }

    pub fn for_mode(&self, mode: ProcessingMode) -> &PageMarker {
        match mode {
            ProcessingMode::Ocr | ProcessingMode::OcrAi => &self.ocr,
            ProcessingMode::Ai => &self.ai,
            ProcessingMode::Translate => &self.translate,
        }
    }
}
