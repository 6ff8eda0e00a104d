//! CLI binary for edgequake-scan2text.
//!
//! A thin shim over the library crate: maps CLI flags to `PipelineConfig`
//! and `JobOptions`, submits one job, and renders its snapshot stream.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_scan2text::pipeline::input::inspect_source;
use edgequake_scan2text::pipeline::render::PdfiumBackend;
use edgequake_scan2text::{
    CompressionSettings, ImageFormat, JobOptions, JobRegistry, JobResult, JobSnapshot, PageMarker,
    PageMarkers, PipelineConfig, ProcessingMode, Severity, SourceKind,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Snapshot renderer using indicatif ────────────────────────────────────────

/// Renders a job's snapshot stream as a percentage bar plus one log line
/// per finished page and per note.
struct SnapshotView {
    bar: Option<ProgressBar>,
    pages_seen: usize,
    notes_seen: usize,
}

impl SnapshotView {
    fn new(show_progress: bool) -> Self {
        let bar = show_progress.then(|| {
            let bar = ProgressBar::new(100);
            let style = ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS);
            bar.set_style(style);
            bar.set_prefix("Submitted");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        Self {
            bar,
            pages_seen: 0,
            notes_seen: 0,
        }
    }

    fn println(&self, line: String) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }

    fn update(&mut self, s: &JobSnapshot) {
        if s.current_page > self.pages_seen {
            for page in self.pages_seen + 1..=s.current_page {
                self.println(format!(
                    "  {} Page {:>3}/{:<3}",
                    green("✓"),
                    page,
                    s.total_pages
                ));
            }
            self.pages_seen = s.current_page;
        }
        for note in s.notes.iter().skip(self.notes_seen) {
            let line = match note.severity {
                Severity::Warning | Severity::Error => yellow(&note.message),
                _ => dim(&note.message),
            };
            self.println(format!("  {line}"));
        }
        self.notes_seen = s.notes.len();

        if let Some(bar) = &self.bar {
            bar.set_prefix(format!("{:?}", s.phase));
            bar.set_position(u64::from(s.progress));
            bar.set_message(s.status.clone());
        }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Searchable PDF + text with local OCR
  scan2text scan.pdf

  # Local OCR, then AI correction of text and text layer
  scan2text --mode "OCR + AI" scan.pdf

  # Vision-model transcription of a photo
  scan2text --mode AI receipt.jpg

  # Translate a scanned PDF into Spanish
  scan2text --mode TRANSLATE --target-language Spanish scan.pdf

  # Compress the searchable PDF, keeping the uncompressed copy
  scan2text --compress --compress-dpi 120 --keep-original scan.pdf

  # Terminal snapshot as JSON
  scan2text --json scan.pdf > job.json

MODES:
  OCR         tesseract text + ocrmypdf text layer
  OCR + AI    OCR, then LLM correction; corrected words in the text layer
  AI          vision LLM reads each page
  TRANSLATE   OCR per page, LLM translation (also accepts .txt input)

EXTERNAL TOOLS:
  tesseract, ocrmypdf, hocr2pdf (ExactImage), gs (Ghostscript)
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  SCAN2TEXT_*             Any flag below, e.g. SCAN2TEXT_OUTPUT_DIR

Press Ctrl-C once to cancel the job at the next page boundary.
"#;

/// Turn scanned PDFs and images into text, searchable PDFs and translations.
#[derive(Parser, Debug)]
#[command(
    name = "scan2text",
    version,
    about = "Turn scanned PDFs and images into text, searchable PDFs and translations",
    long_about = "Run one OCR / AI / translation job over a local file or URL. Local OCR uses \
tesseract and ocrmypdf; AI modes use any provider supported by edgequake-llm (OpenAI, \
Anthropic, Gemini, Ollama, ...).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF, image or text file, or an HTTP/HTTPS URL.
    input: String,

    /// Processing mode: OCR, "OCR + AI", AI, TRANSLATE.
    #[arg(short, long, env = "SCAN2TEXT_MODE", default_value = "OCR")]
    mode: String,

    /// Directory receiving artifacts.
    #[arg(short, long, env = "SCAN2TEXT_OUTPUT_DIR", default_value = "outputs")]
    output_dir: PathBuf,

    /// OCR language code(s) for tesseract/ocrmypdf, e.g. eng or eng+fra.
    #[arg(short, long, env = "SCAN2TEXT_LANGUAGE", default_value = "eng")]
    language: String,

    /// Target language for TRANSLATE mode.
    #[arg(short = 't', long, env = "SCAN2TEXT_TARGET_LANGUAGE")]
    target_language: Option<String>,

    /// Custom instruction replacing the mode's default prompt.
    #[arg(long, env = "SCAN2TEXT_PROMPT", conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// Read the custom instruction from a file.
    #[arg(long, env = "SCAN2TEXT_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Compress the searchable PDF with Ghostscript.
    #[arg(long, env = "SCAN2TEXT_COMPRESS")]
    compress: bool,

    /// Target resolution for embedded images when compressing (36–600).
    #[arg(long, env = "SCAN2TEXT_COMPRESS_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(36..=600))]
    compress_dpi: u32,

    /// JPEG quality when compressing (1–100).
    #[arg(long, env = "SCAN2TEXT_COMPRESS_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    compress_quality: u8,

    /// Image encoding when compressing.
    #[arg(long, env = "SCAN2TEXT_IMAGE_FORMAT", value_enum, default_value = "jpeg")]
    image_format: ImageFormatArg,

    /// Keep the uncompressed PDF as <job>_<name>_ocr_original.pdf.
    #[arg(long, env = "SCAN2TEXT_KEEP_ORIGINAL")]
    keep_original: bool,

    /// Page marker: none, heading, bracket, or a custom line with {n}.
    #[arg(long, env = "SCAN2TEXT_PAGE_MARKER", default_value = "heading")]
    page_marker: String,

    /// Rendering DPI for page rasterisation (72–600).
    #[arg(long, env = "SCAN2TEXT_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Attempts per external call, including the first.
    #[arg(long, env = "SCAN2TEXT_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Delay between attempts in milliseconds.
    #[arg(long, env = "SCAN2TEXT_RETRY_DELAY_MS", default_value_t = 2000)]
    retry_delay_ms: u64,

    /// Delay between pages in milliseconds.
    #[arg(long, env = "SCAN2TEXT_PAGE_DELAY_MS", default_value_t = 1000)]
    page_delay_ms: u64,

    /// LLM model ID (e.g. gpt-4.1-nano, gemini-2.0-flash).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "SCAN2TEXT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "SCAN2TEXT_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SCAN2TEXT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Path to the tesseract executable.
    #[arg(long, env = "SCAN2TEXT_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Path to the ocrmypdf executable.
    #[arg(long, env = "SCAN2TEXT_OCRMYPDF", default_value = "ocrmypdf")]
    ocrmypdf: PathBuf,

    /// Path to the hocr2pdf executable.
    #[arg(long, env = "SCAN2TEXT_HOCR2PDF", default_value = "hocr2pdf")]
    hocr2pdf: PathBuf,

    /// Path to the Ghostscript executable.
    #[arg(long, env = "SCAN2TEXT_GHOSTSCRIPT", default_value = "gs")]
    ghostscript: PathBuf,

    /// Print the extracted text to stdout when the job completes.
    #[arg(long, env = "SCAN2TEXT_PRINT")]
    print: bool,

    /// Print the terminal job snapshot as JSON.
    #[arg(long, env = "SCAN2TEXT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SCAN2TEXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCAN2TEXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCAN2TEXT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ImageFormatArg {
    Jpeg,
    Png,
}

impl From<ImageFormatArg> for ImageFormat {
    fn from(v: ImageFormatArg) -> Self {
        match v {
            ImageFormatArg::Jpeg => ImageFormat::Jpeg,
            ImageFormatArg::Png => ImageFormat::Png,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mode: ProcessingMode = cli.mode.parse().context("Invalid --mode")?;
    let config = build_config(&cli)?;
    let options = build_options(&cli).await?;

    // Fail fast on a missing pdfium before a job is queued.
    let source = inspect_source(&cli.input, mode).context("Cannot process input")?;
    if source.kind == SourceKind::Pdf {
        PdfiumBackend::new(config.pdfium_lib_path.clone(), config.dpi, config.max_rendered_pixels)
            .check()
            .await
            .context("PDF engine unavailable")?;
    }

    let registry = JobRegistry::from_config(config).context("Invalid configuration")?;
    let job_id = registry
        .submit(&cli.input, mode, options)
        .context("Submission rejected")?;
    if !cli.quiet && !cli.json {
        eprintln!(
            "{} {} job {}",
            cyan("◆"),
            bold(&mode.to_string()),
            dim(&job_id.to_string())
        );
    }

    // ── Follow the job ───────────────────────────────────────────────────
    let mut view = SnapshotView::new(show_progress);
    let mut stream = registry.watch(job_id)?;
    let mut last: Option<JobSnapshot> = None;
    let mut cancel_sent = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(snapshot) => {
                    if !cli.quiet && !cli.json {
                        view.update(&snapshot);
                    }
                    last = Some(snapshot);
                }
                None => break,
            },
            _ = &mut ctrl_c, if !cancel_sent => {
                cancel_sent = true;
                registry.cancel(job_id)?;
                view.println(format!("  {} Cancelling after the current page…", yellow("⏹")));
            }
        }
    }
    view.finish();

    let last = last.context("Job produced no snapshot")?;
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&last).context("Failed to serialise snapshot")?
        );
    }

    match &last.result {
        Some(JobResult::Output(output)) => {
            if cli.print {
                println!("{}", output.text.trim_end());
            }
            if !cli.quiet && !cli.json {
                let tick = if last.severity == Severity::Success {
                    green("✔")
                } else {
                    yellow("⚠")
                };
                eprintln!("{} {}", tick, bold(&last.status));
                for path in [&output.text_path, &output.pdf_path, &output.original_pdf_path]
                    .into_iter()
                    .flatten()
                {
                    eprintln!("   → {}", path.display());
                }
            }
            Ok(())
        }
        Some(JobResult::Cancelled) => {
            if !cli.quiet && !cli.json {
                eprintln!("{} {}", yellow("⏹"), bold(&last.status));
            }
            anyhow::bail!("job {} was cancelled", job_id)
        }
        Some(JobResult::Failed { message }) => {
            if !cli.json {
                eprintln!("{} {}", red("✘"), bold(&last.status));
            }
            anyhow::bail!("job {} failed: {}", job_id, message)
        }
        None => anyhow::bail!("job {} ended without a result", job_id),
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .output_dir(&cli.output_dir)
        .language(&cli.language)
        .dpi(cli.dpi)
        .max_attempts(cli.max_attempts)
        .retry_delay_ms(cli.retry_delay_ms)
        .page_delay_ms(cli.page_delay_ms)
        .page_markers(PageMarkers::uniform(parse_marker(&cli.page_marker)))
        .download_timeout_secs(cli.download_timeout)
        .tesseract_path(&cli.tesseract)
        .ocrmypdf_path(&cli.ocrmypdf)
        .hocr2pdf_path(&cli.hocr2pdf)
        .ghostscript_path(&cli.ghostscript)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }

    builder.build().context("Invalid configuration")
}

/// Map CLI args to per-job `JobOptions`.
async fn build_options(cli: &Cli) -> Result<JobOptions> {
    let prompt = match (&cli.prompt, &cli.prompt_file) {
        (Some(p), _) => Some(p.clone()),
        (None, Some(path)) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt from {:?}", path))?,
        ),
        (None, None) => None,
    };

    Ok(JobOptions {
        target_language: cli.target_language.clone(),
        prompt: prompt.filter(|p| !p.trim().is_empty()),
        compression: CompressionSettings {
            enabled: cli.compress,
            target_dpi: cli.compress_dpi,
            quality: cli.compress_quality,
            image_format: cli.image_format.into(),
            keep_original: cli.keep_original,
        },
    })
}

/// Parse `--page-marker` string into `PageMarker`.
fn parse_marker(s: &str) -> PageMarker {
    match s.to_lowercase().as_str() {
        "none" => PageMarker::None,
        "heading" => PageMarker::Heading,
        "bracket" => PageMarker::Bracket,
        _ => PageMarker::Custom(s.to_string()),
    }
}
