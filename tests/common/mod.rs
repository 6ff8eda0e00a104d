//! Shared fixtures for integration tests: in-process mocks for every
//! external backend, wired into a real `JobRegistry` over a temp directory.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_scan2text::pipeline::llm::{GenerationRequest, TextGenerator};
use edgequake_scan2text::prompts::{DEFAULT_CORRECTION_PROMPT, WORD_CORRECTION_PROMPT};
use edgequake_scan2text::stream::last_snapshot;
use edgequake_scan2text::{
    ArtifactStore, CompressionSettings, JobId, JobRegistry, JobSnapshot, LocalStore, OcrEngine,
    PdfBackend, PdfCompressor, PdfEmbedder, Pipeline, PipelineConfig, TextLayerEngine, ToolError,
};
use image::{DynamicImage, Rgba, RgbaImage};
use std::collections::HashSet;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tokio::sync::Notify;

// ── Fixture helpers ──────────────────────────────────────────────────────────

pub fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Page number from a page temp name `<job>_p<n>_<random>.png`.
fn page_of(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    name.split('_').nth(1)?.strip_prefix('p')?.parse().ok()
}

fn strip_nonce(prompt: &str) -> &str {
    prompt
        .rsplit_once("\n[request-id:")
        .map(|(p, _)| p)
        .unwrap_or(prompt)
}

fn payload(prompt: &str) -> &str {
    strip_nonce(prompt)
        .split_once("\n\n")
        .map(|(_, p)| p)
        .unwrap_or("")
}

// ── PDF backend ──────────────────────────────────────────────────────────────

/// Fake PDF library: any `%PDF` file has `pages` pages; rendering writes a
/// tiny PNG. Optionally pauses before rendering one page (first time it is
/// rendered, `gate_page`) or before the n-th render call overall
/// (`gate_call`) until released.
#[derive(Default)]
pub struct MockPdf {
    pub pages: usize,
    pub fail_render: HashSet<usize>,
    pub rendered: Mutex<Vec<usize>>,
    pub merges: AtomicUsize,
    pub gate_page: Option<usize>,
    pub gate_call: Option<usize>,
    pub gate_reached: Notify,
    pub gate_release: Notify,
}

impl MockPdf {
    pub fn with_pages(pages: usize) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn rendered(&self) -> Vec<usize> {
        self.rendered.lock().unwrap().clone()
    }
}

#[async_trait]
impl PdfBackend for MockPdf {
    async fn page_count(&self, _pdf: &Path) -> Result<usize, ToolError> {
        Ok(self.pages)
    }

    async fn render_page(&self, _pdf: &Path, index: usize, output: &Path) -> Result<(), ToolError> {
        let page = index + 1;
        let (call, first_time) = {
            let rendered = self.rendered.lock().unwrap();
            (rendered.len() + 1, !rendered.contains(&page))
        };
        if (first_time && self.gate_page == Some(page)) || self.gate_call == Some(call) {
            self.gate_reached.notify_one();
            self.gate_release.notified().await;
        }
        self.rendered.lock().unwrap().push(page);
        if self.fail_render.contains(&page) {
            return Err(ToolError::Pdfium(format!("cannot render page {}", page)));
        }
        tokio::fs::write(output, png_bytes()).await?;
        Ok(())
    }

    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        self.merges.fetch_add(1, Ordering::SeqCst);
        let mut merged = b"%PDF-merged\n".to_vec();
        for input in inputs {
            merged.extend(tokio::fs::read(input).await?);
            merged.push(b'\n');
        }
        tokio::fs::write(output, merged).await?;
        Ok(())
    }
}

// ── OCR engine ───────────────────────────────────────────────────────────────

/// Returns `ocr text page N` for page temps and `image text` otherwise.
#[derive(Default)]
pub struct MockOcr {
    pub fail_pages: HashSet<usize>,
    pub calls: Mutex<Vec<Option<usize>>>,
}

impl MockOcr {
    pub fn calls_for(&self, page: usize) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| **p == Some(page))
            .count()
    }
}

#[async_trait]
impl OcrEngine for MockOcr {
    async fn extract_text(&self, image: &Path) -> Result<String, ToolError> {
        let page = page_of(image);
        self.calls.lock().unwrap().push(page);
        match page {
            Some(n) if self.fail_pages.contains(&n) => Err(ToolError::EmptyOutput {
                tool: "tesseract".into(),
                detail: format!("no text on page {}", n),
            }),
            Some(n) => Ok(format!("ocr text page {}", n)),
            None => Ok("image text".to_string()),
        }
    }

    async fn extract_hocr(&self, image: &Path) -> Result<String, ToolError> {
        let n = page_of(image).unwrap_or(0);
        Ok(format!(
            "<div class='ocr_page'>\
             <span class='ocrx_word' id='w1' title='bbox 0 0 9 9'>helo</span> \
             <span class='ocrx_word' id='w2' title='bbox 10 0 19 9'>wrld</span> \
             <span class='ocrx_word' id='w3' title='bbox 20 0 29 9'>p{}</span>\
             </div>",
            n
        ))
    }
}

// ── Generative text ──────────────────────────────────────────────────────────

/// Answers by prompt type; can fail the first N calls, panic, pause, or
/// hold the whole-text correction call until released.
#[derive(Default)]
pub struct MockGenerator {
    pub fail_first: AtomicUsize,
    pub always_fail: bool,
    pub panic: bool,
    pub delay: Duration,
    pub prompts: Mutex<Vec<String>>,
    pub gate_correction: bool,
    pub gate_reached: Notify,
    pub gate_release: Notify,
}

impl MockGenerator {
    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_first: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, ToolError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.gate_correction && strip_nonce(&request.prompt).starts_with(DEFAULT_CORRECTION_PROMPT) {
            self.gate_reached.notify_one();
            self.gate_release.notified().await;
        }
        if self.panic {
            panic!("generator exploded");
        }
        if self.always_fail {
            return Err(ToolError::Llm("service unavailable".into()));
        }
        let pending = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(ToolError::Llm("transient failure".into()));
        }

        let prompt = strip_nonce(&request.prompt);
        let answer = if prompt.starts_with(WORD_CORRECTION_PROMPT) {
            prompt
                .split("\n---\n")
                .nth(1)
                .unwrap_or("")
                .trim_end_matches("\n---")
                .lines()
                .map(|w| w.to_uppercase())
                .collect::<Vec<_>>()
                .join("\n")
        } else if prompt.starts_with(DEFAULT_CORRECTION_PROMPT) {
            format!("corrected: {}", payload(prompt))
        } else if prompt.starts_with("Translate") {
            format!("translated: {}", payload(prompt))
        } else if request.image.is_some() {
            "ai page text".to_string()
        } else {
            format!("custom: {}", payload(prompt))
        };
        Ok(answer)
    }
}

// ── PDF tools ────────────────────────────────────────────────────────────────

/// Copies the input and appends a marker, unless told to fail. With `gated`
/// it pauses before embedding until released.
#[derive(Default)]
pub struct MockEmbedder {
    pub fail: bool,
    pub gated: bool,
    pub gate_reached: Notify,
    pub gate_release: Notify,
}

#[async_trait]
impl PdfEmbedder for MockEmbedder {
    async fn embed(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        if self.gated {
            self.gate_reached.notify_one();
            self.gate_release.notified().await;
        }
        if self.fail {
            return Err(ToolError::NotFound {
                tool: "ocrmypdf".into(),
                path: PathBuf::from("ocrmypdf"),
            });
        }
        let mut bytes = tokio::fs::read(input).await?;
        bytes.extend_from_slice(b"\n%text-layer");
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }
}

/// Writes the page's hOCR into a fake one-page PDF.
#[derive(Default)]
pub struct MockTextLayer;

#[async_trait]
impl TextLayerEngine for MockTextLayer {
    async fn render_page(&self, _image: &Path, hocr: &str, output: &Path) -> Result<(), ToolError> {
        tokio::fs::write(output, format!("%PDF-page\n{}", hocr)).await?;
        Ok(())
    }
}

/// Writes an output `ratio` times the input size.
pub struct MockCompressor {
    pub ratio: f64,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl Default for MockCompressor {
    fn default() -> Self {
        Self {
            ratio: 0.5,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PdfCompressor for MockCompressor {
    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        _settings: &CompressionSettings,
    ) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ToolError::EmptyOutput {
                tool: "gs".into(),
                detail: "no output".into(),
            });
        }
        let len = tokio::fs::metadata(input).await?.len() as f64;
        let mut bytes = b"%PDF".to_vec();
        bytes.resize(((len * self.ratio) as usize).max(bytes.len()), b'x');
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }
}

// ── Storage ──────────────────────────────────────────────────────────────────

/// [`LocalStore`] whose `rename` can be made to fail.
pub struct FlakyStore {
    pub inner: LocalStore,
    pub fail_rename: bool,
}

#[async_trait]
impl ArtifactStore for FlakyStore {
    fn scratch_dir(&self) -> &Path {
        self.inner.scratch_dir()
    }

    fn artifact_path(&self, job_id: JobId, stem: &str, suffix: &str) -> PathBuf {
        self.inner.artifact_path(job_id, stem, suffix)
    }

    fn temp_file(&self, job_id: JobId, tag: &str, ext: &str) -> io::Result<NamedTempFile> {
        self.inner.temp_file(job_id, tag, ext)
    }

    async fn write_text(&self, path: &Path, text: &str) -> io::Result<()> {
        self.inner.write_text(path, text).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        self.inner.copy(from, to).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.fail_rename {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only volume"));
        }
        self.inner.rename(from, to).await
    }

    async fn size(&self, path: &Path) -> io::Result<u64> {
        self.inner.size(path).await
    }

    async fn remove(&self, path: &Path) {
        self.inner.remove(path).await
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

/// Mocks to install; tweak fields before building a [`Harness`].
pub struct Mocks {
    pub pdf: MockPdf,
    pub ocr: MockOcr,
    pub generator: MockGenerator,
    pub embedder: MockEmbedder,
    pub compressor: MockCompressor,
    pub max_attempts: u32,
    pub page_delay_ms: u64,
    pub fail_rename: bool,
}

impl Default for Mocks {
    fn default() -> Self {
        Self {
            pdf: MockPdf::with_pages(3),
            ocr: MockOcr::default(),
            generator: MockGenerator::default(),
            embedder: MockEmbedder::default(),
            compressor: MockCompressor::default(),
            max_attempts: 3,
            page_delay_ms: 0,
            fail_rename: false,
        }
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub registry: JobRegistry,
    pub pdf: Arc<MockPdf>,
    pub ocr: Arc<MockOcr>,
    pub generator: Arc<MockGenerator>,
    pub embedder: Arc<MockEmbedder>,
    pub compressor: Arc<MockCompressor>,
}

impl Harness {
    pub fn new(mocks: Mocks) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("in")).unwrap();

        let config = PipelineConfig::builder()
            .output_dir(dir.path().join("out"))
            .max_attempts(mocks.max_attempts)
            .retry_delay_ms(0)
            .page_delay_ms(mocks.page_delay_ms)
            .build()
            .unwrap();

        let pdf = Arc::new(mocks.pdf);
        let ocr = Arc::new(mocks.ocr);
        let generator = Arc::new(mocks.generator);
        let embedder = Arc::new(mocks.embedder);
        let compressor = Arc::new(mocks.compressor);
        let store = FlakyStore {
            inner: LocalStore::new(dir.path().join("out")).unwrap(),
            fail_rename: mocks.fail_rename,
        };
        let pipeline = Pipeline::builder(config)
            .pdf_backend(pdf.clone())
            .ocr_engine(ocr.clone())
            .text_generator(generator.clone())
            .embedder(embedder.clone())
            .text_layer(Arc::new(MockTextLayer))
            .compressor(compressor.clone())
            .store(Arc::new(store))
            .build()
            .unwrap();

        Self {
            dir,
            registry: JobRegistry::new(pipeline),
            pdf,
            ocr,
            generator,
            embedder,
            compressor,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(Mocks::default())
    }

    fn write_input(&self, name: &str, bytes: &[u8]) -> String {
        let path = self.dir.path().join("in").join(name);
        std::fs::write(&path, bytes).unwrap();
        path.to_string_lossy().to_string()
    }

    pub fn pdf_input(&self, name: &str) -> String {
        self.write_input(name, b"%PDF-1.4\n% scanned fixture\n")
    }

    pub fn png_input(&self, name: &str) -> String {
        self.write_input(name, &png_bytes())
    }

    pub fn txt_input(&self, name: &str, text: &str) -> String {
        self.write_input(name, text.as_bytes())
    }

    /// Files in the output directory (not the scratch area) whose name ends
    /// with `suffix`.
    pub fn outputs_ending(&self, suffix: &str) -> Vec<PathBuf> {
        std::fs::read_dir(self.dir.path().join("out"))
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_file() && p.to_string_lossy().ends_with(suffix))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn scratch_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.dir.path().join("out").join("tmp"))
            .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    /// Wait for a job's terminal snapshot.
    pub async fn finish(&self, id: JobId) -> JobSnapshot {
        let stream = self.registry.watch(id).unwrap();
        tokio::time::timeout(Duration::from_secs(10), last_snapshot(stream))
            .await
            .expect("job did not finish within 10s")
            .expect("stream yields at least one snapshot")
    }

    /// Every snapshot a watcher sees until the job ends.
    pub async fn collect(&self, id: JobId) -> Vec<JobSnapshot> {
        use futures::StreamExt;
        let stream = self.registry.watch(id).unwrap();
        tokio::time::timeout(Duration::from_secs(10), stream.collect::<Vec<_>>())
            .await
            .expect("job did not finish within 10s")
    }
}
