//! End-to-end integration tests for edgequake-scan2text.
//!
//! These tests use real scans in `./test_cases/` and the real external
//! tools (pdfium, tesseract, ocrmypdf, hocr2pdf, gs). AI-mode tests also make
//! live LLM calls. Everything is gated behind the `E2E_ENABLED` environment
//! variable so nothing runs in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_ocr_pdf -- --nocapture

use edgequake_scan2text::pipeline::render::{PdfBackend, PdfiumBackend};
use edgequake_scan2text::stream::last_snapshot;
use edgequake_scan2text::tools::Tesseract;
use edgequake_scan2text::{
    CompressionSettings, JobOptions, JobPhase, JobRegistry, JobResult, JobSnapshot, OcrEngine,
    PipelineConfig, PipelineOutput, ProcessingMode,
};
use pdfium_render::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Skip unless some LLM provider key is configured.
macro_rules! skip_unless_llm {
    () => {
        if ["OPENAI_API_KEY", "ANTHROPIC_API_KEY", "GEMINI_API_KEY", "EDGEQUAKE_LLM_PROVIDER"]
            .iter()
            .all(|k| std::env::var(k).is_err())
        {
            println!("SKIP — no LLM provider configured");
            return;
        }
    };
}

fn registry() -> JobRegistry {
    let config = PipelineConfig::builder()
        .output_dir(output_dir())
        .page_delay_ms(0)
        .retry_delay_ms(500)
        .build()
        .expect("valid config");
    JobRegistry::from_config(config).expect("registry")
}

async fn run(registry: &JobRegistry, input: &PathBuf, mode: ProcessingMode, options: JobOptions) -> JobSnapshot {
    let id = registry
        .submit(input.to_str().unwrap(), mode, options)
        .expect("submission accepted");
    let stream = registry.watch(id).unwrap();
    tokio::time::timeout(Duration::from_secs(600), last_snapshot(stream))
        .await
        .expect("job finished within 10 minutes")
        .expect("at least one snapshot")
}

fn assert_completed<'a>(snapshot: &'a JobSnapshot, context: &str) -> &'a PipelineOutput {
    assert_eq!(
        snapshot.phase,
        JobPhase::Completed,
        "[{context}] status: {}",
        snapshot.status
    );
    assert_eq!(snapshot.progress, 100, "[{context}]");
    match &snapshot.result {
        Some(JobResult::Output(out)) => {
            assert!(!out.text.trim().is_empty(), "[{context}] text is empty");
            println!(
                "[{context}] ✓  {} chars, {} note(s)",
                out.text.len(),
                snapshot.notes.len()
            );
            out
        }
        other => panic!("[{context}] expected output, got {:?}", other),
    }
}

fn assert_is_pdf(path: &PathBuf, context: &str) {
    let bytes = std::fs::read(path).unwrap_or_else(|e| panic!("[{context}] {}: {e}", path.display()));
    assert!(bytes.starts_with(b"%PDF"), "[{context}] not a PDF: {}", path.display());
}

/// Text layer of page 1, read back through pdfium.
fn embedded_text(pdf: &PathBuf) -> String {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from) {
        Some(p) if p.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&p))
        }
        Some(p) => Pdfium::bind_to_library(p),
        None => Pdfium::bind_to_system_library(),
    }
    .expect("pdfium binds");
    let pdfium = Pdfium::new(bindings);
    let doc = pdfium.load_pdf_from_file(pdf, None).expect("artifact loads");
    let page = doc.pages().get(0).expect("page 1");
    let text = page.text().expect("text layer").all();
    text
}

fn ascii_words(s: &str) -> HashSet<String> {
    s.split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>())
        .filter(|w| w.len() > 2)
        .collect()
}

// ── Backend tests (no LLM) ───────────────────────────────────────────────────

#[tokio::test]
async fn test_pdfium_renders_scanned_letter() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_letter.pdf"));

    let backend = PdfiumBackend::new(None, 300, 4000);
    backend.check().await.expect("pdfium binds");
    let pages = backend.page_count(&path).await.expect("page count");
    assert!(pages >= 1);

    let png = output_dir().join("e2e_render_p1.png");
    backend.render_page(&path, 0, &png).await.expect("render page 1");
    let bytes = std::fs::read(&png).unwrap();
    assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    std::fs::remove_file(&png).ok();
}

#[tokio::test]
async fn test_tesseract_hocr_has_words() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_receipt.png"));

    let tesseract = Tesseract::new("tesseract", "eng");
    let text = tesseract.extract_text(&path).await.expect("tesseract text");
    assert!(!text.trim().is_empty());
    let hocr = tesseract.extract_hocr(&path).await.expect("tesseract hOCR");
    let words = edgequake_scan2text::pipeline::postprocess::hocr_words(&hocr);
    assert!(!words.is_empty(), "hOCR has no words");
    println!("{} words, first: {:?}", words.len(), words.first());
}

// ── Job tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ocr_pdf() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_letter.pdf"));

    let done = run(&registry(), &path, ProcessingMode::Ocr, JobOptions::default()).await;
    let out = assert_completed(&done, "ocr");
    assert!(out.text.starts_with("Page 1:\n"));
    assert_is_pdf(out.pdf_path.as_ref().unwrap(), "ocr");
    assert!(done.total_pages >= 1);
    assert_eq!(done.current_page, done.total_pages);
}

#[tokio::test]
async fn test_ocr_round_trip_single_page() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_single_page.pdf"));

    let done = run(&registry(), &path, ProcessingMode::Ocr, JobOptions::default()).await;
    let out = assert_completed(&done, "round trip");
    assert_eq!(done.total_pages, 1);

    let extracted = ascii_words(&out.text);
    let embedded = ascii_words(&embedded_text(out.pdf_path.as_ref().unwrap()));
    let shared = extracted.intersection(&embedded).count();
    println!(
        "[round trip] {} extracted / {} embedded / {} shared words",
        extracted.len(),
        embedded.len(),
        shared
    );
    assert!(!extracted.is_empty());
    assert!(
        shared * 10 >= extracted.len() * 9,
        "text layer does not reproduce the OCR text"
    );
}

#[tokio::test]
async fn test_ocr_pdf_compressed() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_letter.pdf"));

    let options = JobOptions::default().with_compression(CompressionSettings {
        target_dpi: 100,
        quality: 60,
        keep_original: true,
        ..CompressionSettings::enabled()
    });
    let done = run(&registry(), &path, ProcessingMode::Ocr, options).await;
    let out = assert_completed(&done, "ocr+compress");
    let pdf = out.pdf_path.as_ref().unwrap();
    assert_is_pdf(pdf, "ocr+compress");

    // Either it shrank (and the original was kept) or it was left alone.
    if let Some(original) = &out.original_pdf_path {
        let before = std::fs::metadata(original).unwrap().len();
        let after = std::fs::metadata(pdf).unwrap().len();
        assert!(after < before, "{after} >= {before}");
    }
}

#[tokio::test]
async fn test_ocr_ai_pdf() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_letter.pdf"));
    skip_unless_llm!();

    let done = run(&registry(), &path, ProcessingMode::OcrAi, JobOptions::default()).await;
    let out = assert_completed(&done, "ocr+ai");
    assert_is_pdf(out.pdf_path.as_ref().unwrap(), "ocr+ai");
}

#[tokio::test]
async fn test_ai_image() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_receipt.png"));
    skip_unless_llm!();

    let done = run(&registry(), &path, ProcessingMode::Ai, JobOptions::default()).await;
    let out = assert_completed(&done, "ai image");
    assert!(out.pdf_path.is_none());
    assert!(!out.text.starts_with("```"), "fences are stripped");
}

#[tokio::test]
async fn test_translate_pdf() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_letter.pdf"));
    skip_unless_llm!();

    let options = JobOptions::default().with_target_language("French");
    let done = run(&registry(), &path, ProcessingMode::Translate, options).await;
    let out = assert_completed(&done, "translate");
    assert!(out
        .text_path
        .as_ref()
        .unwrap()
        .to_string_lossy()
        .ends_with("_translation.txt"));
}

#[tokio::test]
async fn test_cancel_real_job() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_letter.pdf"));

    let registry = registry();
    let id = registry
        .submit(path.to_str().unwrap(), ProcessingMode::Ocr, JobOptions::default())
        .unwrap();
    registry.cancel(id).unwrap();
    let done = last_snapshot(registry.watch(id).unwrap()).await.unwrap();
    assert_eq!(done.phase, JobPhase::Cancelled);
    assert_eq!(done.progress, 0);
}
