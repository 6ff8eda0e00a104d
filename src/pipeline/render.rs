//! PDF backend: page count, page rasterisation and page merging via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. Every call moves onto the blocking pool so the
//! tokio workers driving other jobs never stall.
//!
//! A fresh binding is made per call. pdfium documents are not `Send`, and
//! binding is cheap next to rendering a page at 300 DPI.

use crate::error::{JobError, ToolError};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Operations the pipeline needs from a PDF library.
#[async_trait]
pub trait PdfBackend: Send + Sync {
    async fn page_count(&self, pdf: &Path) -> Result<usize, ToolError>;

    /// Rasterise 0-based page `index` to a PNG file at `output`.
    async fn render_page(&self, pdf: &Path, index: usize, output: &Path) -> Result<(), ToolError>;

    /// Concatenate single- or multi-page PDFs into `output`, in order.
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError>;
}

/// [`PdfBackend`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumBackend {
    lib_path: Option<PathBuf>,
    dpi: u32,
    max_pixels: u32,
}

impl PdfiumBackend {
    /// `lib_path` overrides `PDFIUM_LIB_PATH`; with neither, the system
    /// library is used.
    pub fn new(lib_path: Option<PathBuf>, dpi: u32, max_pixels: u32) -> Self {
        let lib_path = lib_path.or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));
        Self {
            lib_path,
            dpi,
            max_pixels,
        }
    }

    /// Verify that a pdfium library can be bound.
    pub async fn check(&self) -> Result<(), JobError> {
        let lib_path = self.lib_path.clone();
        tokio::task::spawn_blocking(move || bind(lib_path.as_deref()).map(|_| ()))
            .await
            .map_err(|e| JobError::Internal(format!("pdfium check panicked: {}", e)))?
            .map_err(|e| JobError::PdfiumBindingFailed(e.to_string()))
    }
}

/// Bind to pdfium: explicit file, a directory holding the platform library,
/// or the system library.
fn bind(lib_path: Option<&Path>) -> Result<Pdfium, ToolError> {
    let bindings = match lib_path {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ToolError::Pdfium(format!("cannot bind library: {:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn pdfium_err(context: &str, e: PdfiumError) -> ToolError {
    ToolError::Pdfium(format!("{}: {:?}", context, e))
}

async fn blocking<T, F>(f: F) -> Result<T, ToolError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ToolError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::Pdfium(format!("pdfium task panicked: {}", e)))?
}

#[async_trait]
impl PdfBackend for PdfiumBackend {
    async fn page_count(&self, pdf: &Path) -> Result<usize, ToolError> {
        let lib_path = self.lib_path.clone();
        let pdf = pdf.to_path_buf();
        blocking(move || {
            let pdfium = bind(lib_path.as_deref())?;
            let document = pdfium
                .load_pdf_from_file(&pdf, None)
                .map_err(|e| pdfium_err("cannot open PDF", e))?;
            let count = document.pages().len() as usize;
            info!("PDF loaded: {} pages", count);
            Ok(count)
        })
        .await
    }

    async fn render_page(&self, pdf: &Path, index: usize, output: &Path) -> Result<(), ToolError> {
        let lib_path = self.lib_path.clone();
        let pdf = pdf.to_path_buf();
        let output = output.to_path_buf();
        let (dpi, max_pixels) = (self.dpi, self.max_pixels);
        blocking(move || {
            render_page_blocking(lib_path.as_deref(), &pdf, index, &output, dpi, max_pixels)
        })
        .await
    }

    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        let lib_path = self.lib_path.clone();
        let inputs = inputs.to_vec();
        let output = output.to_path_buf();
        blocking(move || {
            let pdfium = bind(lib_path.as_deref())?;
            let mut merged = pdfium
                .create_new_pdf()
                .map_err(|e| pdfium_err("cannot create PDF", e))?;
            for input in &inputs {
                let doc = pdfium
                    .load_pdf_from_file(input, None)
                    .map_err(|e| pdfium_err("cannot open page PDF", e))?;
                merged
                    .pages_mut()
                    .append(&doc)
                    .map_err(|e| pdfium_err("cannot append pages", e))?;
            }
            merged
                .save_to_file(&output)
                .map_err(|e| pdfium_err("cannot save merged PDF", e))?;
            debug!("Merged {} PDFs into {}", inputs.len(), output.display());
            Ok(())
        })
        .await
    }
}

fn render_page_blocking(
    lib_path: Option<&Path>,
    pdf: &Path,
    index: usize,
    output: &Path,
    dpi: u32,
    max_pixels: u32,
) -> Result<(), ToolError> {
    let pdfium = bind(lib_path)?;
    let document = pdfium
        .load_pdf_from_file(pdf, None)
        .map_err(|e| pdfium_err("cannot open PDF", e))?;
    let page = document
        .pages()
        .get(index as u16)
        .map_err(|e| pdfium_err(&format!("page {}", index + 1), e))?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let rendered = page
        .render_with_config(&render_config)
        .map_err(|e| pdfium_err(&format!("render page {}", index + 1), e))?
        .as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        index + 1,
        rendered.width(),
        rendered.height()
    );

    rendered
        .to_rgb8()
        .save_with_format(output, image::ImageFormat::Png)
        .map_err(|e| ToolError::Io(std::io::Error::other(e.to_string())))
}
