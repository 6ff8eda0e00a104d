//! External tools the pipeline shells out to.
//!
//! Each tool sits behind an `async_trait` seam so the pipeline can be driven
//! by in-process mocks in tests:
//!
//! | Trait              | Default            | Used for                          |
//! |--------------------|--------------------|-----------------------------------|
//! | [`OcrEngine`]      | [`Tesseract`]      | page image → text / hOCR          |
//! | [`PdfEmbedder`]    | [`OcrMyPdf`]       | PDF → searchable PDF              |
//! | [`TextLayerEngine`]| [`Hocr2Pdf`]       | image + corrected hOCR → PDF page |
//! | [`PdfCompressor`]  | [`Ghostscript`]    | PDF → recompressed PDF            |
//!
//! Every process runs through [`run_tool`], which maps a missing executable
//! to [`ToolError::NotFound`] and a non-zero exit to [`ToolError::Failed`].

pub mod ghostscript;
pub mod hocr2pdf;
pub mod ocrmypdf;
pub mod tesseract;

pub use ghostscript::Ghostscript;
pub use hocr2pdf::Hocr2Pdf;
pub use ocrmypdf::OcrMyPdf;
pub use tesseract::Tesseract;

use crate::config::CompressionSettings;
use crate::error::ToolError;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Local OCR engine: page image → plain text or hOCR.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract_text(&self, image: &Path) -> Result<String, ToolError>;

    async fn extract_hocr(&self, image: &Path) -> Result<String, ToolError>;
}

/// Turns a scanned PDF into a searchable one.
#[async_trait]
pub trait PdfEmbedder: Send + Sync {
    async fn embed(&self, input: &Path, output: &Path) -> Result<(), ToolError>;
}

/// Builds a single PDF page from a page image and its (corrected) hOCR.
#[async_trait]
pub trait TextLayerEngine: Send + Sync {
    async fn render_page(&self, image: &Path, hocr: &str, output: &Path) -> Result<(), ToolError>;
}

/// Recompresses a whole PDF.
#[async_trait]
pub trait PdfCompressor: Send + Sync {
    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        settings: &CompressionSettings,
    ) -> Result<(), ToolError>;
}

/// Run `program` to completion and return its output.
///
/// `stdin` is written to the child and closed while its output is
/// collected. A non-zero exit status is an error carrying the child's stderr.
pub async fn run_tool<I, S>(
    tool: &str,
    program: &Path,
    args: I,
    stdin: Option<&[u8]>,
) -> Result<Output, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    debug!("Running {}: {:?}", tool, cmd.as_std());

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ToolError::NotFound {
                tool: tool.to_string(),
                path: program.to_path_buf(),
            }
        } else {
            ToolError::Io(e)
        }
    })?;

    // stdin is fed while stdout/stderr drain, so a chatty child cannot block.
    let pipe = child.stdin.take();
    let feed = async move {
        match (stdin, pipe) {
            (Some(bytes), Some(mut pipe)) => match pipe.write_all(bytes).await {
                Ok(()) => pipe.shutdown().await,
                Err(e) => Err(e),
            },
            _ => Ok(()),
        }
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;
    if !output.status.success() {
        return Err(ToolError::failed(tool, output.status, &output.stderr));
    }
    // A child may exit successfully without reading all of its input.
    if let Err(e) = fed {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            return Err(ToolError::Io(e));
        }
    }
    Ok(output)
}
