//! hocr2pdf page renderer (ExactImage).

use super::{run_tool, TextLayerEngine};
use crate::error::ToolError;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Runs `hocr2pdf -i <image> -o <out>`, feeding the hOCR on stdin.
#[derive(Debug, Clone)]
pub struct Hocr2Pdf {
    path: PathBuf,
}

impl Hocr2Pdf {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TextLayerEngine for Hocr2Pdf {
    async fn render_page(&self, image: &Path, hocr: &str, output: &Path) -> Result<(), ToolError> {
        let args: [&OsStr; 4] = [
            OsStr::new("-i"),
            image.as_os_str(),
            OsStr::new("-o"),
            output.as_os_str(),
        ];
        run_tool("hocr2pdf", &self.path, args, Some(hocr.as_bytes())).await?;
        Ok(())
    }
}
