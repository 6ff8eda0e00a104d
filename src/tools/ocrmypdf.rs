//! ocrmypdf text-layer embedding.

use super::{run_tool, PdfEmbedder};
use crate::error::ToolError;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;

/// Runs `ocrmypdf -l <lang> <in> <out>`.
#[derive(Debug, Clone)]
pub struct OcrMyPdf {
    path: PathBuf,
    language: String,
}

impl OcrMyPdf {
    pub fn new(path: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language: language.into(),
        }
    }
}

#[async_trait]
impl PdfEmbedder for OcrMyPdf {
    async fn embed(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        let args: [&OsStr; 4] = [
            OsStr::new("-l"),
            OsStr::new(&self.language),
            input.as_os_str(),
            output.as_os_str(),
        ];
        run_tool("ocrmypdf", &self.path, args, None).await?;
        if !output.exists() {
            return Err(ToolError::EmptyOutput {
                tool: "ocrmypdf".into(),
                detail: format!("{} was not created", output.display()),
            });
        }
        info!("Embedded text layer into {}", output.display());
        Ok(())
    }
}
