//! Tesseract OCR engine.

use super::{run_tool, OcrEngine};
use crate::error::ToolError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Runs `tesseract <image> stdout -l <lang> [hocr]`.
#[derive(Debug, Clone)]
pub struct Tesseract {
    path: PathBuf,
    language: String,
}

impl Tesseract {
    pub fn new(path: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language: language.into(),
        }
    }

    fn args(&self, image: &Path, hocr: bool) -> Vec<String> {
        let mut args = vec![
            image.to_string_lossy().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
        ];
        if hocr {
            args.push("hocr".to_string());
        }
        args
    }
}

#[async_trait]
impl OcrEngine for Tesseract {
    async fn extract_text(&self, image: &Path) -> Result<String, ToolError> {
        let out = run_tool("tesseract", &self.path, self.args(image, false), None).await?;
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    async fn extract_hocr(&self, image: &Path) -> Result<String, ToolError> {
        let out = run_tool("tesseract", &self.path, self.args(image, true), None).await?;
        let hocr = String::from_utf8_lossy(&out.stdout).into_owned();
        if !hocr.contains("ocr_page") {
            return Err(ToolError::EmptyOutput {
                tool: "tesseract".into(),
                detail: format!("no hOCR page for {}", image.display()),
            });
        }
        Ok(hocr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hocr_args_end_with_config() {
        let t = Tesseract::new("tesseract", "spa");
        let args = t.args(Path::new("/tmp/p1.png"), true);
        assert_eq!(args, ["/tmp/p1.png", "stdout", "-l", "spa", "hocr"]);
        assert_eq!(t.args(Path::new("x.png"), false).len(), 4);
    }
}
