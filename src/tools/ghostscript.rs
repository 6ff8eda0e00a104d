//! Ghostscript PDF recompression.

use super::{run_tool, PdfCompressor};
use crate::config::{CompressionSettings, ImageFormat};
use crate::error::ToolError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Re-distills a PDF with `gs -sDEVICE=pdfwrite`, downsampling images.
#[derive(Debug, Clone)]
pub struct Ghostscript {
    path: PathBuf,
}

impl Ghostscript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn args(input: &Path, output: &Path, settings: &CompressionSettings) -> Vec<String> {
        let dpi = settings.target_dpi;
        let mut args: Vec<String> = [
            "-sDEVICE=pdfwrite",
            "-dCompatibilityLevel=1.4",
            "-dNOPAUSE",
            "-dBATCH",
            "-dQUIET",
            "-dDownsampleColorImages=true",
            "-dDownsampleGrayImages=true",
            "-dDownsampleMonoImages=true",
            "-dColorImageDownsampleType=/Bicubic",
            "-dGrayImageDownsampleType=/Bicubic",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.push(format!("-dColorImageResolution={}", dpi));
        args.push(format!("-dGrayImageResolution={}", dpi));
        args.push(format!("-dMonoImageResolution={}", dpi));

        args.extend(
            [
                "-dAutoFilterColorImages=false",
                "-dAutoFilterGrayImages=false",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        match settings.image_format {
            ImageFormat::Jpeg => {
                args.push("-dColorImageFilter=/DCTEncode".into());
                args.push("-dGrayImageFilter=/DCTEncode".into());
                args.push(format!("-dJPEGQ={}", settings.quality));
            }
            ImageFormat::Png => {
                args.push("-dColorImageFilter=/FlateEncode".into());
                args.push("-dGrayImageFilter=/FlateEncode".into());
            }
        }

        args.push(format!("-sOutputFile={}", output.to_string_lossy()));
        args.push(input.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl PdfCompressor for Ghostscript {
    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        settings: &CompressionSettings,
    ) -> Result<(), ToolError> {
        run_tool("ghostscript", &self.path, Self::args(input, output, settings), None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_args_carry_quality_and_dpi() {
        let settings = CompressionSettings {
            target_dpi: 72,
            quality: 60,
            ..CompressionSettings::enabled()
        };
        let args = Ghostscript::args(Path::new("in.pdf"), Path::new("out.pdf"), &settings);
        assert!(args.contains(&"-dColorImageResolution=72".to_string()));
        assert!(args.contains(&"-dJPEGQ=60".to_string()));
        assert!(args.contains(&"-dColorImageFilter=/DCTEncode".to_string()));
        assert_eq!(args.last().unwrap(), "in.pdf");
        assert!(args.contains(&"-sOutputFile=out.pdf".to_string()));
    }

    #[test]
    fn png_args_are_lossless() {
        let settings = CompressionSettings {
            image_format: ImageFormat::Png,
            ..CompressionSettings::enabled()
        };
        let args = Ghostscript::args(Path::new("a.pdf"), Path::new("b.pdf"), &settings);
        assert!(args.contains(&"-dColorImageFilter=/FlateEncode".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("-dJPEGQ")));
    }
}
