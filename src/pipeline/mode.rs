//! Processing modes and their stage tables.
//!
//! A mode is a closed enum; anything else fails in [`ProcessingMode::from_str`]
//! before a job exists. Each mode maps to a fixed sequence of stages, and
//! each stage owns a contiguous slice of the 0–100 progress range:
//!
//! ```text
//! OCR        Extract 5–45 │ Embed 45–80 │ Compress 80–95 │ Finalize 95–100
//! OCR + AI   Extract 5–30 │ Correct 30–45 │ Embed 45–80 │ Compress 80–95 │ Finalize 95–100
//! AI         Extract 5–95 │ Finalize 95–100
//! TRANSLATE  Translate 5–95 │ Finalize 95–100
//! ```

use crate::error::JobError;
use crate::job::JobPhase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a submitted document is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Local OCR, embedded into a searchable PDF.
    Ocr,
    /// Local OCR, AI-corrected, embedded with corrected words.
    OcrAi,
    /// Vision-model extraction; text only.
    Ai,
    /// Local OCR then AI translation; text only.
    Translate,
}

impl ProcessingMode {
    pub const ALL: [ProcessingMode; 4] = [Self::Ocr, Self::OcrAi, Self::Ai, Self::Translate];

    /// Ordered stages with their progress ranges.
    pub fn stages(self) -> &'static [StageSpan] {
        use Stage::*;
        const fn span(stage: Stage, start: u8, end: u8) -> StageSpan {
            StageSpan { stage, start, end }
        }
        const OCR: &[StageSpan] = &[
            span(Extract, 5, 45),
            span(Embed, 45, 80),
            span(Compress, 80, 95),
            span(Finalize, 95, 100),
        ];
        const OCR_AI: &[StageSpan] = &[
            span(Extract, 5, 30),
            span(Correct, 30, 45),
            span(Embed, 45, 80),
            span(Compress, 80, 95),
            span(Finalize, 95, 100),
        ];
        const AI: &[StageSpan] = &[span(Extract, 5, 95), span(Finalize, 95, 100)];
        const TRANSLATE: &[StageSpan] = &[span(Translate, 5, 95), span(Finalize, 95, 100)];

        match self {
            Self::Ocr => OCR,
            Self::OcrAi => OCR_AI,
            Self::Ai => AI,
            Self::Translate => TRANSLATE,
        }
    }

    /// Progress range of `stage` in this mode.
    pub fn span(self, stage: Stage) -> Option<StageSpan> {
        self.stages().iter().copied().find(|s| s.stage == stage)
    }

    /// Whether this mode produces a PDF artifact (for PDF sources).
    pub fn embeds(self) -> bool {
        self.span(Stage::Embed).is_some()
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ocr => "OCR",
            Self::OcrAi => "OCR + AI",
            Self::Ai => "AI",
            Self::Translate => "TRANSLATE",
        })
    }
}

impl FromStr for ProcessingMode {
    type Err = JobError;

    /// Accepts `OCR`, `OCR + AI` (also `OCR_AI`, `OCR-AI`), `AI`, `TRANSLATE`,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        match key.as_str() {
            "OCR" => Ok(Self::Ocr),
            "OCR+AI" | "OCR_AI" | "OCR-AI" | "OCRAI" => Ok(Self::OcrAi),
            "AI" => Ok(Self::Ai),
            "TRANSLATE" | "TRANSLATION" => Ok(Self::Translate),
            _ => Err(JobError::UnknownMode {
                mode: s.to_string(),
            }),
        }
    }
}

/// One step of a mode's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Correct,
    Translate,
    Embed,
    Compress,
    Finalize,
}

impl Stage {
    /// Phase shown while this stage runs. `Finalize` keeps the previous one.
    pub fn phase(self) -> Option<JobPhase> {
        match self {
            Self::Extract => Some(JobPhase::Extracting),
            Self::Correct => Some(JobPhase::Correcting),
            Self::Translate => Some(JobPhase::Translating),
            Self::Embed => Some(JobPhase::Embedding),
            Self::Compress => Some(JobPhase::Compressing),
            Self::Finalize => None,
        }
    }

    pub fn status(self) -> &'static str {
        match self {
            Self::Extract => "🔍 Extracting text",
            Self::Correct => "🤖 Correcting text with AI",
            Self::Translate => "🌐 Translating",
            Self::Embed => "📄 Embedding text into PDF",
            Self::Compress => "🗜️ Compressing PDF",
            Self::Finalize => "💾 Saving results",
        }
    }
}

/// A stage and its progress range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpan {
    pub stage: Stage,
    pub start: u8,
    pub end: u8,
}

impl StageSpan {
    /// Progress after `done` of `total` units of this stage.
    pub fn at(&self, done: usize, total: usize) -> u8 {
        if total == 0 {
            return self.end;
        }
        let width = (self.end - self.start) as usize;
        self.start + (width * done.min(total) / total) as u8
    }
}
