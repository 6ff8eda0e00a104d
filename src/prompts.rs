//! Prompts sent to the generative-text service.
//!
//! Every prompt lives here so the default behaviour can be changed in one
//! place and inspected by unit tests without a live model.
//!
//! Deployments override the defaults through [`PromptSet`]; a single job can
//! replace its mode's instruction through [`crate::JobOptions::prompt`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default instruction for extracting text from a page image.
pub const DEFAULT_OCR_PROMPT: &str = "Perform OCR on the following document. \
Begin your answer directly with the OCR. Format the result as HTML, indicating \
where each page begins, each paragraph begins, and marking titles with the \
appropriate HTML tags (e.g., <h1>, <h2>, etc.).";

/// Default instruction for correcting locally extracted text.
pub const DEFAULT_CORRECTION_PROMPT: &str = "Correct the following text. Begin \
your answer directly with the corrected text. Format the result as HTML, \
indicating where each page begins, each paragraph begins, and marking titles \
with the appropriate HTML tags (e.g., <h1>, <h2>, etc.).";

/// Default translation instruction.
///
/// `{target_language}` is replaced with the job's target language.
pub const DEFAULT_TRANSLATION_PROMPT: &str = "Translate the following text to \
{target_language}. Do not add any commentary; only output the translated text. \
Begin your answer directly with the translation.";

/// Instruction for word-level correction of an hOCR word list.
///
/// Unlike the other prompts this one is not user-overridable: the reply must
/// stay aligned 1:1 with the input words or the text layer breaks.
pub const WORD_CORRECTION_PROMPT: &str = "Correct the OCR errors in the words \
below. Return exactly the same number of words, in the same order, one word \
per line and nothing else. Do not merge or split words. Do not include HTML \
tags; plain text only.";

/// Deployment-level prompt overrides. `None` falls back to the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptSet {
    pub ocr: Option<String>,
    pub correction: Option<String>,
    /// Must contain `{target_language}`; otherwise the language is appended.
    pub translation: Option<String>,
}

impl PromptSet {
    pub fn ocr(&self) -> &str {
        self.ocr.as_deref().unwrap_or(DEFAULT_OCR_PROMPT)
    }

    pub fn correction(&self) -> &str {
        self.correction.as_deref().unwrap_or(DEFAULT_CORRECTION_PROMPT)
    }

    /// Translation instruction for `language`.
    pub fn translation(&self, language: &str) -> String {
        let template = self
            .translation
            .as_deref()
            .unwrap_or(DEFAULT_TRANSLATION_PROMPT);
        translation_prompt(template, language)
    }
}

/// Fill the `{target_language}` placeholder.
///
/// Templates without the placeholder get an explicit target line appended so
/// a custom prompt cannot silently lose the language.
pub fn translation_prompt(template: &str, language: &str) -> String {
    if template.contains("{target_language}") {
        template.replace("{target_language}", language)
    } else {
        format!("{}\nTarget language: {}", template.trim_end(), language)
    }
}

/// Instruction followed by the payload text, separated by a blank line.
pub fn with_payload(instruction: &str, payload: &str) -> String {
    format!("{}\n\n{}", instruction.trim_end(), payload)
}

/// Prompt for the word-level correction call.
pub fn word_correction_prompt(words: &[String]) -> String {
    format!(
        "{}\n---\n{}\n---",
        WORD_CORRECTION_PROMPT,
        words.join("\n")
    )
}

/// Append a fresh request id as a trailer line.
///
/// The instruction and payload are untouched; the trailer only makes the
/// prompt unique so no cache in front of the model can serve an old answer.
pub fn with_nonce(prompt: &str) -> String {
    format!("{}\n[request-id: {}]", prompt, Uuid::new_v4())
}
