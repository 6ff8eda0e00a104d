//! External adapters: one call to a flaky backend, wrapped in retry.
//!
//! | Adapter              | Backend          | Validity check                    |
//! |----------------------|------------------|-----------------------------------|
//! | `ai_extract`         | TextGenerator    | none                              |
//! | `ai_correct`         | TextGenerator    | non-empty answer                  |
//! | `ai_translate`       | TextGenerator    | non-empty answer                  |
//! | `ai_correct_words`   | TextGenerator    | word count equals input count     |
//! | `local_extract`      | OcrEngine        | none                              |
//! | `local_hocr`         | OcrEngine        | none                              |
//!
//! Every AI prompt gets a fresh `[request-id: …]` trailer per attempt, so a
//! retry is never answered from a cache with the response that just failed
//! validation.

use crate::error::AdapterError;
use crate::pipeline::encode::encode_image_file;
use crate::pipeline::llm::{GenerationRequest, TextGenerator};
use crate::pipeline::postprocess::{align_words, clean_ai_text, parse_word_list};
use crate::pipeline::retry::{retry, retry_with, RetryPolicy};
use crate::prompts::{self, PromptSet};
use crate::tools::OcrEngine;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// The set of adapters one pipeline run uses.
#[derive(Clone)]
pub struct Adapters {
    generator: Arc<dyn TextGenerator>,
    ocr: Arc<dyn OcrEngine>,
    prompts: PromptSet,
    policy: RetryPolicy,
}

impl Adapters {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        ocr: Arc<dyn OcrEngine>,
        prompts: PromptSet,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            ocr,
            prompts,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn generate(
        &self,
        operation: &str,
        prompt: &str,
        image: Option<&edgequake_llm::ImageData>,
        require_text: bool,
    ) -> Result<String, AdapterError> {
        let outcome = retry_with(
            &self.policy,
            operation,
            |_| {
                let request = match image {
                    Some(img) => GenerationRequest::with_image(prompts::with_nonce(prompt), img.clone()),
                    None => GenerationRequest::text(prompts::with_nonce(prompt)),
                };
                let generator = Arc::clone(&self.generator);
                async move { generator.generate(request).await.map(|t| clean_ai_text(&t)) }
            },
            |text: &String| !require_text || !text.trim().is_empty(),
        )
        .await?;
        Ok(outcome.value)
    }

    /// Text of a page or standalone image, read by the vision model.
    pub async fn ai_extract(&self, image: &Path, custom: Option<&str>) -> Result<String, AdapterError> {
        let data = encode_image_file(image).await.map_err(|e| AdapterError {
            operation: "ai_extract".into(),
            attempts: 1,
            detail: format!("cannot read {}: {}", image.display(), e),
        })?;
        let instruction = custom.unwrap_or_else(|| self.prompts.ocr());
        self.generate("ai_extract", instruction, Some(&data), false).await
    }

    /// One correction call over the concatenated OCR text.
    pub async fn ai_correct(&self, text: &str, custom: Option<&str>) -> Result<String, AdapterError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let instruction = custom.unwrap_or_else(|| self.prompts.correction());
        let prompt = prompts::with_payload(instruction, text);
        self.generate("ai_correct", &prompt, None, true).await
    }

    /// Translate `text` into `language`. A custom instruction may use the
    /// `{target_language}` placeholder.
    pub async fn ai_translate(
        &self,
        text: &str,
        language: &str,
        custom: Option<&str>,
    ) -> Result<String, AdapterError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let instruction = match custom {
            Some(template) => prompts::translation_prompt(template, language),
            None => self.prompts.translation(language),
        };
        let prompt = prompts::with_payload(&instruction, text);
        self.generate("ai_translate", &prompt, None, true).await
    }

    /// Corrected words, always exactly `words.len()` of them.
    ///
    /// A count mismatch that survives every retry is aligned against the
    /// originals; an outright failure returns the originals unchanged.
    pub async fn ai_correct_words(&self, words: &[String]) -> Vec<String> {
        if words.is_empty() {
            return Vec::new();
        }
        let prompt = prompts::word_correction_prompt(words);
        let expected = words.len();

        let result = retry_with(
            &self.policy,
            "ai_correct_words",
            |_| {
                let request = GenerationRequest::text(prompts::with_nonce(&prompt));
                let generator = Arc::clone(&self.generator);
                async move { generator.generate(request).await.map(|t| parse_word_list(&t)) }
            },
            |list: &Vec<String>| list.len() == expected,
        )
        .await;

        match result {
            Ok(outcome) if outcome.valid => {
                debug!("Corrected {} words in {} attempt(s)", expected, outcome.attempts);
                outcome.value
            }
            Ok(outcome) => {
                warn!(
                    "Word correction returned {} words for {} inputs; aligning against originals",
                    outcome.value.len(),
                    expected
                );
                align_words(words, &outcome.value)
            }
            Err(e) => {
                warn!("Word correction unavailable, keeping OCR words: {}", e);
                words.to_vec()
            }
        }
    }

    /// Plain text from the local OCR engine.
    pub async fn local_extract(&self, image: &Path) -> Result<String, AdapterError> {
        retry(&self.policy, "local_extract", |_| {
            let ocr = Arc::clone(&self.ocr);
            async move { ocr.extract_text(image).await }
        })
        .await
    }

    /// hOCR from the local OCR engine.
    pub async fn local_hocr(&self, image: &Path) -> Result<String, AdapterError> {
        retry(&self.policy, "local_hocr", |_| {
            let ocr = Arc::clone(&self.ocr);
            async move { ocr.extract_hocr(image).await }
        })
        .await
    }
}
