//! Generative-text service: the [`TextGenerator`] seam and its
//! edgequake-llm implementation.
//!
//! This module only moves a prompt (and optionally one page image) to the
//! model and brings the answer back. Retry, nonces and response cleanup
//! live in [`crate::pipeline::adapters`] so they apply to every generator,
//! mocks included.

use crate::config::PipelineConfig;
use crate::error::{JobError, ToolError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// One request to the generative-text service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Page image for vision calls.
    pub image: Option<ImageData>,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, image: ImageData) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
        }
    }
}

/// Remote generative-text service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, ToolError>;
}

/// [`TextGenerator`] backed by an `edgequake_llm::LLMProvider`.
///
/// The provider is resolved on first use, so a deployment that only runs
/// OCR mode never needs an API key.
pub struct LlmTextGenerator {
    config: PipelineConfig,
    provider: OnceCell<Arc<dyn LLMProvider>>,
}

impl LlmTextGenerator {
    pub fn new(config: PipelineConfig) -> Self {
        let provider = OnceCell::new();
        if let Some(p) = &config.provider {
            let _ = provider.set(Arc::clone(p));
        }
        Self { config, provider }
    }

    fn provider(&self) -> Result<&Arc<dyn LLMProvider>, JobError> {
        self.provider.get_or_try_init(|| resolve_provider(&self.config))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            ..Default::default()
        }
    }
}

impl fmt::Debug for LlmTextGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmTextGenerator")
            .field("model", &self.config.model)
            .field("provider_name", &self.config.provider_name)
            .field("resolved", &self.provider.get().is_some())
            .finish()
    }
}

#[async_trait]
impl TextGenerator for LlmTextGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, ToolError> {
        let provider = self.provider().map_err(|e| ToolError::Llm(e.to_string()))?;

        let message = match request.image {
            Some(image) => ChatMessage::user_with_images(request.prompt, vec![image]),
            None => ChatMessage::user(request.prompt),
        };

        let response = provider
            .chat(&[message], Some(&self.options()))
            .await
            .map_err(|e| ToolError::Llm(e.to_string()))?;

        debug!(
            "LLM call: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, JobError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        JobError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    both set and non-empty.
/// 4. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, JobError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| JobError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
