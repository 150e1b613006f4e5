//! AI provider abstraction for match explanations.
//!
//! Trait-based so backends swap by configuration: disabled (always fails),
//! mock (deterministic canned text), or an OpenAI-compatible remote API.

use async_trait::async_trait;
use recon_core::error::AppError;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::AiConfig;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Result of a provider explanation.
#[derive(Debug, Clone)]
pub struct AiResult {
    pub explanation: String,
    pub confidence: String,
}

/// Trait for match-explanation providers.
#[async_trait]
pub trait ExplainProvider: Send + Sync {
    /// Produce an explanation for the given prompt.
    async fn explain_match(&self, prompt: &str) -> Result<AiResult, ProviderError>;
}

/// Provider used when no AI backend is configured; every call fails and the
/// caller falls back to the templated explanation.
pub struct DisabledProvider;

#[async_trait]
impl ExplainProvider for DisabledProvider {
    async fn explain_match(&self, _prompt: &str) -> Result<AiResult, ProviderError> {
        Err(ProviderError::NotConfigured("AI disabled".to_string()))
    }
}

/// Deterministic 'AI-ish' provider for local runs and tests.
pub struct MockProvider;

#[async_trait]
impl ExplainProvider for MockProvider {
    async fn explain_match(&self, _prompt: &str) -> Result<AiResult, ProviderError> {
        Ok(AiResult {
            explanation: "This match is likely because the amounts align and the transaction \
                          timing is close to the invoice. The memo text also overlaps with the \
                          invoice description, increasing confidence."
                .to_string(),
            confidence: "medium".to_string(),
        })
    }
}

/// Chat Completions-style remote provider (kept minimal).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl ExplainProvider for OpenAiProvider {
    async fn explain_match(&self, prompt: &str) -> Result<AiResult, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You explain invoice-bank transaction matching decisions. \
                                Be concise: 2-6 sentences. Return a confidence label of low|medium|high.",
                },
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::ApiError(format!(
                "Unexpected status {}",
                response.status()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(e.to_string()))?;

        let text = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        // Naive confidence extraction from the model's own wording.
        let lowered = text.to_lowercase();
        let confidence = if lowered.contains("confidence: high") || lowered.contains("high confidence") {
            "high"
        } else if lowered.contains("confidence: low") || lowered.contains("low confidence") {
            "low"
        } else {
            "medium"
        };

        Ok(AiResult {
            explanation: if text.is_empty() {
                "No explanation returned.".to_string()
            } else {
                text
            },
            confidence: confidence.to_string(),
        })
    }
}

/// Build the provider named by configuration. Unknown providers resolve to
/// disabled rather than failing startup.
pub fn build_provider(config: &AiConfig) -> Result<Arc<dyn ExplainProvider>, AppError> {
    match config.provider.to_lowercase().as_str() {
        "openai" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("OPENAI_API_KEY is required for the openai provider"))
            })?;
            Ok(Arc::new(OpenAiProvider::new(
                api_key,
                config.base_url.clone(),
                config.model.clone(),
                Duration::from_secs_f64(config.timeout_seconds),
            )?))
        }
        "mock" => Ok(Arc::new(MockProvider)),
        _ => Ok(Arc::new(DisabledProvider)),
    }
}
