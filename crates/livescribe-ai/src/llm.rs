//! Single-turn LLM client shared by the insight generator and Q&A handler.

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use livescribe_core::config::LlmConfig;

const GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(String),
    #[error("llm returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response carried no text")]
    EmptyResponse,
    #[error("llm api key not configured")]
    MissingKey,
}

/// The one capability the pipeline needs from a language model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Gemini generateContent client. One instance is shared by reference
/// between the insight generator and the Q&A handler.
pub struct GeminiLlm {
    client: reqwest::Client,
    model: String,
    api_key: String,
    temperature: f64,
    max_tokens: u32,
}

impl GeminiLlm {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;
        Ok(Self {
            client,
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiLlm {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingKey);
        }

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
                "topP": 0.8,
                "topK": 40,
            }
        });

        debug!("llm request to {} ({} prompt chars)", self.model, prompt.len());
        let url = format!("{GENERATE_URL}/{}:generateContent", self.model);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;
        extract_text(&parsed).ok_or(LlmError::EmptyResponse)
    }
}

fn extract_text(response: &Value) -> Option<String> {
    let text = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()?;
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "an answer" }] } }]
        });
        assert_eq!(extract_text(&response).as_deref(), Some("an answer"));
        assert!(extract_text(&json!({"candidates": []})).is_none());
    }

    #[tokio::test]
    async fn test_missing_key_rejected() {
        let llm = GeminiLlm::new(&LlmConfig::default(), "").unwrap();
        assert!(matches!(
            llm.generate("hello").await,
            Err(LlmError::MissingKey)
        ));
    }
}
