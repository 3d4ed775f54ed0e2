//! Gemini audio transcription over the generateContent REST endpoint with
//! the WAV payload inlined as base64.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::debug;

use crate::frame::AudioBatch;

use super::{ProviderOutput, TranscriptionError, TranscriptionProvider};

const GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiAudioProvider {
    client: reqwest::Client,
    model: String,
    api_key: String,
    language: Option<String>,
}

impl GeminiAudioProvider {
    pub fn new(
        client: reqwest::Client,
        model: impl Into<String>,
        api_key: impl Into<String>,
        language: Option<String>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            api_key: api_key.into(),
            language,
        }
    }

    fn prompt(&self) -> String {
        match &self.language {
            Some(language) => format!(
                "Transcribe this audio in {language}. Provide only the transcription text \
                 without any additional commentary."
            ),
            None => "Transcribe this audio accurately. Provide only the transcription text \
                     without any additional commentary."
                .to_string(),
        }
    }
}

#[async_trait]
impl TranscriptionProvider for GeminiAudioProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn transcribe(
        &self,
        wav: Vec<u8>,
        batch: &AudioBatch,
    ) -> Result<ProviderOutput, TranscriptionError> {
        if self.api_key.is_empty() {
            return Err(TranscriptionError::Fatal("gemini api key not set".into()));
        }

        let body = json!({
            "contents": [{
                "parts": [
                    { "text": self.prompt() },
                    {
                        "inline_data": {
                            "mime_type": "audio/wav",
                            "data": base64::engine::general_purpose::STANDARD.encode(&wav),
                        }
                    }
                ]
            }]
        });

        debug!("submitting batch {} to {}", batch.sequence, self.model);
        let url = format!("{GENERATE_URL}/{}:generateContent", self.model);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| TranscriptionError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("{} returned {}: {}", self.model, status, body);
            return if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
                Err(TranscriptionError::Fatal(message))
            } else {
                Err(TranscriptionError::Transient(message))
            };
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Transient(e.to_string()))?;
        let text = extract_text(&parsed).ok_or_else(|| {
            TranscriptionError::Transient("gemini response carried no text".into())
        })?;

        // Gemini returns no sub-segments; the dispatcher synthesises one.
        Ok(ProviderOutput {
            text,
            spans: None,
            language: self.language.clone(),
        })
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
