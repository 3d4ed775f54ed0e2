//! OpenAI-style transcription endpoint: whisper-1 and the gpt-4o family
//! share the multipart `/v1/audio/transcriptions` request shape.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use crate::frame::AudioBatch;

use super::{ProviderOutput, TranscriptSpan, TranscriptionError, TranscriptionProvider};

const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

#[derive(Deserialize)]
struct ApiSegment {
    text: String,
    start: f64,
    end: f64,
}

#[derive(Deserialize)]
struct ApiResponse {
    text: String,
    language: Option<String>,
    segments: Option<Vec<ApiSegment>>,
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    model: String,
    api_key: String,
    language: Option<String>,
}

impl OpenAiProvider {
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
}

#[async_trait]
impl TranscriptionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn transcribe(
        &self,
        wav: Vec<u8>,
        batch: &AudioBatch,
    ) -> Result<ProviderOutput, TranscriptionError> {
        if self.api_key.is_empty() {
            return Err(TranscriptionError::Fatal("openai api key not set".into()));
        }

        let file = Part::bytes(wav)
            .file_name(format!("batch_{}.wav", batch.sequence))
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::Fatal(e.to_string()))?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("temperature", "0");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        debug!("submitting batch {} to {}", batch.sequence, self.model);
        let response = self
            .client
            .post(TRANSCRIPTIONS_URL)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("{} returned {}: {}", self.model, status, body);
            // Auth and malformed-request failures will not heal on retry
            return if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
                Err(TranscriptionError::Fatal(message))
            } else {
                Err(TranscriptionError::Transient(message))
            };
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Transient(e.to_string()))?;

        Ok(ProviderOutput {
            text: parsed.text,
            spans: parsed.segments.map(|segments| {
                segments
                    .into_iter()
                    .map(|s| TranscriptSpan {
                        text: s.text.trim().to_string(),
                        start: s.start,
                        end: s.end,
                    })
                    .collect()
            }),
            language: parsed.language,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "text": "hello there",
            "language": "english",
            "segments": [
                {"id": 0, "text": " hello", "start": 0.0, "end": 1.2},
                {"id": 1, "text": " there", "start": 1.2, "end": 2.0}
            ]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.text, "hello there");
        assert_eq!(parsed.language.as_deref(), Some("english"));
        assert_eq!(parsed.segments.unwrap().len(), 2);
    }

    #[test]
    fn test_response_without_segments() {
        let json = r#"{"text": "short"}"#;
        let parsed: ApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.text, "short");
        assert!(parsed.language.is_none());
        assert!(parsed.segments.is_none());
    }

    #[tokio::test]
    async fn test_missing_key_is_fatal() {
        let provider = OpenAiProvider::new(reqwest::Client::new(), "whisper-1", "", None);
        let batch = AudioBatch {
            samples: vec![0; 160],
            timestamp: chrono::Utc::now(),
            duration: 0.01,
            sequence: 0,
            is_final: false,
        };
        let err = provider.transcribe(vec![], &batch).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
