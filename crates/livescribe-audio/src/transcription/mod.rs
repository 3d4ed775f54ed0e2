//! Speech-to-text: provider abstraction, engine selection and the ordered
//! fallback dispatcher.

mod dispatcher;
mod engine;
mod gemini;
mod openai;

pub use dispatcher::{Dispatcher, ModelStats};
pub use engine::TranscriptionEngine;
pub use gemini::GeminiAudioProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::AudioBatch;

/// Provider failure taxonomy. Transient failures are retried with backoff;
/// fatal ones fall straight through to the next model.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("fatal provider error: {0}")]
    Fatal(String),
}

impl TranscriptionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TranscriptionError::Transient(_))
    }
}

/// Provider-reported sub-segment with offsets relative to batch start.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSpan {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl TranscriptSpan {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Final text of one audio batch. Append-only once produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub spans: Vec<TranscriptSpan>,
    pub language: String,
    /// Sequence number of the originating batch.
    pub batch_sequence: u64,
    /// Inherited from the batch.
    pub timestamp: DateTime<Utc>,
    /// Seconds of audio the text covers.
    pub duration: f64,
    /// Engine that produced the text.
    pub model: String,
}

impl TranscriptSegment {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Raw provider output before it is stamped with batch metadata.
#[derive(Clone, Debug, Default)]
pub struct ProviderOutput {
    pub text: String,
    pub spans: Option<Vec<TranscriptSpan>>,
    pub language: Option<String>,
}

impl ProviderOutput {
    /// Builds the downstream segment: trimmed text, provider spans or a
    /// single span covering the whole batch, declared language or "unknown".
    pub fn into_segment(self, batch: &AudioBatch, model: &str) -> TranscriptSegment {
        let text = self.text.trim().to_string();
        let spans = match self.spans {
            Some(spans) if !spans.is_empty() => spans,
            _ => vec![TranscriptSpan {
                text: text.clone(),
                start: 0.0,
                end: batch.duration,
            }],
        };
        TranscriptSegment {
            text,
            spans,
            language: self.language.unwrap_or_else(|| "unknown".to_string()),
            batch_sequence: batch.sequence,
            timestamp: batch.timestamp,
            duration: batch.duration,
            model: model.to_string(),
        }
    }
}

/// One speech-to-text backend. Request shape differences stay behind this
/// trait; the dispatcher only sees WAV in, text out.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(
        &self,
        wav: Vec<u8>,
        batch: &AudioBatch,
    ) -> Result<ProviderOutput, TranscriptionError>;
}
