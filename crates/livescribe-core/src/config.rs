use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Audio capture parameters. The capture backend itself is external; these
/// describe the PCM stream it is expected to deliver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            chunk_size: 1024,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.channels == 0 || self.channels > 2 {
            bail!("channels must be 1 or 2");
        }
        if self.chunk_size == 0 {
            bail!("chunk_size must be positive");
        }
        Ok(())
    }
}

/// Voice-activity segmenter parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmenterConfig {
    pub sample_rate: u32,
    /// Shortest batch the silence rule may close, seconds.
    pub min_batch_duration: f64,
    /// Hard cap; a batch is force-closed at this duration, seconds.
    pub max_batch_duration: f64,
    /// Continuous silence required to close a batch, milliseconds.
    pub silence_threshold_ms: u64,
    /// RMS energy over int16 samples at or below which a frame is silence.
    pub energy_threshold: f64,
    /// Tail of the previous batch replayed at the head of the next, seconds.
    pub overlap_duration: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            min_batch_duration: 3.0,
            max_batch_duration: 30.0,
            silence_threshold_ms: 500,
            energy_threshold: 1000.0,
            overlap_duration: 0.5,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.min_batch_duration <= 0.0 {
            bail!("min_batch_duration must be positive");
        }
        if self.max_batch_duration <= self.min_batch_duration {
            bail!("max_batch_duration must be greater than min_batch_duration");
        }
        if self.silence_threshold_ms == 0 {
            bail!("silence_threshold_ms must be positive");
        }
        if self.overlap_duration < 0.0 || self.overlap_duration >= self.min_batch_duration {
            bail!("overlap_duration must be in [0, min_batch_duration)");
        }
        Ok(())
    }

    pub fn overlap_samples(&self) -> usize {
        (self.overlap_duration * self.sample_rate as f64) as usize
    }
}

/// Speech-to-text dispatch parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Model tried first for every batch.
    pub primary_model: String,
    /// Tried in order after the primary exhausts its retries.
    pub fallback_models: Vec<String>,
    /// Language hint passed to providers; auto-detect when absent.
    pub language: Option<String>,
    /// Per-attempt request timeout, seconds.
    pub api_timeout: f64,
    pub max_retries: u32,
    /// Backoff base; attempt n waits base * 2^(n-1), seconds.
    pub retry_base_delay: f64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            primary_model: "gpt-4o-transcribe".to_string(),
            fallback_models: vec!["whisper-1".to_string()],
            language: None,
            api_timeout: 30.0,
            max_retries: 3,
            retry_base_delay: 1.0,
        }
    }
}

impl TranscriptionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.primary_model.is_empty() {
            bail!("primary_model must be set");
        }
        if self.api_timeout <= 0.0 {
            bail!("api_timeout must be positive");
        }
        if self.retry_base_delay <= 0.0 {
            bail!("retry_base_delay must be positive");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.api_timeout)
    }
}

/// LLM parameters shared by the insight generator and the Q&A handler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Cadence of automated insights, seconds.
    pub insight_interval: u64,
    /// Cadence of suggested-question regeneration, seconds.
    pub question_update_interval: u64,
    /// Cap on the Q&A chat history, in messages (user + assistant).
    pub max_conversation_length: usize,
    /// Default session focus applied until a client supplies an intent.
    pub focus_prompt: String,
    /// Prompts longer than this are logged, never truncated.
    pub context_soft_limit_chars: usize,
    pub api_timeout: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.3,
            max_tokens: 800,
            insight_interval: 60,
            question_update_interval: 15,
            max_conversation_length: 20,
            focus_prompt: String::new(),
            context_soft_limit_chars: 2_000_000,
            api_timeout: 30.0,
        }
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.temperature) {
            bail!("temperature must be between 0 and 1");
        }
        if self.insight_interval == 0 {
            bail!("insight_interval must be positive");
        }
        if self.question_update_interval == 0 {
            bail!("question_update_interval must be positive");
        }
        if self.max_conversation_length == 0 {
            bail!("max_conversation_length must be positive");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.api_timeout)
    }
}

/// WebSocket/HTTP server parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub http_port: u16,
    pub max_sessions: usize,
    /// Sessions older than this are evicted regardless of activity, seconds.
    pub session_timeout: u64,
    /// Cadence of the expiry sweep, seconds.
    pub session_sweep_interval: u64,
    /// Per-session outbound queue depth; a session that falls this far
    /// behind is dropped.
    pub outbound_queue_capacity: usize,
    /// Cap on the per-session Q&A pair history.
    pub max_qa_history: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8765,
            http_port: 8766,
            max_sessions: 10,
            session_timeout: 3600,
            session_sweep_interval: 300,
            outbound_queue_capacity: 256,
            max_qa_history: 50,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            bail!("max_sessions must be positive");
        }
        if self.outbound_queue_capacity == 0 {
            bail!("outbound_queue_capacity must be positive");
        }
        Ok(())
    }
}

/// Top-level configuration container.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.segmenter.validate()?;
        self.transcription.validate()?;
        self.llm.validate()?;
        self.server.validate()?;
        Ok(())
    }
}
