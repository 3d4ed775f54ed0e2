use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, ValueEnum};

use livescribe_core::config::Config;
use livescribe_audio::TranscriptionEngine;

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum AudioInputMode {
    /// Raw s16le PCM piped to stdin by a capture tool.
    Stdin,
    /// No audio feed; Q&A and knowledge base only.
    None,
}

#[derive(Debug, Parser)]
#[command(name = "livescribe", about = "Real-time meeting transcription, insights and live Q&A")]
pub struct Cli {
    /// Interface for both servers
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// WebSocket port
    #[arg(long, default_value_t = 8765)]
    pub port: u16,

    /// HTTP port for the web interface
    #[arg(long, default_value_t = 8766)]
    pub http_port: u16,

    /// Where audio frames come from
    #[arg(long, value_enum, default_value = "stdin")]
    pub audio: AudioInputMode,

    /// Sample rate of the incoming PCM stream
    #[arg(long, default_value_t = 16_000)]
    pub sample_rate: u32,

    /// Primary transcription model
    #[arg(long, default_value = "gpt-4o-transcribe")]
    pub transcription_model: String,

    /// Ordered fallback transcription models
    #[arg(long, value_delimiter = ',', default_value = "whisper-1")]
    pub fallback_models: Vec<String>,

    /// Language hint for transcription; auto-detect when omitted
    #[arg(long)]
    pub language: Option<String>,

    /// LLM used for insights and Q&A
    #[arg(long, default_value = "gemini-2.0-flash")]
    pub llm_model: String,

    /// Seconds between automated insights
    #[arg(long, default_value_t = 60)]
    pub insight_interval: u64,

    /// Path to the env file holding API keys
    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,

    /// Directory for rotated log files
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,

    /// Log filter, e.g. info or livescribe_server=debug
    #[arg(long, env = "LIVESCRIBE_LOG", default_value = "info")]
    pub log_filter: String,
}

impl Cli {
    /// Folds the flag overrides into the default configuration and
    /// validates the result.
    pub fn to_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::default();
        config.server.host = self.host.clone();
        config.server.port = self.port;
        config.server.http_port = self.http_port;
        config.audio.sample_rate = self.sample_rate;
        config.segmenter.sample_rate = self.sample_rate;
        config.transcription.primary_model = self.transcription_model.clone();
        config.transcription.fallback_models = self.fallback_models.clone();
        config.transcription.language = self.language.clone();
        config.llm.model = self.llm_model.clone();
        config.llm.insight_interval = self.insight_interval;

        // Reject unknown engines before the pipeline tries to build them
        for model in std::iter::once(&config.transcription.primary_model)
            .chain(config.transcription.fallback_models.iter())
        {
            TranscriptionEngine::from_str(model).map_err(|e| anyhow::anyhow!(e))?;
        }

        config.validate()?;
        Ok(config)
    }
}
