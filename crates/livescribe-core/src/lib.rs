pub mod config;
pub mod keys;

pub use config::{
    AudioConfig, Config, LlmConfig, SegmenterConfig, ServerConfig, TranscriptionConfig,
};
pub use keys::{mask_api_key, ApiKeyError, ApiKeyStore};
