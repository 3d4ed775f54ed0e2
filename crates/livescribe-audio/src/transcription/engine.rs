use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum TranscriptionEngine {
    Whisper,
    #[default]
    Gpt4oTranscribe,
    Gpt4oMiniTranscribe,
    GeminiAudio,
}

impl TranscriptionEngine {
    /// Model identifier sent on the wire to the provider.
    pub fn api_model(&self) -> &'static str {
        match self {
            TranscriptionEngine::Whisper => "whisper-1",
            TranscriptionEngine::Gpt4oTranscribe => "gpt-4o-transcribe",
            TranscriptionEngine::Gpt4oMiniTranscribe => "gpt-4o-mini-transcribe",
            TranscriptionEngine::GeminiAudio => "gemini-2.0-flash",
        }
    }
}

impl std::str::FromStr for TranscriptionEngine {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whisper" | "whisper-1" => Ok(Self::Whisper),
            "gpt-4o-transcribe" => Ok(Self::Gpt4oTranscribe),
            "gpt-4o-mini-transcribe" => Ok(Self::Gpt4oMiniTranscribe),
            "gemini-audio" | "gemini-2.0-flash-transcribe" => Ok(Self::GeminiAudio),
            _ => Err(format!("unknown transcription engine: {s}")),
        }
    }
}

impl fmt::Display for TranscriptionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptionEngine::Whisper => write!(f, "whisper-1"),
            TranscriptionEngine::Gpt4oTranscribe => write!(f, "gpt-4o-transcribe"),
            TranscriptionEngine::Gpt4oMiniTranscribe => write!(f, "gpt-4o-mini-transcribe"),
            TranscriptionEngine::GeminiAudio => write!(f, "gemini-audio"),
        }
    }
}
