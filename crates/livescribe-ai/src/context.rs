//! Append-only transcript log for the session.
//!
//! Every transcript segment lands here and stays for the life of the
//! session; prompts are assembled from the full history on every LLM call.

use std::sync::Arc;

use tokio::sync::RwLock;

use livescribe_audio::TranscriptSegment;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextStats {
    pub total_duration: f64,
    pub segment_count: usize,
    pub average_duration: f64,
    pub word_count: usize,
}

/// Shared transcript store. Appends serialise through the write lock;
/// readers get a consistent snapshot of a prefix of the log.
#[derive(Clone, Default)]
pub struct ContextStore {
    segments: Arc<RwLock<Vec<TranscriptSegment>>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, segment: TranscriptSegment) {
        self.segments.write().await.push(segment);
    }

    /// Consistent snapshot of every segment appended so far.
    pub async fn snapshot(&self) -> Vec<TranscriptSegment> {
        self.segments.read().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.segments.read().await.is_empty()
    }

    pub async fn stats(&self) -> ContextStats {
        let segments = self.segments.read().await;
        if segments.is_empty() {
            return ContextStats::default();
        }
        let total_duration: f64 = segments.iter().map(|s| s.duration).sum();
        let word_count = segments.iter().map(|s| s.word_count()).sum();
        ContextStats {
            total_duration,
            segment_count: segments.len(),
            average_duration: total_duration / segments.len() as f64,
            word_count,
        }
    }

    /// Full transcript rendered for prompt assembly, one `[HH:MM:SS] text`
    /// line per segment. Empty string when nothing has been transcribed.
    pub async fn transcript_text(&self) -> String {
        let segments = self.segments.read().await;
        segments
            .iter()
            .map(|s| format!("[{}] {}", s.timestamp.format("%H:%M:%S"), s.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Drops the whole history. Only an explicit session reset calls this.
    pub async fn clear(&self) {
        self.segments.write().await.clear();
    }
}
