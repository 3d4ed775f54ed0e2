//! Ordered-fallback transcription dispatch.
//!
//! Batches are processed one at a time in sequence order; every batch walks
//! the provider list `[primary] + fallbacks`, retrying transient failures
//! with exponential backoff before falling through. A batch that exhausts
//! every provider is dropped with a warning and the pipeline continues.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use livescribe_core::config::TranscriptionConfig;

use crate::frame::AudioBatch;
use crate::queue::BatchQueue;
use crate::wav;

use super::{
    GeminiAudioProvider, OpenAiProvider, TranscriptSegment, TranscriptionEngine,
    TranscriptionError, TranscriptionProvider,
};

/// Per-model request counters.
#[derive(Clone, Debug, Default)]
pub struct ModelStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_audio_duration: f64,
    pub total_processing_time: f64,
}

impl ModelStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }

    pub fn average_processing_time(&self) -> f64 {
        if self.successful_requests == 0 {
            return 0.0;
        }
        self.total_processing_time / self.successful_requests as f64
    }
}

pub struct Dispatcher {
    providers: Vec<Arc<dyn TranscriptionProvider>>,
    config: TranscriptionConfig,
    sample_rate: u32,
    stats: Mutex<HashMap<String, ModelStats>>,
}

impl Dispatcher {
    pub fn new(
        providers: Vec<Arc<dyn TranscriptionProvider>>,
        config: TranscriptionConfig,
        sample_rate: u32,
    ) -> Self {
        Self {
            providers,
            config,
            sample_rate,
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the provider chain `[primary] + fallbacks` from the configured
    /// model names.
    pub fn from_config(
        config: TranscriptionConfig,
        sample_rate: u32,
        openai_key: &str,
        gemini_key: &str,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        let mut providers: Vec<Arc<dyn TranscriptionProvider>> = Vec::new();
        let names =
            std::iter::once(config.primary_model.as_str()).chain(config.fallback_models.iter().map(String::as_str));
        for name in names {
            let engine = TranscriptionEngine::from_str(name).map_err(|e| anyhow!(e))?;
            let provider: Arc<dyn TranscriptionProvider> = match engine {
                TranscriptionEngine::GeminiAudio => Arc::new(GeminiAudioProvider::new(
                    client.clone(),
                    engine.api_model(),
                    gemini_key,
                    config.language.clone(),
                )),
                _ => Arc::new(OpenAiProvider::new(
                    client.clone(),
                    engine.api_model(),
                    openai_key,
                    config.language.clone(),
                )),
            };
            providers.push(provider);
        }
        Ok(Self::new(providers, config, sample_rate))
    }

    pub fn stats(&self) -> HashMap<String, ModelStats> {
        self.stats.lock().unwrap().clone()
    }

    /// Transcribes one batch through the provider chain. `None` means every
    /// provider exhausted its retries and the batch was dropped.
    pub async fn transcribe_batch(&self, batch: &AudioBatch) -> Option<TranscriptSegment> {
        let processed = wav::preprocess(&batch.samples);
        let wav_bytes = match wav::encode_wav(&processed, self.sample_rate) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("failed to encode batch {} as wav: {e:#}", batch.sequence);
                return None;
            }
        };

        for provider in &self.providers {
            match self.try_provider(provider.as_ref(), &wav_bytes, batch).await {
                Ok(output) => {
                    return Some(output.into_segment(batch, provider.name()));
                }
                Err(e) => {
                    warn!(
                        "transcription of batch {} failed with {}: {}",
                        batch.sequence,
                        provider.name(),
                        e
                    );
                }
            }
        }

        warn!(
            "dropping batch {} ({:.1}s): all transcription models failed",
            batch.sequence, batch.duration
        );
        None
    }

    async fn try_provider(
        &self,
        provider: &dyn TranscriptionProvider,
        wav_bytes: &[u8],
        batch: &AudioBatch,
    ) -> Result<super::ProviderOutput, TranscriptionError> {
        self.record_audio_duration(provider.name(), batch.duration);

        let mut last_error = TranscriptionError::Transient("no attempts made".into());
        for attempt in 1..=self.config.max_retries.max(1) {
            if attempt > 1 {
                let delay = self.config.retry_base_delay * 2f64.powi(attempt as i32 - 2);
                debug!(
                    "retrying batch {} with {} in {:.1}s (attempt {attempt})",
                    batch.sequence,
                    provider.name(),
                    delay
                );
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }

            let started = Instant::now();
            self.record_attempt(provider.name());
            match provider.transcribe(wav_bytes.to_vec(), batch).await {
                Ok(output) => {
                    self.record_success(provider.name(), started.elapsed());
                    return Ok(output);
                }
                Err(e) => {
                    self.record_failure(provider.name());
                    let transient = e.is_transient();
                    last_error = e;
                    if !transient {
                        // Fatal errors (bad key, malformed request) will not
                        // heal; move on to the next model immediately.
                        break;
                    }
                }
            }
        }
        Err(last_error)
    }

    /// Pulls batches off the queue, transcribes them in order and forwards
    /// segments downstream. Returns when cancelled (after draining the
    /// queue) or when the receiver goes away.
    pub async fn run(
        self: Arc<Self>,
        queue: Arc<BatchQueue>,
        tx: mpsc::Sender<TranscriptSegment>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut last_delivered: Option<u64> = None;
        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                batch = queue.pop() => batch,
            };
            if !self.process_one(batch, &tx, &mut last_delivered).await? {
                return Ok(());
            }
        }

        // Drain whatever is still queued before shutting down.
        while let Some(batch) = queue.try_pop() {
            if !self.process_one(batch, &tx, &mut last_delivered).await? {
                return Ok(());
            }
        }
        info!("transcription dispatcher stopped");
        Ok(())
    }

    /// Returns `Ok(false)` when the downstream receiver is gone.
    async fn process_one(
        &self,
        batch: AudioBatch,
        tx: &mpsc::Sender<TranscriptSegment>,
        last_delivered: &mut Option<u64>,
    ) -> Result<bool> {
        let Some(segment) = self.transcribe_batch(&batch).await else {
            return Ok(true);
        };

        // Dropped batches leave gaps, but delivery must stay strictly
        // increasing. A violation is a pipeline bug, not a provider problem.
        if let Some(last) = *last_delivered {
            if segment.batch_sequence <= last {
                error!(
                    "batch sequence regressed: delivered {} after {last}",
                    segment.batch_sequence
                );
                bail!("out-of-order transcript delivery");
            }
        }
        *last_delivered = Some(segment.batch_sequence);

        if tx.send(segment).await.is_err() {
            info!("transcript receiver closed, stopping dispatcher");
            return Ok(false);
        }
        Ok(true)
    }

    fn record_audio_duration(&self, model: &str, duration: f64) {
        let mut stats = self.stats.lock().unwrap();
        stats.entry(model.to_string()).or_default().total_audio_duration += duration;
    }

    fn record_attempt(&self, model: &str) {
        let mut stats = self.stats.lock().unwrap();
        stats.entry(model.to_string()).or_default().total_requests += 1;
    }

    fn record_success(&self, model: &str, elapsed: Duration) {
        let mut stats = self.stats.lock().unwrap();
        let entry = stats.entry(model.to_string()).or_default();
        entry.successful_requests += 1;
        entry.total_processing_time += elapsed.as_secs_f64();
    }

    fn record_failure(&self, model: &str) {
        let mut stats = self.stats.lock().unwrap();
        stats.entry(model.to_string()).or_default().failed_requests += 1;
    }
}
