//! Voice-activity segmentation of the incoming frame stream.
//!
//! Frames accumulate in a pending buffer until either a sustained silence
//! closes the batch (once the minimum duration is reached) or the maximum
//! duration forces it shut. Each emitted batch replays the tail of its
//! predecessor so word boundaries survive the cut.

use chrono::{DateTime, Utc};
use tracing::debug;

use livescribe_core::config::SegmenterConfig;

use crate::frame::{AudioBatch, AudioFrame};

/// RMS-energy silence detection over int16 samples.
///
/// The silence interval is accounted in audio time: consecutive silent
/// frames accumulate their sample duration, any speech frame resets it.
pub struct SilenceDetector {
    energy_threshold: f64,
    sample_rate: u32,
    silence_ms: u64,
}

impl SilenceDetector {
    pub fn new(config: &SegmenterConfig) -> Self {
        Self {
            energy_threshold: config.energy_threshold,
            sample_rate: config.sample_rate,
            silence_ms: 0,
        }
    }

    /// Classifies one frame and updates the running silence interval.
    pub fn observe(&mut self, samples: &[i16]) -> bool {
        let energy = rms_energy(samples);
        if energy > self.energy_threshold {
            self.silence_ms = 0;
            false
        } else {
            self.silence_ms += samples.len() as u64 * 1000 / self.sample_rate as u64;
            true
        }
    }

    /// Milliseconds of uninterrupted silence ending at the last observed frame.
    pub fn silence_duration_ms(&self) -> u64 {
        self.silence_ms
    }

    pub fn reset(&mut self) {
        self.silence_ms = 0;
    }
}

/// RMS energy of a block of int16 samples.
pub fn rms_energy(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

#[derive(Clone, Debug, Default)]
pub struct SegmenterStats {
    pub batches_created: u64,
    pub total_audio_duration: f64,
}

impl SegmenterStats {
    pub fn average_batch_duration(&self) -> f64 {
        if self.batches_created == 0 {
            return 0.0;
        }
        self.total_audio_duration / self.batches_created as f64
    }
}

/// Turns the frame stream into speech-bounded [`AudioBatch`]es.
pub struct VadSegmenter {
    config: SegmenterConfig,
    detector: SilenceDetector,
    pending: Vec<i16>,
    batch_start: Option<DateTime<Utc>>,
    next_sequence: u64,
    /// Tail of the previously emitted batch, replayed at the head of the next.
    overlap_tail: Vec<i16>,
    stats: SegmenterStats,
}

impl VadSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        let detector = SilenceDetector::new(&config);
        Self {
            config,
            detector,
            pending: Vec::new(),
            batch_start: None,
            next_sequence: 0,
            overlap_tail: Vec::new(),
            stats: SegmenterStats::default(),
        }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn stats(&self) -> SegmenterStats {
        self.stats.clone()
    }

    pub fn pending_duration(&self) -> f64 {
        self.pending.len() as f64 / self.config.sample_rate as f64
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Consumes one mono frame; returns a batch when one closed.
    pub fn push_frame(&mut self, frame: &AudioFrame) -> Option<AudioBatch> {
        let frame = frame.to_mono();
        if self.batch_start.is_none() {
            self.batch_start = Some(frame.timestamp());
        }
        self.pending.extend_from_slice(frame.samples());

        let is_silence = self.detector.observe(frame.samples());
        let duration = self.pending_duration();

        let max_closed = duration >= self.config.max_batch_duration;
        let silence_closed = duration >= self.config.min_batch_duration
            && is_silence
            && self.detector.silence_duration_ms() >= self.config.silence_threshold_ms;

        if max_closed || silence_closed {
            let reason = if max_closed { "max-duration" } else { "silence" };
            debug!(
                "closing batch {} after {:.2}s ({})",
                self.next_sequence, duration, reason
            );
            return Some(self.emit(false));
        }
        None
    }

    /// Emits whatever is pending, regardless of duration. Used on shutdown
    /// and explicit flush requests; the batch is marked final.
    pub fn force_flush(&mut self) -> Option<AudioBatch> {
        if self.pending.is_empty() {
            return None;
        }
        debug!(
            "force-flushing batch {} after {:.2}s",
            self.next_sequence,
            self.pending_duration()
        );
        Some(self.emit(true))
    }

    fn emit(&mut self, is_final: bool) -> AudioBatch {
        let duration = self.pending_duration();
        let own = std::mem::take(&mut self.pending);

        let mut samples = Vec::with_capacity(self.overlap_tail.len() + own.len());
        samples.extend_from_slice(&self.overlap_tail);
        samples.extend_from_slice(&own);

        // The next batch replays the tail of the full emitted buffer.
        let overlap_samples = self.config.overlap_samples();
        self.overlap_tail = if samples.len() <= overlap_samples {
            samples.clone()
        } else {
            samples[samples.len() - overlap_samples..].to_vec()
        };

        let batch = AudioBatch {
            samples,
            timestamp: self.batch_start.take().unwrap_or_else(Utc::now),
            duration,
            sequence: self.next_sequence,
            is_final,
        };
        self.next_sequence += 1;
        self.detector.reset();
        self.stats.batches_created += 1;
        self.stats.total_audio_duration += duration;
        batch
    }
}
