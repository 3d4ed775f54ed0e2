use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One block of signed 16-bit PCM as delivered by the capture backend.
/// Immutable after construction.
#[derive(Clone, Debug)]
pub struct AudioFrame {
    samples: Vec<i16>,
    timestamp: DateTime<Utc>,
    sample_rate: u32,
    channels: u16,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, timestamp: DateTime<Utc>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            timestamp,
            sample_rate,
            channels,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Seconds of audio in this frame.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Collapses interleaved stereo to mono by channel averaging. Mono frames
    /// are returned unchanged.
    pub fn to_mono(&self) -> AudioFrame {
        if self.channels <= 1 {
            return self.clone();
        }
        let ch = self.channels as usize;
        let mono: Vec<i16> = self
            .samples
            .chunks_exact(ch)
            .map(|chunk| {
                let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                (sum / ch as i32) as i16
            })
            .collect();
        AudioFrame {
            samples: mono,
            timestamp: self.timestamp,
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }
}

/// A speech-bounded slice of the stream, sized for one transcription request.
#[derive(Clone, Debug)]
pub struct AudioBatch {
    /// Overlap samples from the previous batch followed by this batch's own.
    pub samples: Vec<i16>,
    /// Start of the pending buffer that produced this batch.
    pub timestamp: DateTime<Utc>,
    /// Seconds of audio excluding the replayed overlap; the overlap counts
    /// in `samples`/`size_bytes` only.
    pub duration: f64,
    /// Strictly increasing, gap-free per segmenter.
    pub sequence: u64,
    /// Set on a force-flushed final batch, which may be shorter than the
    /// configured minimum.
    pub is_final: bool,
}

impl AudioBatch {
    pub fn size_bytes(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }

    pub fn is_valid(&self) -> bool {
        !self.samples.is_empty() && self.duration > 0.0
    }
}

/// Abstract capture backend. Device discovery and platform plumbing live
/// behind implementations of this trait, outside this crate.
#[async_trait]
pub trait SampleSource: Send {
    async fn start(&mut self) -> anyhow::Result<()>;
    async fn stop(&mut self) -> anyhow::Result<()>;
    /// Next frame, or `None` when no data arrived within the source's
    /// internal timeout.
    async fn next_frame(&mut self) -> anyhow::Result<Option<AudioFrame>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::new(vec![0; 16_000], Utc::now(), 16_000, 1);
        assert!((frame.duration() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stereo_duration_counts_sample_pairs() {
        let frame = AudioFrame::new(vec![0; 32_000], Utc::now(), 16_000, 2);
        assert!((frame.duration() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let frame = AudioFrame::new(vec![100, 300, -50, 50], Utc::now(), 16_000, 2);
        let mono = frame.to_mono();
        assert_eq!(mono.samples(), &[200, 0]);
        assert_eq!(mono.channels(), 1);
    }

    #[test]
    fn test_to_mono_noop_for_mono() {
        let frame = AudioFrame::new(vec![1, 2, 3], Utc::now(), 16_000, 1);
        assert_eq!(frame.to_mono().samples(), frame.samples());
    }

    #[test]
    fn test_batch_size_bytes() {
        let batch = AudioBatch {
            samples: vec![0; 100],
            timestamp: Utc::now(),
            duration: 100.0 / 16_000.0,
            sequence: 0,
            is_final: false,
        };
        assert_eq!(batch.size_bytes(), 200);
        assert!(batch.is_valid());
    }
}
