//! Audio preprocessing and in-memory WAV encoding for provider requests.

use std::io::Cursor;

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};

/// Moving-average window applied by [`denoise`]. Kept short so speech
/// transients survive.
const DENOISE_WINDOW: usize = 5;

/// Scale samples down so the peak stays within full scale.
pub fn normalize(samples: &[i16]) -> Vec<i16> {
    if samples.is_empty() {
        return Vec::new();
    }
    let peak = samples
        .iter()
        .map(|&s| (s as i32).unsigned_abs())
        .max()
        .unwrap_or(0);
    if peak <= i16::MAX as u32 {
        return samples.to_vec();
    }
    let scale = i16::MAX as f64 / peak as f64;
    samples
        .iter()
        .map(|&s| (s as f64 * scale) as i16)
        .collect()
}

/// Short moving-average smoothing to knock down broadband noise.
/// Buffers shorter than the window pass through untouched.
pub fn denoise(samples: &[i16]) -> Vec<i16> {
    let window = DENOISE_WINDOW.min(samples.len() / 10);
    if window <= 1 {
        return samples.to_vec();
    }
    let half = window / 2;
    let n = samples.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + window - half).min(n);
            let sum: i64 = samples[lo..hi].iter().map(|&s| s as i64).sum();
            (sum / (hi - lo) as i64) as i16
        })
        .collect()
}

/// Encodes mono 16-bit PCM into an in-memory WAV container.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Full preprocessing chain applied before every provider request.
pub fn preprocess(samples: &[i16]) -> Vec<i16> {
    denoise(&normalize(samples))
}
