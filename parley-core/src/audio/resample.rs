//! Sample-rate conversion with a rubato `FastFixedIn` resampler.
//!
//! Browsers record at 44.1 or 48 kHz; the speech model wants 16 kHz mono.
//! Uploaded clips are finite, so unlike a live stream the trailing partial
//! block is flushed with zero padding and the output trimmed to the exact
//! expected length.
//!
//! ```ignore
//! let mut rc = RateConverter::new(48_000, 16_000, 1024)?;
//! let mut out = rc.process(&clip);
//! out.extend(rc.flush());
//! ```

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, warn};

use super::AudioChunk;
use crate::error::{ParleyError, Result};

const DEFAULT_BLOCK: usize = 1024;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == target rate.
    resampler: Option<FastFixedIn<f32>>,
    /// Holds a partial input block between calls.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// `[1][output_frames_max]`
    output_buf: Vec<Vec<f32>>,
    ratio: f64,
    consumed: usize,
    produced: usize,
}

impl RateConverter {
    /// # Errors
    /// `AudioDecode` if either rate is zero or rubato fails to initialise.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(ParleyError::AudioDecode(format!(
                "invalid sample rate {source_rate} -> {target_rate}"
            )));
        }
        let ratio = target_rate as f64 / source_rate as f64;
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
                ratio,
                consumed: 0,
                produced: 0,
            });
        }

        let resampler =
            FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
                .map_err(|e| ParleyError::AudioDecode(format!("resampler init: {e}")))?;
        let output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];

        debug!(source_rate, target_rate, chunk_size, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf,
            ratio,
            consumed: 0,
            produced: 0,
        })
    }

    /// Feed samples; returns whatever full blocks produced (may be empty).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);
        self.consumed += samples.len();

        let mut result = Vec::new();
        while self.input_buf.len() >= self.chunk_size {
            let block = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[block], &mut self.output_buf, None) {
                Ok((_, produced)) => result.extend_from_slice(&self.output_buf[0][..produced]),
                Err(e) => warn!("resampler process error: {e}"),
            }
            self.input_buf.drain(..self.chunk_size);
        }
        self.produced += result.len();
        result
    }

    /// Drain the buffered remainder. The total output across `process` and
    /// `flush` is trimmed to `round(consumed * ratio)` samples.
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return Vec::new();
        };
        let expected_total = (self.consumed as f64 * self.ratio).round() as usize;
        let mut result = Vec::new();

        // Padding pushes the filter delay out along with the real tail.
        let mut pending = std::mem::take(&mut self.input_buf);
        let mut guard = 0;
        while self.produced + result.len() < expected_total && guard < 4 {
            pending.resize(self.chunk_size, 0.0);
            match resampler.process_into_buffer(&[&pending[..]], &mut self.output_buf, None) {
                Ok((_, produced)) => result.extend_from_slice(&self.output_buf[0][..produced]),
                Err(e) => {
                    warn!("resampler flush error: {e}");
                    break;
                }
            }
            pending.clear();
            guard += 1;
        }

        let room = expected_total.saturating_sub(self.produced);
        result.truncate(room);
        self.produced += result.len();
        result
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Resample a whole clip to `target_rate`, returning it unchanged when the
/// rates already match.
pub fn to_model_rate(chunk: AudioChunk, target_rate: u32) -> Result<AudioChunk> {
    if chunk.sample_rate == target_rate {
        return Ok(chunk);
    }
    let mut rc = RateConverter::new(chunk.sample_rate, target_rate, DEFAULT_BLOCK)?;
    let mut out = rc.process(&chunk.samples);
    out.extend(rc.flush());
    Ok(AudioChunk::new(out, target_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_identity() {
        let mut rc = RateConverter::new(16_000, 16_000, 960).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        assert_eq!(rc.process(&samples), samples);
        assert!(rc.flush().is_empty());
    }

    #[test]
    fn partial_block_waits_for_flush() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        assert!(rc.process(&[0.0f32; 500]).is_empty());
        let tail = rc.flush();
        assert!(!tail.is_empty());
        assert!(tail.len() <= 167, "tail len {}", tail.len());
    }

    #[test]
    fn whole_clip_has_expected_length() {
        let clip = AudioChunk::new(vec![0.1f32; 48_000 + 123], 48_000);
        let out = to_model_rate(clip, 16_000).unwrap();
        assert_eq!(out.sample_rate, 16_000);
        let expected = ((48_000 + 123) as f64 / 3.0).round() as usize;
        assert!(
            (out.samples.len() as isize - expected as isize).unsigned_abs() <= 2,
            "len={} expected≈{}",
            out.samples.len(),
            expected
        );
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            RateConverter::new(0, 16_000, 960),
            Err(ParleyError::AudioDecode(_))
        ));
    }

    #[test]
    fn matching_rate_is_untouched() {
        let clip = AudioChunk::new(vec![0.25; 10], 16_000);
        let out = to_model_rate(clip, 16_000).unwrap();
        assert_eq!(out.samples, vec![0.25; 10]);
    }
}
