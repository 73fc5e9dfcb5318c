//! Uploaded audio handling.
//!
//! The browser recorder posts a WAV clip per utterance. It is decoded with
//! `hound`, down-mixed to mono and resampled to the model rate before
//! transcription:
//!
//! ```text
//! WAV bytes → decode_wav → AudioChunk (native rate) → to_model_rate → AudioChunk (16 kHz)
//! ```

pub mod chunk;
pub mod resample;

use std::io::Cursor;

use hound::{SampleFormat, WavReader};
use tracing::debug;

pub use chunk::AudioChunk;
pub use resample::{to_model_rate, RateConverter};

use crate::error::{ParleyError, Result};

/// Decode a RIFF/WAV byte buffer into a mono f32 clip.
///
/// Integer PCM of any bit depth and 32-bit float are accepted; multichannel
/// audio is averaged down to one channel.
///
/// # Errors
/// `AudioDecode` if the header is invalid or the sample data is truncated.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioChunk> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| ParleyError::AudioDecode(format!("wav header: {e}")))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ParleyError::AudioDecode(format!("wav samples: {e}")))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| ParleyError::AudioDecode(format!("wav samples: {e}")))?
        }
    };

    let samples: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    debug!(
        sample_rate = spec.sample_rate,
        channels,
        frames = samples.len(),
        "decoded wav clip"
    );
    Ok(AudioChunk::new(samples, spec.sample_rate))
}

/// Encode a mono clip as 16-bit PCM WAV.
pub fn encode_wav_pcm16(chunk: &AudioChunk) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: chunk.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| ParleyError::AudioDecode(format!("wav writer: {e}")))?;
        for s in &chunk.samples {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(v)
                .map_err(|e| ParleyError::AudioDecode(format!("wav write: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| ParleyError::AudioDecode(format!("wav finalize: {e}")))?;
    }
    Ok(cursor.into_inner())
}
