//! In-memory PCM audio segments.
//!
//! Samples are `f32` in `-1.0..=1.0`, interleaved by channel
//! (`[L, R, L, R, ...]` for stereo). A *frame* is one sample per channel.
//! WAV encoding and decoding go through [`hound`].

use std::f32::consts::FRAC_PI_2;
use std::io::Cursor;

use crate::error::CoreError;

/// Bit depth of WAV files written by [`AudioSegment::encode_wav`].
pub const WAV_BITS_PER_SAMPLE: u16 = 16;

/// MIME type for encoded segments.
pub const WAV_CONTENT_TYPE: &str = "audio/wav";

/// A contiguous piece of PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioSegment {
    /// Wrap interleaved samples.
    ///
    /// Fails when the rate or channel count is zero, or when the sample
    /// count is not a whole number of frames.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self, CoreError> {
        if sample_rate == 0 {
            return Err(CoreError::Audio("sample rate must be non-zero".into()));
        }
        if channels == 0 {
            return Err(CoreError::Audio("channel count must be non-zero".into()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(CoreError::Audio(format!(
                "{} samples is not a whole number of {channels}-channel frames",
                samples.len()
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Whole frames in `secs` seconds at this segment's rate, rounded.
    pub fn frames_for_secs(&self, secs: f64) -> usize {
        (secs.max(0.0) * self.sample_rate as f64).round() as usize
    }

    /// Whether `other` can be joined onto `self` without conversion.
    pub fn same_format(&self, other: &AudioSegment) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }

    /// Copy of the last `frames` frames (or the whole segment if shorter).
    pub fn tail(&self, frames: usize) -> AudioSegment {
        let frames = frames.min(self.frames());
        let start = (self.frames() - frames) * self.channels as usize;
        Self {
            samples: self.samples[start..].to_vec(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Drop everything after the first `frames` frames.
    pub fn truncate_frames(&mut self, frames: usize) {
        self.samples.truncate(frames * self.channels as usize);
    }

    /// Join `next` onto the end of `self`, blending the seam.
    ///
    /// The last `overlap_frames` of `self` are equal-power cross-faded with
    /// the first `overlap_frames` of `next`; the rest of `next` is appended
    /// as-is. The result is `self.frames() + next.frames() - overlap` long,
    /// where `overlap` is `overlap_frames` clamped to both lengths.
    pub fn append_crossfaded(
        &mut self,
        next: &AudioSegment,
        overlap_frames: usize,
    ) -> Result<(), CoreError> {
        if !self.same_format(next) {
            return Err(CoreError::Audio(format!(
                "cannot join {} Hz/{}ch onto {} Hz/{}ch",
                next.sample_rate, next.channels, self.sample_rate, self.channels
            )));
        }

        let channels = self.channels as usize;
        let overlap = overlap_frames.min(self.frames()).min(next.frames());
        let seam_start = (self.frames() - overlap) * channels;

        for frame in 0..overlap {
            // Sample the curve at frame centres so neither end is silent.
            let t = (frame as f32 + 0.5) / overlap as f32;
            let fade_out = (t * FRAC_PI_2).cos();
            let fade_in = (t * FRAC_PI_2).sin();
            for ch in 0..channels {
                let i = frame * channels + ch;
                let out = &mut self.samples[seam_start + i];
                *out = (*out * fade_out + next.samples[i] * fade_in).clamp(-1.0, 1.0);
            }
        }

        self.samples
            .extend_from_slice(&next.samples[overlap * channels..]);
        Ok(())
    }

    // ---- WAV ----

    /// Encode as a 16-bit PCM WAV file.
    pub fn encode_wav(&self) -> Result<Vec<u8>, CoreError> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: WAV_BITS_PER_SAMPLE,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
            for &sample in &self.samples {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                writer.write_sample(value).map_err(wav_error)?;
            }
            writer.finalize().map_err(wav_error)?;
        }
        Ok(cursor.into_inner())
    }

    /// Decode a WAV file (integer PCM of any depth, or 32-bit float).
    pub fn decode_wav(bytes: &[u8]) -> Result<Self, CoreError> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(wav_error)?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(wav_error)?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(wav_error)?
            }
        };

        Self::new(samples, spec.sample_rate, spec.channels)
    }
}

fn wav_error(e: hound::Error) -> CoreError {
    CoreError::Audio(e.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
