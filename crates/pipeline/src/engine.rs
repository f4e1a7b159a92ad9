//! Chunked generation loop.
//!
//! The first call produces up to `max_span` seconds from the prompt alone.
//! Every following call is seeded with the last `overlap` seconds of the
//! track so far; the backend answers with that window re-rendered plus new
//! material, and the two copies of the window are cross-faded. The loop ends
//! once the track covers the requested length and is then trimmed to the
//! exact frame count.
//!
//! There is no checkpoint inside the loop: if any call fails the whole job
//! fails and a later run starts it again from nothing.

use std::sync::Arc;

use cloudmusic_core::audio::AudioSegment;
use cloudmusic_core::error::CoreError;
use cloudmusic_core::generation::{
    chunk_budget, estimate_chunks, GenerationBackend, GenerationError, DEFAULT_MAX_SPAN_SECS,
    DEFAULT_OVERLAP_SECS,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Span limits of the backend being driven.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkingConfig {
    max_span_secs: f64,
    overlap_secs: f64,
}

impl ChunkingConfig {
    /// Requires `max_span_secs > 0` and `0 <= overlap_secs < max_span_secs`.
    pub fn new(max_span_secs: f64, overlap_secs: f64) -> Result<Self, CoreError> {
        if !(max_span_secs.is_finite() && max_span_secs > 0.0) {
            return Err(CoreError::Validation(format!(
                "max span must be positive, got {max_span_secs}"
            )));
        }
        if !(overlap_secs.is_finite() && overlap_secs >= 0.0 && overlap_secs < max_span_secs) {
            return Err(CoreError::Validation(format!(
                "overlap must be in [0, {max_span_secs}), got {overlap_secs}"
            )));
        }
        Ok(Self {
            max_span_secs,
            overlap_secs,
        })
    }

    pub fn max_span_secs(&self) -> f64 {
        self.max_span_secs
    }

    pub fn overlap_secs(&self) -> f64 {
        self.overlap_secs
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_span_secs: DEFAULT_MAX_SPAN_SECS,
            overlap_secs: DEFAULT_OVERLAP_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A finished track of exactly the requested length.
#[derive(Debug, Clone)]
pub struct GeneratedTrack {
    pub audio: AudioSegment,
    /// Backend calls it took.
    pub chunk_count: u32,
}

/// One backend answer, before it is merged into the track.
struct GenerationChunk {
    audio: AudioSegment,
    /// Context window the call was conditioned on, if any.
    continuation: Option<AudioSegment>,
}

impl GenerationChunk {
    fn context_frames(&self) -> usize {
        self.continuation.as_ref().map_or(0, AudioSegment::frames)
    }

    /// Seconds of material this chunk adds beyond its context.
    fn new_secs(&self) -> f64 {
        self.audio.frames().saturating_sub(self.context_frames()) as f64
            / self.audio.sample_rate() as f64
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives a [`GenerationBackend`] to produce tracks longer than one call.
#[derive(Clone)]
pub struct ChunkedGenerator {
    backend: Arc<dyn GenerationBackend>,
    config: ChunkingConfig,
}

impl ChunkedGenerator {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: ChunkingConfig) -> Self {
        Self { backend, config }
    }

    /// Produce exactly `duration_secs` seconds of audio for `prompt`.
    pub async fn generate(
        &self,
        prompt: &str,
        duration_secs: u32,
    ) -> Result<GeneratedTrack, GenerationError> {
        if duration_secs == 0 {
            return Err(GenerationError::InvalidDuration);
        }

        let target_secs = f64::from(duration_secs);
        let max_span = self.config.max_span_secs;
        let budget = chunk_budget(target_secs, max_span);
        tracing::debug!(
            duration_secs,
            max_span,
            planned_chunks = estimate_chunks(target_secs, max_span),
            budget,
            "Starting chunked generation",
        );

        let first = self
            .request_chunk(prompt, 0, target_secs.min(max_span), None)
            .await?;
        if first.audio.is_empty() {
            return Err(GenerationError::EmptyOutput { chunk_index: 0 });
        }

        let mut track = first.audio;
        let target_frames = track.frames_for_secs(target_secs);
        let overlap_frames = track.frames_for_secs(self.config.overlap_secs);
        let mut calls: u32 = 1;

        while track.frames() < target_frames {
            if calls >= budget {
                return Err(GenerationError::Stalled { calls });
            }

            let remaining_secs =
                (target_frames - track.frames()) as f64 / track.sample_rate() as f64;
            let span = remaining_secs.min(max_span);
            let context = (overlap_frames > 0).then(|| track.tail(overlap_frames));

            let chunk = self.request_chunk(prompt, calls, span, context).await?;
            if !track.same_format(&chunk.audio) {
                return Err(GenerationError::Malformed(format!(
                    "chunk {calls} is {} Hz/{}ch, track is {} Hz/{}ch",
                    chunk.audio.sample_rate(),
                    chunk.audio.channels(),
                    track.sample_rate(),
                    track.channels(),
                )));
            }
            if chunk.new_secs() <= 0.0 {
                return Err(GenerationError::EmptyOutput { chunk_index: calls });
            }

            track
                .append_crossfaded(&chunk.audio, chunk.context_frames())
                .map_err(|e| GenerationError::Malformed(e.to_string()))?;
            calls += 1;
        }

        track.truncate_frames(target_frames);
        tracing::debug!(
            chunks = calls,
            duration_secs = track.duration_secs(),
            "Chunked generation complete",
        );

        Ok(GeneratedTrack {
            audio: track,
            chunk_count: calls,
        })
    }

    async fn request_chunk(
        &self,
        prompt: &str,
        index: u32,
        span_secs: f64,
        continuation: Option<AudioSegment>,
    ) -> Result<GenerationChunk, GenerationError> {
        tracing::debug!(
            chunk_index = index,
            span_secs,
            context_secs = continuation.as_ref().map_or(0.0, AudioSegment::duration_secs),
            "Requesting chunk",
        );

        let audio = self
            .backend
            .synthesize(prompt, span_secs, continuation.as_ref())
            .await?;

        let chunk = GenerationChunk {
            audio,
            continuation,
        };
        tracing::trace!(chunk_index = index, new_secs = chunk.new_secs(), "Chunk received");
        Ok(chunk)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
