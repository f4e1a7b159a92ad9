//! Generation backend contract and chunk-planning helpers.
//!
//! A backend can only synthesize a bounded span per call. Longer tracks are
//! assembled by the pipeline crate from several calls, each seeded with the
//! tail of what has been produced so far.

use async_trait::async_trait;

use crate::audio::AudioSegment;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Longest span a MusicGen-class model produces in one call.
pub const DEFAULT_MAX_SPAN_SECS: f64 = 30.0;
/// Tail of already-generated audio handed back as continuation context.
pub const DEFAULT_OVERLAP_SECS: f64 = 5.0;
/// Multiple of the planned call count a job may use before it is declared
/// stalled. Covers backends that return less new audio than asked for.
pub const CHUNK_BUDGET_FACTOR: u32 = 2;
/// Calls allowed on top of the scaled plan, so short jobs get some leeway.
pub const CHUNK_BUDGET_SLACK: u32 = 4;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a job's audio could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("requested duration must be positive")]
    InvalidDuration,

    #[error("backend call failed: {0}")]
    Backend(String),

    #[error("backend returned no new audio for chunk {chunk_index}")]
    EmptyOutput { chunk_index: u32 },

    #[error("backend returned malformed audio: {0}")]
    Malformed(String),

    #[error("gave up after {calls} backend calls without reaching the requested duration")]
    Stalled { calls: u32 },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Something that turns a text prompt into audio.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Synthesize up to `span_secs` seconds of new audio for `prompt`.
    ///
    /// With `context`, the returned segment starts with a re-rendering of
    /// the context window followed by the new material, so it is roughly
    /// `context.duration_secs() + span_secs` long.
    async fn synthesize(
        &self,
        prompt: &str,
        span_secs: f64,
        context: Option<&AudioSegment>,
    ) -> Result<AudioSegment, GenerationError>;
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Number of backend calls needed to cover `target_secs` when every call
/// adds `max_span_secs` of new audio.
///
/// Always returns at least 1.
pub fn estimate_chunks(target_secs: f64, max_span_secs: f64) -> u32 {
    if max_span_secs <= 0.0 || target_secs <= 0.0 {
        return 1;
    }
    // `as` saturates, so absurd ratios land on u32::MAX rather than wrapping.
    ((target_secs / max_span_secs).ceil() as u32).max(1)
}

/// Most backend calls one job may take before it counts as stalled.
///
/// Scales with the plan so long jobs are never cut short by a fixed cap.
pub fn chunk_budget(target_secs: f64, max_span_secs: f64) -> u32 {
    estimate_chunks(target_secs, max_span_secs)
        .saturating_mul(CHUNK_BUDGET_FACTOR)
        .saturating_add(CHUNK_BUDGET_SLACK)
}
