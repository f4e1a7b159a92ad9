//! [`GenerationBackend`] over the MusicGen HTTP API.

use async_trait::async_trait;

use cloudmusic_core::audio::AudioSegment;
use cloudmusic_core::generation::{GenerationBackend, GenerationError};

use crate::api::{MusicGenApi, MusicGenApiError};
use crate::retry::{with_retry, RetryConfig};

/// Remote MusicGen model reached over HTTP, with retries.
pub struct MusicGenBackend {
    api: MusicGenApi,
    retry: RetryConfig,
}

impl MusicGenBackend {
    pub fn new(api: MusicGenApi, retry: RetryConfig) -> Self {
        Self { api, retry }
    }
}

impl From<MusicGenApiError> for GenerationError {
    fn from(e: MusicGenApiError) -> Self {
        match e {
            MusicGenApiError::Audio(msg) => GenerationError::Malformed(msg),
            other => GenerationError::Backend(other.to_string()),
        }
    }
}

#[async_trait]
impl GenerationBackend for MusicGenBackend {
    async fn synthesize(
        &self,
        prompt: &str,
        span_secs: f64,
        context: Option<&AudioSegment>,
    ) -> Result<AudioSegment, GenerationError> {
        let audio = with_retry(&self.retry, "generate", || {
            self.api.generate(prompt, span_secs, context)
        })
        .await?;

        tracing::debug!(
            span_secs,
            returned_secs = audio.duration_secs(),
            sample_rate = audio.sample_rate(),
            "MusicGen call complete",
        );
        Ok(audio)
    }
}
