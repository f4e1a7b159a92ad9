//! REST API client for a MusicGen inference server.
//!
//! Wraps the server's HTTP endpoints (generation and health) using
//! [`reqwest`]. Audio travels as WAV in both directions: continuation
//! context is uploaded as a multipart file part and the generated audio
//! comes back as an `audio/wav` body.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use cloudmusic_core::audio::{AudioSegment, WAV_CONTENT_TYPE};

/// HTTP client for a single inference server.
pub struct MusicGenApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub status: String,
    /// Loaded checkpoint, e.g. `facebook/musicgen-medium`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    /// Longest span the model produces per call, in seconds.
    #[serde(default, rename = "max_duration")]
    pub max_duration_secs: Option<f64>,
}

/// Errors from the MusicGen REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum MusicGenApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("MusicGen API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body was not usable audio, or the context could not
    /// be encoded.
    #[error("audio payload error: {0}")]
    Audio(String),
}

impl MusicGenApiError {
    /// Whether retrying the same request might succeed.
    ///
    /// Transport failures, 5xx and 429 are transient; other 4xx and bad
    /// audio are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::ApiError { status, .. } => *status >= 500 || *status == 429,
            Self::Audio(_) => false,
        }
    }
}

impl MusicGenApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8000`.
    /// * `timeout` - Per-request timeout; generation calls are slow, so
    ///   this should comfortably exceed one full-span synthesis.
    pub fn new(api_url: String, timeout: Duration) -> Result<Self, MusicGenApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Synthesize audio.
    ///
    /// Sends a `POST /generate` multipart form with `prompt`, `duration`
    /// (seconds of new material) and, for continuation calls, a
    /// `continuation` WAV part the model is conditioned on.
    pub async fn generate(
        &self,
        prompt: &str,
        duration_secs: f64,
        continuation: Option<&AudioSegment>,
    ) -> Result<AudioSegment, MusicGenApiError> {
        let mut form = Form::new()
            .text("prompt", prompt.to_string())
            .text("duration", format!("{duration_secs:.3}"));

        if let Some(context) = continuation {
            let wav = context
                .encode_wav()
                .map_err(|e| MusicGenApiError::Audio(e.to_string()))?;
            let part = Part::bytes(wav)
                .file_name("continuation.wav")
                .mime_str(WAV_CONTENT_TYPE)?;
            form = form.part("continuation", part);
        }

        let response = self
            .client
            .post(format!("{}/generate", self.api_url))
            .multipart(form)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let body = response.bytes().await?;
        AudioSegment::decode_wav(&body).map_err(|e| MusicGenApiError::Audio(e.to_string()))
    }

    /// Query server status and model limits via `GET /health`.
    pub async fn health(&self) -> Result<ServerInfo, MusicGenApiError> {
        let response = self
            .client
            .get(format!("{}/health", self.api_url))
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| MusicGenApiError::ApiError {
            status: 200,
            body: format!("unparseable health response ({e}): {text}"),
        })
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`MusicGenApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, MusicGenApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(MusicGenApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16) -> MusicGenApiError {
        MusicGenApiError::ApiError {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(api_error(500).is_transient());
        assert!(api_error(503).is_transient());
        assert!(api_error(429).is_transient());
    }

    #[test]
    fn client_errors_and_bad_audio_are_permanent() {
        assert!(!api_error(400).is_transient());
        assert!(!api_error(422).is_transient());
        assert!(!MusicGenApiError::Audio("truncated".into()).is_transient());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = MusicGenApi::with_client(reqwest::Client::new(), "http://gpu:8000/".into());
        assert_eq!(api.api_url(), "http://gpu:8000");
    }

    #[test]
    fn health_payload_parses_with_optional_fields() {
        let full: ServerInfo = serde_json::from_str(
            r#"{"status":"ok","model":"facebook/musicgen-medium","sample_rate":32000,"max_duration":30}"#,
        )
        .unwrap();
        assert_eq!(full.sample_rate, Some(32000));
        assert_eq!(full.max_duration_secs, Some(30.0));

        let minimal: ServerInfo = serde_json::from_str(r#"{"status":"loading"}"#).unwrap();
        assert_eq!(minimal.status, "loading");
        assert!(minimal.model.is_none());
        assert!(minimal.max_duration_secs.is_none());
    }
}
