//! MusicGen inference server client.
//!
//! Provides the HTTP API wrapper, retry-with-backoff for transient
//! failures, and a [`GenerationBackend`](cloudmusic_core::generation::GenerationBackend)
//! implementation the pipeline can drive.

pub mod api;
pub mod backend;
pub mod retry;

pub use api::{MusicGenApi, MusicGenApiError, ServerInfo};
pub use backend::MusicGenBackend;
pub use retry::RetryConfig;
