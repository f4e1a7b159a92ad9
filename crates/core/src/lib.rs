//! Domain logic shared by every cloudmusic crate.
//!
//! Everything here is free of I/O: job-definition parsing, artifact
//! naming, cost estimation, PCM segment math, and the two collaborator
//! traits ([`storage::ArtifactStore`] and [`generation::GenerationBackend`])
//! that the worker drives.

pub mod audio;
pub mod cost;
pub mod error;
pub mod generation;
pub mod hashing;
pub mod job_spec;
pub mod naming;
pub mod storage;
