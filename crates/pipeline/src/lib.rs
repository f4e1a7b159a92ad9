//! Long-form generation on top of a bounded-span backend.
//!
//! [`ChunkedGenerator`] stitches several backend calls into one track of an
//! exact requested length.

pub mod engine;

pub use engine::{ChunkedGenerator, ChunkingConfig, GeneratedTrack};
