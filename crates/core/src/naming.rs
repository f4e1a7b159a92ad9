//! Artifact naming convention engine.
//!
//! Generates deterministic storage keys for generated tracks and for the
//! cost ledger. A track key is the sole idempotency source of truth: the
//! same [`Job`] always maps to the same key, across processes and restarts.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::hashing::fingerprint_fields;
use crate::job_spec::Job;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// File extension of every generated track.
pub const ARTIFACT_EXTENSION: &str = "wav";

/// Number of hex digits of the content fingerprint kept in a key.
pub const FINGERPRINT_LEN: usize = 16;

/// Longest slug kept from a job's base name.
pub const MAX_SLUG_LEN: usize = 64;

/// Slug used when a base name has no usable characters.
pub const FALLBACK_SLUG: &str = "untitled";

/// Key prefix under which ledgers are written.
pub const REPORT_PREFIX: &str = "reports";

/// Fixed ledger key overwritten by every run.
pub const LATEST_REPORT_KEY: &str = "reports/generation_report_latest.csv";

// ---------------------------------------------------------------------------
// ArtifactKey
// ---------------------------------------------------------------------------

/// Deterministic storage name of a job's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the artifact key for `job`.
///
/// Convention: `{slug}_{fingerprint}.wav`
///
/// - `slug` = [`slugify`] of the base name, for humans browsing the bucket
/// - `fingerprint` = first [`FINGERPRINT_LEN`] hex digits of SHA-256 over
///   (prompt, duration, base name), so two jobs sharing a base name but
///   differing in prompt or duration never collide
///
/// # Examples
///
/// ```
/// use cloudmusic_core::job_spec::Job;
/// use cloudmusic_core::naming::artifact_key;
///
/// let job = Job::new("calm piano melody", 40, "calm_piano").unwrap();
/// let key = artifact_key(&job);
/// assert!(key.as_str().starts_with("calm_piano_"));
/// assert!(key.as_str().ends_with(".wav"));
/// assert_eq!(key, artifact_key(&job));
/// ```
pub fn artifact_key(job: &Job) -> ArtifactKey {
    let duration = job.duration_secs().to_string();
    let digest = fingerprint_fields(&[job.prompt(), &duration, job.base_name()]);
    ArtifactKey(format!(
        "{}_{}.{ARTIFACT_EXTENSION}",
        slugify(job.base_name()),
        &digest[..FINGERPRINT_LEN]
    ))
}

/// Reduce `name` to a storage-safe slug.
///
/// ASCII letters are lowercased; `[a-z0-9_-]` are kept; every other
/// character (including non-ASCII) becomes `_`. The result is capped at
/// [`MAX_SLUG_LEN`] characters and falls back to [`FALLBACK_SLUG`] when
/// nothing usable remains.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SLUG_LEN)
        .collect();

    if slug.chars().all(|c| c == '_') {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

// ---------------------------------------------------------------------------
// Ledger keys
// ---------------------------------------------------------------------------

/// Timestamped ledger key for a run finishing at `at`.
pub fn timestamped_report_key(at: DateTime<Utc>) -> String {
    format!(
        "{REPORT_PREFIX}/generation_report_{}.csv",
        at.format("%Y%m%d_%H%M%S")
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(prompt: &str, secs: u32, name: &str) -> Job {
        Job::new(prompt, secs, name).unwrap()
    }

    #[test]
    fn key_is_deterministic() {
        let a = job("calm piano melody", 40, "calm_piano");
        let b = job("calm piano melody", 40, "calm_piano");
        assert_eq!(artifact_key(&a), artifact_key(&b));
        assert_eq!(artifact_key(&a), artifact_key(&a));
    }

    #[test]
    fn key_layout() {
        let key = artifact_key(&job("calm piano melody", 40, "calm_piano"));
        let s = key.as_str();
        assert!(s.starts_with("calm_piano_"));
        assert!(s.ends_with(".wav"));
        let fingerprint = &s["calm_piano_".len()..s.len() - ".wav".len()];
        assert_eq!(fingerprint.len(), FINGERPRINT_LEN);
        assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn same_name_different_prompt_differs() {
        let a = artifact_key(&job("calm piano melody", 40, "track"));
        let b = artifact_key(&job("angry metal riff", 40, "track"));
        assert_ne!(a, b);
    }

    #[test]
    fn same_name_different_duration_differs() {
        let a = artifact_key(&job("calm piano melody", 40, "track"));
        let b = artifact_key(&job("calm piano melody", 41, "track"));
        assert_ne!(a, b);
    }

    #[test]
    fn slug_replaces_unsafe_characters() {
        assert_eq!(slugify("Calm Piano/Take 2"), "calm_piano_take_2");
        assert_eq!(slugify("lo-fi_beats"), "lo-fi_beats");
        assert_eq!(slugify("café"), "caf_");
    }

    #[test]
    fn slug_falls_back_when_nothing_usable() {
        assert_eq!(slugify("///"), FALLBACK_SLUG);
        assert_eq!(slugify("日本"), FALLBACK_SLUG);
    }

    #[test]
    fn slug_is_capped() {
        let long = "a".repeat(200);
        assert_eq!(slugify(&long).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn unsafe_names_still_yield_distinct_keys() {
        // Both slug to "a_b" but differ in content.
        let a = artifact_key(&job("p", 10, "a/b"));
        let b = artifact_key(&job("p", 10, "a b"));
        assert_ne!(a, b);
    }

    #[test]
    fn timestamped_key_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 7, 14, 5, 9).unwrap();
        assert_eq!(
            timestamped_report_key(at),
            "reports/generation_report_20260307_140509.csv"
        );
    }

    #[test]
    fn latest_key_is_under_report_prefix() {
        assert!(LATEST_REPORT_KEY.starts_with(REPORT_PREFIX));
    }
}
