//! End-of-run cost ledger.
//!
//! Only freshly produced artifacts appear in the ledger, in the order they
//! were recorded. The ledger is published twice: under a timestamped key
//! and under a fixed "latest" key that is overwritten every run.

use chrono::{DateTime, Utc};

use cloudmusic_core::naming::{timestamped_report_key, LATEST_REPORT_KEY};
use cloudmusic_core::storage::{ArtifactStore, StoreError};

use crate::runner::{JobResult, JobStatus};

/// First line of every ledger.
pub const LEDGER_HEADER: &str =
    "artifact_name,prompt,requested_duration_s,generation_time_s,estimated_cost_usd";

pub const CSV_CONTENT_TYPE: &str = "text/csv";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A non-succeeded result was offered to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("only succeeded jobs are recorded; '{artifact_key}' is {status}")]
pub struct NotRecordable {
    pub artifact_key: String,
    pub status: &'static str,
}

/// One or both ledger copies could not be written.
#[derive(Debug, thiserror::Error)]
#[error("ledger upload failed: {}", summarize(.failures))]
pub struct LedgerUploadError {
    /// `(key, error)` for every copy that failed.
    pub failures: Vec<(String, StoreError)>,
}

fn summarize(failures: &[(String, StoreError)]) -> String {
    failures
        .iter()
        .map(|(key, e)| format!("{key} ({e})"))
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// One CSV row.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub artifact_name: String,
    pub prompt: String,
    pub requested_duration_secs: u32,
    pub generation_time_secs: f64,
    pub cost_usd: f64,
}

impl LedgerEntry {
    fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{:.2},{:.6}\n",
            csv_field(&self.artifact_name),
            csv_field(&self.prompt),
            self.requested_duration_secs,
            self.generation_time_secs,
            self.cost_usd,
        )
    }
}

/// Ordered record of the jobs that produced an artifact this run.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a succeeded result. Skipped and failed results are refused.
    pub fn record(&mut self, result: &JobResult) -> Result<(), NotRecordable> {
        if result.status != JobStatus::Succeeded {
            return Err(NotRecordable {
                artifact_key: result.artifact_key.to_string(),
                status: result.status.label(),
            });
        }
        self.entries.push(LedgerEntry {
            artifact_name: result.artifact_key.to_string(),
            prompt: result.job.prompt().to_string(),
            requested_duration_secs: result.job.duration_secs(),
            generation_time_secs: result.generation_time.as_secs_f64(),
            cost_usd: result.cost_usd,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.entries.iter().map(|e| e.cost_usd).sum()
    }

    /// Render as CSV. An empty ledger is just the header line.
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(LEDGER_HEADER.len() + 1 + self.entries.len() * 96);
        out.push_str(LEDGER_HEADER);
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&entry.to_csv_line());
        }
        out
    }

    /// Upload the ledger under the timestamped key for `finished_at` and
    /// under [`LATEST_REPORT_KEY`].
    ///
    /// Both writes are attempted even when the first fails. Returns the
    /// keys written.
    pub async fn publish(
        &self,
        store: &dyn ArtifactStore,
        finished_at: DateTime<Utc>,
    ) -> Result<Vec<String>, LedgerUploadError> {
        let csv = self.to_csv().into_bytes();
        let keys = [
            timestamped_report_key(finished_at),
            LATEST_REPORT_KEY.to_string(),
        ];

        let mut written = Vec::with_capacity(keys.len());
        let mut failures = Vec::new();
        for key in keys {
            match store.put(&key, csv.clone(), CSV_CONTENT_TYPE).await {
                Ok(()) => {
                    tracing::info!(
                        location = %store.describe(),
                        key = %key,
                        rows = self.entries.len(),
                        "Published ledger",
                    );
                    written.push(key);
                }
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Ledger upload failed");
                    failures.push((key, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(written)
        } else {
            Err(LedgerUploadError { failures })
        }
    }
}

/// Quote a CSV field when it contains a delimiter, quote, or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
