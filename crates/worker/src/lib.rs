//! Batch generation worker.
//!
//! Reads a job file, produces every missing artifact through the chunked
//! generation engine, and publishes a cost ledger of what was produced.

pub mod config;
pub mod report;
pub mod runner;
pub mod scratch;

pub use config::{ConfigError, LogFormat, WorkerConfig};
pub use report::{Ledger, LedgerEntry, LedgerUploadError};
pub use runner::{BatchOutcome, BatchSummary, JobError, JobResult, JobRunner, JobStatus};
pub use scratch::{ScratchError, ScratchFile};
