//! Per-job pipeline and batch loop.
//!
//! Every job walks the same path:
//!
//! ```text
//! Pending -> CheckExisting -> Skipped
//!                          -> Generating -> Uploading -> Recorded
//!            (any of CheckExisting, Generating, Uploading) -> Failed
//! ```
//!
//! Jobs run strictly one after another. A failed job is logged and left for
//! a later run; it never stops the batch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use cloudmusic_core::audio::WAV_CONTENT_TYPE;
use cloudmusic_core::cost::{CostAccountant, Measured};
use cloudmusic_core::generation::GenerationError;
use cloudmusic_core::job_spec::Job;
use cloudmusic_core::naming::{artifact_key, ArtifactKey};
use cloudmusic_core::storage::{ArtifactStore, StoreError};
use cloudmusic_pipeline::ChunkedGenerator;

use crate::report::Ledger;
use crate::scratch::{ScratchError, ScratchFile};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Terminal state of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Artifact produced and stored this run.
    Succeeded,
    /// Artifact was already in the store.
    Skipped,
    /// Nothing stored; the job is retried by the next run.
    Failed { reason: String },
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Skipped => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Outcome of one job. Created once when the job reaches a terminal state.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Position in the batch, starting at 0.
    pub index: usize,
    pub job: Job,
    pub artifact_key: ArtifactKey,
    /// Wall-clock time spent generating; zero for skipped jobs.
    pub generation_time: Duration,
    pub cost_usd: f64,
    /// Backend calls the track took; zero unless succeeded.
    pub chunk_count: u32,
    pub status: JobStatus,
}

/// Why a job failed.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("existence check failed: {0}")]
    ExistenceCheck(#[source] StoreError),

    #[error("generation failed: {source}")]
    Generation {
        #[source]
        source: GenerationError,
        measured: Measured,
    },

    #[error("audio encoding failed: {reason}")]
    Encode { reason: String, measured: Measured },

    #[error("scratch write failed: {source}")]
    Scratch {
        #[source]
        source: ScratchError,
        measured: Measured,
    },

    #[error("upload failed: {source}")]
    Upload {
        #[source]
        source: StoreError,
        measured: Measured,
    },
}

impl JobError {
    /// Generation time and cost spent before the failure, if any.
    pub fn measured(&self) -> Option<Measured> {
        match self {
            Self::ExistenceCheck(_) => None,
            Self::Generation { measured, .. }
            | Self::Encode { measured, .. }
            | Self::Scratch { measured, .. }
            | Self::Upload { measured, .. } => Some(*measured),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch summary
// ---------------------------------------------------------------------------

/// Counts and costs for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Estimated cost of jobs that produced an artifact.
    pub succeeded_cost_usd: f64,
    /// Estimated cost burnt on attempts that failed.
    pub failed_cost_usd: f64,
    /// The run was cancelled before every job reached a terminal state.
    pub interrupted: bool,
}

impl BatchSummary {
    fn record(&mut self, result: &JobResult) {
        match result.status {
            JobStatus::Succeeded => {
                self.succeeded += 1;
                self.succeeded_cost_usd += result.cost_usd;
            }
            JobStatus::Skipped => self.skipped += 1,
            JobStatus::Failed { .. } => {
                self.failed += 1;
                self.failed_cost_usd += result.cost_usd;
            }
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    pub fn log(&self) {
        tracing::info!(
            succeeded = self.succeeded,
            skipped = self.skipped,
            failed = self.failed,
            succeeded_cost_usd = %format!("{:.6}", self.succeeded_cost_usd),
            failed_cost_usd = %format!("{:.6}", self.failed_cost_usd),
            interrupted = self.interrupted,
            "Batch finished",
        );
    }
}

/// Everything a batch run produced.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Results in processing order, one per job that reached a terminal
    /// state.
    pub results: Vec<JobResult>,
    pub ledger: Ledger,
    pub summary: BatchSummary,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Drives jobs through the existence check, generation, and upload.
pub struct JobRunner {
    store: Arc<dyn ArtifactStore>,
    generator: ChunkedGenerator,
    accountant: CostAccountant,
    scratch_dir: PathBuf,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        generator: ChunkedGenerator,
        accountant: CostAccountant,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            generator,
            accountant,
            scratch_dir,
        }
    }

    /// Process `jobs` in order until done or `cancel` fires.
    ///
    /// On cancellation the in-flight job is abandoned (its scratch file is
    /// removed) and no further jobs start; results recorded so far are
    /// kept.
    pub async fn run(&self, jobs: Vec<Job>, cancel: &CancellationToken) -> BatchOutcome {
        let total = jobs.len();
        tracing::info!(
            jobs = total,
            store = %self.store.describe(),
            hourly_rate = self.accountant.rate().usd_per_hour(),
            "Starting batch",
        );

        let mut results = Vec::with_capacity(total);
        let mut ledger = Ledger::new();
        let mut summary = BatchSummary::default();

        for (index, job) in jobs.into_iter().enumerate() {
            if cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            let key = artifact_key(&job);
            let span = tracing::info_span!(
                "job",
                job_index = index,
                artifact_key = %key,
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(
                        job_index = index,
                        artifact_key = %key,
                        "Cancelled while job was in flight",
                    );
                    summary.interrupted = true;
                    break;
                }
                result = self.process(index, job, key.clone()).instrument(span) => result,
            };

            if result.status == JobStatus::Succeeded {
                if let Err(e) = ledger.record(&result) {
                    tracing::error!(error = %e, "Ledger refused result");
                }
            }
            summary.record(&result);
            results.push(result);
        }

        if summary.interrupted {
            tracing::warn!(
                processed = summary.processed(),
                remaining = total - summary.processed(),
                "Batch interrupted; remaining jobs will run next time",
            );
        }

        BatchOutcome {
            results,
            ledger,
            summary,
        }
    }

    /// Run one job to a terminal state. Never fails: errors become a
    /// [`JobStatus::Failed`] result.
    pub async fn process(&self, index: usize, job: Job, key: ArtifactKey) -> JobResult {
        tracing::debug!(
            prompt = %job.prompt(),
            duration_secs = job.duration_secs(),
            "Pending",
        );

        match self.run_job(index, &job, &key).await {
            Ok(result) => result,
            Err(e) => {
                let measured = e.measured();
                tracing::error!(
                    prompt = %job.prompt(),
                    duration_secs = job.duration_secs(),
                    error = %e,
                    "Job failed",
                );
                JobResult {
                    index,
                    job,
                    artifact_key: key,
                    generation_time: measured.map_or(Duration::ZERO, |m| m.elapsed),
                    cost_usd: measured.map_or(0.0, |m| m.cost_usd),
                    chunk_count: 0,
                    status: JobStatus::Failed {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }

    async fn run_job(
        &self,
        index: usize,
        job: &Job,
        key: &ArtifactKey,
    ) -> Result<JobResult, JobError> {
        tracing::debug!("CheckExisting");
        if self
            .store
            .exists(key.as_str())
            .await
            .map_err(JobError::ExistenceCheck)?
        {
            tracing::info!("Artifact already stored, skipping");
            return Ok(JobResult {
                index,
                job: job.clone(),
                artifact_key: key.clone(),
                generation_time: Duration::ZERO,
                cost_usd: 0.0,
                chunk_count: 0,
                status: JobStatus::Skipped,
            });
        }

        tracing::debug!("Generating");
        let (generated, measured) = self
            .accountant
            .measure(self.generator.generate(job.prompt(), job.duration_secs()))
            .await;
        let track = generated.map_err(|source| JobError::Generation { source, measured })?;

        let wav = track.audio.encode_wav().map_err(|e| JobError::Encode {
            reason: e.to_string(),
            measured,
        })?;
        let scratch = ScratchFile::write(&self.scratch_dir, key.as_str(), &wav)
            .await
            .map_err(|source| JobError::Scratch { source, measured })?;

        tracing::debug!(
            path = %scratch.path().display(),
            bytes = wav.len(),
            "Uploading",
        );
        self.store
            .put_file(key.as_str(), scratch.path(), WAV_CONTENT_TYPE)
            .await
            .map_err(|source| JobError::Upload { source, measured })?;
        drop(scratch);

        tracing::info!(
            chunks = track.chunk_count,
            generation_time_secs = %format!("{:.2}", measured.elapsed.as_secs_f64()),
            cost_usd = %format!("{:.6}", measured.cost_usd),
            "Recorded",
        );
        Ok(JobResult {
            index,
            job: job.clone(),
            artifact_key: key.clone(),
            generation_time: measured.elapsed,
            cost_usd: measured.cost_usd,
            chunk_count: track.chunk_count,
            status: JobStatus::Succeeded,
        })
    }
}
