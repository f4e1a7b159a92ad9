use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use cloudmusic_cloud::open_store;
use cloudmusic_core::cost::CostAccountant;
use cloudmusic_core::job_spec::parse_job_spec;
use cloudmusic_musicgen::{MusicGenApi, MusicGenBackend, RetryConfig};
use cloudmusic_pipeline::ChunkedGenerator;
use cloudmusic_worker::{JobRunner, LogFormat, WorkerConfig};

const DEFAULT_LOG_FILTER: &str = "cloudmusic_worker=info,cloudmusic_pipeline=info,\
                                  cloudmusic_musicgen=info,cloudmusic_cloud=info";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();
    init_tracing(config.as_ref().map(|c| c.log_format).unwrap_or_default());
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Worker aborted");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();
}

async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(&config.prompts_file)
        .await
        .with_context(|| format!("cannot read job file {}", config.prompts_file.display()))?;
    let parsed = parse_job_spec(&text);
    for rejected in &parsed.rejected {
        tracing::warn!(
            line_number = rejected.line_number,
            line = %rejected.line,
            reason = %rejected.reason,
            "Skipping malformed job line",
        );
    }
    tracing::info!(
        file = %config.prompts_file.display(),
        jobs = parsed.jobs.len(),
        rejected = parsed.rejected.len(),
        "Loaded job file",
    );

    let store = open_store(&config.store).await;

    let api = MusicGenApi::new(config.backend_url.clone(), config.request_timeout)
        .context("cannot build HTTP client")?;
    match api.health().await {
        Ok(info) => {
            tracing::info!(
                url = %api.api_url(),
                status = %info.status,
                model = ?info.model,
                sample_rate = ?info.sample_rate,
                "MusicGen server reachable",
            );
            if let Some(limit) = info.max_duration_secs {
                if limit < config.chunking.max_span_secs() {
                    tracing::warn!(
                        server_max_secs = limit,
                        configured_max_secs = config.chunking.max_span_secs(),
                        "Configured span exceeds the server's limit",
                    );
                }
            }
        }
        Err(e) => tracing::warn!(
            url = %api.api_url(),
            error = %e,
            "MusicGen health check failed; continuing",
        ),
    }

    let backend = Arc::new(MusicGenBackend::new(api, RetryConfig::default()));
    let generator = ChunkedGenerator::new(backend, config.chunking);
    let runner = JobRunner::new(
        Arc::clone(&store),
        generator,
        CostAccountant::new(config.hourly_rate),
        config.scratch_dir.clone(),
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing up");
                cancel.cancel();
            }
        }
    });

    let outcome = runner.run(parsed.jobs, &cancel).await;
    outcome.summary.log();

    if let Err(e) = outcome
        .ledger
        .publish(store.as_ref(), chrono::Utc::now())
        .await
    {
        tracing::error!(error = %e, "Ledger was not fully published");
    }

    Ok(())
}
