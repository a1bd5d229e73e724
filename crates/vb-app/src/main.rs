use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use vb_app::config::AppConfig;
use vb_app::download;
use vb_app::error::AppError;
use vb_app::events::BatchEvent;
use vb_app::Orchestrator;
use vb_client::{GeminiApi, GenerationClient};
use vb_core::{BlobStore, JobStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    let prompt_block = config.read_prompt_block().await?;

    let store = BlobStore::new();
    let client = GenerationClient::new(GeminiApi::new(config.client.clone()), store.clone())
        .with_poll_interval(config.poll_interval);
    let orchestrator = Orchestrator::new(Arc::new(client), store)
        .with_progress_interval(config.progress_interval);

    orchestrator.configure(prompt_block, config.api_key.clone());
    if !orchestrator.can_start() {
        return Err(AppError::NothingToStart.into());
    }

    let mut events = orchestrator.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(BatchEvent::Started { run, jobs }) => {
                    tracing::info!(run, jobs = jobs.len(), "Batch started");
                }
                Ok(BatchEvent::JobUpdated { job, .. }) => {
                    tracing::info!(job_id = %job.id, status = %job.status, prompt = %job.prompt, "{}", job.progress_message);
                }
                Ok(BatchEvent::Finished { run }) => {
                    tracing::info!(run, "Batch finished");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event reporter fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let stopper = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current poll");
            stopper.stop();
        }
    });

    orchestrator.start().await;

    let jobs = orchestrator.jobs();
    let report = download::save_completed(&jobs, &config.output_dir).await;
    let mut failed = 0;
    for job in jobs.iter().filter(|job| job.status == JobStatus::Failed) {
        failed += 1;
        tracing::error!(
            job_id = %job.id,
            prompt = %job.prompt,
            error = job.error.as_deref().unwrap_or_default(),
            "Job failed",
        );
    }
    orchestrator.release_results();
    reporter.abort();

    tracing::info!(
        saved = report.saved.len(),
        save_failed = report.failed,
        failed,
        output_dir = %config.output_dir.display(),
        "Done",
    );

    if report.failed > 0 {
        return Err(AppError::SaveFailed(report.failed).into());
    }

    Ok(())
}
