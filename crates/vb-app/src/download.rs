//! Saving completed jobs to disk.

use std::path::{Path, PathBuf};
use anyhow::Context;
use vb_core::{Job, JobStatus};
use crate::error::AppError;

const MAX_STEM_CHARS: usize = 30;
const EXTENSION: &str = "mp4";

/// File stem derived from a prompt: ASCII alphanumerics kept, everything else
/// replaced by `_`, cut to 30 characters.
pub fn file_stem(prompt: &str) -> String {
    let stem: String = prompt
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_STEM_CHARS)
        .collect();

    if stem.is_empty() { "video".to_string() } else { stem }
}

/// Writes the job's video into `dir` and returns the path. Never overwrites:
/// a numeric suffix is added when the name is taken.
pub async fn save_job(job: &Job, dir: &Path) -> anyhow::Result<PathBuf> {
    let video = job.result.as_ref().ok_or(AppError::NoResult(job.id))?;

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let path = free_path(dir, &file_stem(&job.prompt)).await?;
    tokio::fs::write(&path, video.blob.bytes())
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!(job_id = %job.id, path = %path.display(), bytes = video.blob.len(), "Saved video");
    Ok(path)
}

/// Outcome of [`save_completed`].
#[derive(Debug, Default)]
pub struct SaveReport {
    pub saved: Vec<PathBuf>,
    pub failed: usize,
}

/// Saves every completed job in `jobs`. A failed write is logged and counted;
/// the remaining jobs are still saved.
pub async fn save_completed(jobs: &[Job], dir: &Path) -> SaveReport {
    let mut report = SaveReport::default();
    for job in jobs.iter().filter(|job| job.status == JobStatus::Completed) {
        match save_job(job, dir).await {
            Ok(path) => report.saved.push(path),
            Err(e) => {
                report.failed += 1;
                tracing::error!(job_id = %job.id, prompt = %job.prompt, error = %format!("{e:#}"), "Failed to save video");
            }
        }
    }
    report
}

async fn free_path(dir: &Path, stem: &str) -> anyhow::Result<PathBuf> {
    let mut path = dir.join(format!("{stem}.{EXTENSION}"));
    let mut n = 1;
    while tokio::fs::try_exists(&path).await? {
        n += 1;
        path = dir.join(format!("{stem}_{n}.{EXTENSION}"));
    }
    Ok(path)
}
