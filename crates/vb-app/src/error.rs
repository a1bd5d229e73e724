use thiserror::Error;
use vb_core::JobId;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing configuration: {0} must be set")]
    MissingConfig(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidConfig { name: &'static str, value: String },

    #[error("Job {0} has no downloaded video")]
    NoResult(JobId),

    #[error("Nothing to generate: provide at least one non-empty prompt")]
    NothingToStart,

    #[error("Failed to save {0} completed video(s)")]
    SaveFailed(usize),
}
