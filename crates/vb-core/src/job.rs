use std::fmt;
use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::media::{GeneratedVideo, ObjectUrl};
use crate::progress;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Generating,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Whether a job in this status may move to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Generating | Self::Stopped) => true,
            (Self::Generating, Self::Completed | Self::Failed | Self::Stopped) => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Generating => "GENERATING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One prompt's generation attempt.
///
/// All status changes go through the transition methods below, which refuse
/// to leave a terminal status. `result` is only ever set together with
/// `Completed` and `error` only together with `Failed`.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub prompt: String,
    pub status: JobStatus,
    #[serde(skip)]
    pub result: Option<GeneratedVideo>,
    pub error: Option<String>,
    pub progress_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            prompt: prompt.into(),
            status: JobStatus::Pending,
            result: None,
            error: None,
            progress_message: progress::QUEUED.to_string(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn result_url(&self) -> Option<&ObjectUrl> {
        self.result.as_ref().map(|video| &video.url)
    }

    /// pending -> generating
    pub fn begin(&mut self, message: impl Into<String>) -> bool {
        if !self.transition(JobStatus::Generating) {
            return false;
        }
        self.progress_message = message.into();
        true
    }

    /// Replaces the progress message while the job is generating.
    pub fn set_progress(&mut self, message: impl Into<String>) -> bool {
        if self.status != JobStatus::Generating {
            return false;
        }
        self.progress_message = message.into();
        self.updated_at = Utc::now();
        true
    }

    pub fn complete(&mut self, video: GeneratedVideo) -> Result<(), GeneratedVideo> {
        if !self.transition(JobStatus::Completed) {
            return Err(video);
        }
        self.result = Some(video);
        self.progress_message = progress::COMPLETED.to_string();
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.transition(JobStatus::Failed) {
            return false;
        }
        self.error = Some(error.into());
        self.progress_message = progress::FAILED.to_string();
        self.completed_at = Some(self.updated_at);
        true
    }

    pub fn stop(&mut self) -> bool {
        if !self.transition(JobStatus::Stopped) {
            return false;
        }
        self.progress_message = progress::CANCELLED.to_string();
        self.completed_at = Some(self.updated_at);
        true
    }

    fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            if self.status != next {
                tracing::warn!(job_id = %self.id, from = %self.status, to = %next, "Ignoring invalid job transition");
            }
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }
}

/// Splits a raw prompt block into trimmed, non-empty lines, in order.
pub fn split_prompts(block: &str) -> Vec<String> {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
