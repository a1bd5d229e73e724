use vb_core::Job;

/// Batch lifecycle notifications for the presentation layer.
///
/// `run` identifies the `start()` call that produced the event; a new run
/// replaces every job of the previous one.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started { run: u64, jobs: Vec<Job> },
    JobUpdated { run: u64, job: Job },
    Finished { run: u64 },
}

impl BatchEvent {
    pub fn run(&self) -> u64 {
        match self {
            Self::Started { run, .. } | Self::JobUpdated { run, .. } | Self::Finished { run } => *run,
        }
    }
}
