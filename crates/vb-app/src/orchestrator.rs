//! Sequential batch runner.
//!
//! [`Orchestrator`] owns the current batch of jobs. `start()` turns the
//! configured prompt block into jobs and drives them one at a time through a
//! [`VideoGenerator`]; `stop()` may be called from any other task while a run
//! is in progress. State lives behind a mutex that is never held across an
//! `.await`, so the handle is cheap to clone into a signal handler or UI.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use vb_client::VideoGenerator;
use vb_core::job::split_prompts;
use vb_core::{progress, BlobStore, GeneratedVideo, Job, JobId, JobStatus};
use crate::events::BatchEvent;
use crate::ticker::ProgressTicker;

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(8);

/// Broadcast channel capacity for batch events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

const EMPTY_RESULT: &str = "Generation resulted in no video data.";

#[derive(Clone)]
pub struct Orchestrator {
    generator: Arc<dyn VideoGenerator>,
    store: BlobStore,
    progress_interval: Duration,
    event_tx: broadcast::Sender<BatchEvent>,
    state: Arc<Mutex<BatchState>>,
}

struct BatchState {
    prompt_block: String,
    credential: String,
    active: bool,
    /// Incremented by every successful `start()`. Work belonging to an older
    /// run never touches the current batch.
    run: u64,
    cancel: CancellationToken,
    jobs: Vec<Job>,
    next_id: u64,
}

impl BatchState {
    fn can_start(&self) -> bool {
        !self.prompt_block.trim().is_empty() && !self.credential.trim().is_empty() && !self.active
    }
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn VideoGenerator>, store: BlobStore) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = BatchState {
            prompt_block: String::new(),
            credential: String::new(),
            active: false,
            run: 0,
            cancel: CancellationToken::new(),
            jobs: Vec::new(),
            next_id: Utc::now().timestamp_millis().max(0) as u64,
        };

        Self {
            generator,
            store,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            event_tx,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Period of the cosmetic progress-message refresh.
    pub fn with_progress_interval(mut self, progress_interval: Duration) -> Self {
        self.progress_interval = progress_interval;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.event_tx.subscribe()
    }

    /// Stores raw input. Validation is deferred to [`can_start`](Self::can_start).
    pub fn configure(&self, prompt_block: impl Into<String>, credential: impl Into<String>) {
        let mut state = self.lock();
        state.prompt_block = prompt_block.into();
        state.credential = credential.into();
    }

    pub fn can_start(&self) -> bool {
        self.lock().can_start()
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Snapshot of the current batch, in prompt order.
    pub fn jobs(&self) -> Vec<Job> {
        self.lock().jobs.clone()
    }

    pub fn job(&self, id: JobId) -> Option<Job> {
        self.lock().jobs.iter().find(|job| job.id == id).cloned()
    }

    /// Runs a fresh batch to completion.
    ///
    /// Returns `false` without doing anything when [`can_start`](Self::can_start)
    /// is false. Otherwise the previous batch is discarded (its object URLs
    /// revoked) and every job is processed in order before returning `true`.
    pub async fn start(&self) -> bool {
        let (run, cancel, credential, queue, previous) = {
            let mut state = self.lock();
            if !state.can_start() {
                tracing::debug!("Start ignored: missing prompts or credential, or a run is active");
                return false;
            }

            let prompts = split_prompts(&state.prompt_block);
            let first_id = state.next_id;
            state.next_id += prompts.len() as u64;
            let jobs: Vec<Job> = prompts
                .into_iter()
                .zip(first_id..)
                .map(|(prompt, id)| Job::new(JobId(id), prompt))
                .collect();
            let queue: Vec<(JobId, String)> =
                jobs.iter().map(|job| (job.id, job.prompt.clone())).collect();

            state.run += 1;
            state.active = true;
            state.cancel = CancellationToken::new();
            let previous = std::mem::replace(&mut state.jobs, jobs);
            self.emit(BatchEvent::Started {
                run: state.run,
                jobs: state.jobs.clone(),
            });

            (state.run, state.cancel.clone(), state.credential.clone(), queue, previous)
        };

        let released = self.revoke_results(&previous);
        tracing::info!(run, jobs = queue.len(), released, "Starting batch");

        for (id, prompt) in queue {
            self.run_job(run, &cancel, id, &prompt, &credential).await;
        }

        {
            let mut state = self.lock();
            if state.run == run {
                state.active = false;
            }
            self.emit(BatchEvent::Finished { run });
        }
        tracing::info!(run, "Batch finished");

        true
    }

    /// Requests cancellation of the current run.
    ///
    /// Pending jobs become `Stopped` immediately and a new run may be started
    /// right away. The job that is already generating keeps going until the
    /// client notices the cancellation; it then ends up `Failed` with the
    /// client's cancellation message.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.cancel.cancel();
        state.active = false;

        let run = state.run;
        let mut stopped = 0;
        for job in state.jobs.iter_mut() {
            if job.status == JobStatus::Pending && job.stop() {
                stopped += 1;
                self.emit(BatchEvent::JobUpdated {
                    run,
                    job: job.clone(),
                });
            }
        }
        tracing::info!(run, stopped, "Batch stop requested");
    }

    /// Revokes the object URLs of every completed job in the current batch.
    /// The jobs keep their blobs.
    pub fn release_results(&self) -> usize {
        let jobs = self.jobs();
        self.revoke_results(&jobs)
    }

    async fn run_job(
        &self,
        run: u64,
        cancel: &CancellationToken,
        id: JobId,
        prompt: &str,
        credential: &str,
    ) {
        if cancel.is_cancelled() {
            self.update_job(run, id, Job::stop);
            return;
        }
        if !self.update_job(run, id, |job| job.begin(progress::random_message())) {
            return;
        }
        tracing::info!(run, job_id = %id, "Generating video");

        let ticker = {
            let this = self.clone();
            ProgressTicker::spawn(self.progress_interval, move || {
                this.update_job(run, id, |job| job.set_progress(progress::random_message()));
            })
        };

        let is_cancelled = || cancel.is_cancelled();
        let outcome = self.generator.generate(prompt, credential, &is_cancelled).await;
        ticker.stop();

        match outcome {
            Ok(video) if !video.is_empty() => self.complete_job(run, id, video),
            Ok(video) => {
                self.store.revoke(&video.url);
                self.fail_job(run, id, EMPTY_RESULT.to_string());
            }
            Err(e) => self.fail_job(run, id, e.to_string()),
        }
    }

    fn complete_job(&self, run: u64, id: JobId, video: GeneratedVideo) {
        let mut video = Some(video);
        let applied = self.update_job(run, id, |job| match video.take() {
            Some(v) => match job.complete(v) {
                Ok(()) => true,
                Err(v) => {
                    video = Some(v);
                    false
                }
            },
            None => false,
        });

        if applied {
            tracing::info!(run, job_id = %id, "Video generation completed");
        } else if let Some(orphan) = video {
            tracing::debug!(run, job_id = %id, "Discarding result for a job that is no longer current");
            self.store.revoke(&orphan.url);
        }
    }

    fn fail_job(&self, run: u64, id: JobId, error: String) {
        tracing::warn!(run, job_id = %id, error = %error, "Video generation failed");
        self.update_job(run, id, |job| job.fail(error));
    }

    /// Applies `update` to a job of `run`, emitting the new state if it
    /// reports a change. No-op once `run` has been superseded.
    fn update_job<F>(&self, run: u64, id: JobId, update: F) -> bool
    where
        F: FnOnce(&mut Job) -> bool,
    {
        let mut state = self.lock();
        if state.run != run {
            return false;
        }
        let Some(job) = state.jobs.iter_mut().find(|job| job.id == id) else {
            return false;
        };
        if !update(job) {
            return false;
        }
        let job = job.clone();
        self.emit(BatchEvent::JobUpdated { run, job });
        true
    }

    fn revoke_results(&self, jobs: &[Job]) -> usize {
        jobs.iter()
            .filter_map(Job::result_url)
            .filter(|url| self.store.revoke(url))
            .count()
    }

    fn emit(&self, event: BatchEvent) {
        // Err only means nobody is subscribed.
        let _ = self.event_tx.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use tokio::sync::broadcast::error::TryRecvError;
    use vb_client::{CancelCheck, ClientError};
    use vb_core::Blob;
    use super::*;

    #[derive(Clone, Copy)]
    enum Script {
        Succeed,
        Empty,
        NoLink,
        WaitForCancel,
    }

    struct ScriptedGenerator {
        store: BlobStore,
        scripts: HashMap<&'static str, Script>,
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(store: &BlobStore, scripts: &[(&'static str, Script)]) -> Arc<Self> {
            Arc::new(Self {
                store: store.clone(),
                scripts: scripts.iter().copied().collect(),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VideoGenerator for ScriptedGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _credential: &str,
            is_cancelled: CancelCheck<'_>,
        ) -> Result<GeneratedVideo, ClientError> {
            self.calls.lock().unwrap().push(prompt.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let script = self.scripts.get(prompt).copied().unwrap_or(Script::Succeed);
            let result = match script {
                Script::Succeed | Script::Empty => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    let bytes = if matches!(script, Script::Empty) { vec![] } else { b"mp4".to_vec() };
                    let blob = Blob::new(bytes, "video/mp4");
                    let url = self.store.insert(blob.clone());
                    Ok(GeneratedVideo { blob, url })
                }
                Script::NoLink => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Err(ClientError::MissingDownloadLink)
                }
                Script::WaitForCancel => loop {
                    if is_cancelled() {
                        break Err(ClientError::Cancelled);
                    }
                    tokio::time::sleep(Duration::from_secs(10)).await;
                },
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn orchestrator(generator: Arc<ScriptedGenerator>, store: &BlobStore) -> Orchestrator {
        Orchestrator::new(generator, store.clone())
    }

    async fn wait_for_status(rx: &mut broadcast::Receiver<BatchEvent>, prompt: &str, status: JobStatus) -> Job {
        loop {
            if let BatchEvent::JobUpdated { job, .. } = rx.recv().await.unwrap() {
                if job.prompt == prompt && job.status == status {
                    return job;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_can_start_rules() {
        let store = BlobStore::new();
        let orch = orchestrator(ScriptedGenerator::new(&store, &[]), &store);

        assert!(!orch.can_start());
        orch.configure("A cat", "");
        assert!(!orch.can_start());
        orch.configure("A cat", "   ");
        assert!(!orch.can_start());
        orch.configure(" \n\t\n", "key1");
        assert!(!orch.can_start());
        orch.configure("A cat", "key1");
        assert!(orch.can_start());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_credential_start_is_noop() {
        let store = BlobStore::new();
        let generator = ScriptedGenerator::new(&store, &[]);
        let orch = orchestrator(generator.clone(), &store);
        orch.configure("A cat\nA dragon", "");

        assert!(!orch.start().await);
        assert!(orch.jobs().is_empty());
        assert!(generator.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_lines_are_ignored_and_jobs_complete_in_order() {
        let store = BlobStore::new();
        let generator = ScriptedGenerator::new(&store, &[]);
        let orch = orchestrator(generator.clone(), &store);
        orch.configure("A cat\n\nA dragon", "key1");

        assert!(orch.start().await);

        let jobs = orch.jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].prompt, "A cat");
        assert_eq!(jobs[1].prompt, "A dragon");
        assert_ne!(jobs[0].id, jobs[1].id);
        for job in &jobs {
            assert_eq!(job.status, JobStatus::Completed);
            assert_eq!(job.progress_message, progress::COMPLETED);
            assert!(job.result_url().is_some());
            assert!(job.error.is_none());
        }
        assert_eq!(generator.calls(), vec!["A cat", "A dragon"]);
        assert_eq!(generator.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(!orch.is_active());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_recorded_and_batch_continues() {
        let store = BlobStore::new();
        let generator = ScriptedGenerator::new(&store, &[("no link", Script::NoLink), ("empty", Script::Empty)]);
        let orch = orchestrator(generator.clone(), &store);
        orch.configure("no link\nempty\nA cat", "key1");

        orch.start().await;

        let jobs = orch.jobs();
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(
            jobs[0].error.as_deref(),
            Some("Video generation finished but no download link was found.")
        );
        assert_eq!(jobs[0].progress_message, progress::FAILED);
        assert!(jobs[0].result.is_none());

        assert_eq!(jobs[1].status, JobStatus::Failed);
        assert_eq!(jobs[1].error.as_deref(), Some(EMPTY_RESULT));

        assert_eq!(jobs[2].status, JobStatus::Completed);
        assert_eq!(generator.calls().len(), 3);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_marks_pending_stopped_and_inflight_fails() {
        let store = BlobStore::new();
        let generator = ScriptedGenerator::new(&store, &[("first", Script::WaitForCancel)]);
        let orch = orchestrator(generator.clone(), &store);
        orch.configure("first\nsecond\nthird", "key1");
        let mut rx = orch.subscribe();

        let run = tokio::spawn({
            let orch = orch.clone();
            async move { orch.start().await }
        });
        wait_for_status(&mut rx, "first", JobStatus::Generating).await;
        assert!(orch.is_active());
        assert!(!orch.can_start());

        orch.stop();

        let jobs = orch.jobs();
        assert_eq!(jobs[0].status, JobStatus::Generating);
        for job in &jobs[1..] {
            assert_eq!(job.status, JobStatus::Stopped);
            assert_eq!(job.progress_message, progress::CANCELLED);
        }
        assert!(!orch.is_active());
        assert!(orch.can_start());

        assert!(run.await.unwrap());

        let first = orch.jobs().remove(0);
        assert_eq!(first.status, JobStatus::Failed);
        assert_eq!(first.error.as_deref(), Some("Video generation was stopped by the user."));
        assert_eq!(generator.calls(), vec!["first"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_leave_pending_only_after_predecessor_finishes() {
        let store = BlobStore::new();
        let generator = ScriptedGenerator::new(&store, &[("b", Script::NoLink)]);
        let orch = orchestrator(generator, &store);
        orch.configure("a\nb\nc", "key1");
        let mut rx = orch.subscribe();

        orch.start().await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(BatchEvent::Started { .. })));
        assert!(matches!(events.last(), Some(BatchEvent::Finished { .. })));
        assert!(events.iter().all(|event| event.run() == 1));

        let position = |prompt: &str, pred: fn(JobStatus) -> bool| {
            events.iter().position(|event| {
                matches!(event, BatchEvent::JobUpdated { job, .. } if job.prompt == prompt && pred(job.status))
            })
        };
        let terminal = |status: JobStatus| status.is_terminal();
        let generating = |status: JobStatus| status == JobStatus::Generating;

        let a_done = position("a", terminal).unwrap();
        let b_start = position("b", generating).unwrap();
        let b_done = position("b", terminal).unwrap();
        let c_start = position("c", generating).unwrap();
        assert!(a_done < b_start);
        assert!(b_done < c_start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_refreshes_while_generating_only() {
        let store = BlobStore::new();
        let generator = ScriptedGenerator::new(&store, &[]);
        let orch = orchestrator(generator, &store);
        orch.configure("A cat", "key1");
        let mut rx = orch.subscribe();

        orch.start().await;

        let mut updates = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BatchEvent::JobUpdated { job, .. } = event {
                updates.push(job);
            }
        }
        // begin, refreshes at 8s/16s/24s, completion at 30s
        assert_eq!(updates.len(), 5);
        for job in &updates[..4] {
            assert_eq!(job.status, JobStatus::Generating);
            assert!(progress::FLAVOR_MESSAGES.contains(&job.progress_message.as_str()));
        }
        assert_eq!(updates[4].status, JobStatus::Completed);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(orch.jobs()[0].progress_message, progress::COMPLETED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_run_replaces_batch_and_revokes_results() {
        let store = BlobStore::new();
        let generator = ScriptedGenerator::new(&store, &[]);
        let orch = orchestrator(generator, &store);

        orch.configure("one\ntwo", "key1");
        orch.start().await;
        let first_ids: Vec<JobId> = orch.jobs().iter().map(|job| job.id).collect();
        assert_eq!(store.len(), 2);

        orch.configure("three", "key1");
        orch.start().await;

        let jobs = orch.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].prompt, "three");
        assert!(!first_ids.contains(&jobs[0].id));
        assert_eq!(store.len(), 1);

        assert_eq!(orch.release_results(), 1);
        assert!(store.is_empty());
        assert_eq!(orch.jobs()[0].status, JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_run_does_not_touch_new_batch() {
        let store = BlobStore::new();
        let generator = ScriptedGenerator::new(&store, &[("slow", Script::WaitForCancel)]);
        let orch = orchestrator(generator, &store);
        orch.configure("slow\nleft behind", "key1");
        let mut rx = orch.subscribe();

        let old_run = tokio::spawn({
            let orch = orch.clone();
            async move { orch.start().await }
        });
        wait_for_status(&mut rx, "slow", JobStatus::Generating).await;
        orch.stop();

        orch.configure("fresh", "key1");
        assert!(orch.start().await);
        assert!(old_run.await.unwrap());

        let jobs = orch.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].prompt, "fresh");
        assert_eq!(jobs[0].status, JobStatus::Completed);
        assert!(!orch.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_result_of_superseded_run_is_revoked() {
        let store = BlobStore::new();
        let generator = ScriptedGenerator::new(&store, &[]);
        let orch = orchestrator(generator.clone(), &store);
        orch.configure("old", "key1");
        let mut rx = orch.subscribe();

        let old_run = tokio::spawn({
            let orch = orch.clone();
            async move { orch.start().await }
        });
        wait_for_status(&mut rx, "old", JobStatus::Generating).await;
        orch.stop();

        orch.configure("new", "key1");
        let new_run = tokio::spawn({
            let orch = orch.clone();
            async move { orch.start().await }
        });
        assert!(old_run.await.unwrap());
        assert!(new_run.await.unwrap());

        // Both generations succeeded, but only the current batch keeps its URL.
        assert_eq!(generator.calls(), vec!["old", "new"]);
        let jobs = orch.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].prompt, "new");
        assert_eq!(jobs[0].status, JobStatus::Completed);
        assert_eq!(store.len(), 1);
        assert!(store.resolve(jobs[0].result_url().unwrap()).is_some());
    }
}
