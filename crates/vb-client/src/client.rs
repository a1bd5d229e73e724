//! Single-prompt generation: submit, poll until done, fetch the media.

use std::time::Duration;
use async_trait::async_trait;
use vb_core::{Blob, BlobStore, GeneratedVideo};
use crate::api::{with_credential, VideoApi};
use crate::error::ClientError;

/// Fixed wait between two operation polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Checked between polls; returning `true` aborts the generation.
pub type CancelCheck<'a> = &'a (dyn Fn() -> bool + Send + Sync);

#[async_trait]
pub trait VideoGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        credential: &str,
        is_cancelled: CancelCheck<'_>,
    ) -> Result<GeneratedVideo, ClientError>;
}

/// Stateless driver for one remote generation at a time.
///
/// Successful downloads are registered in the shared [`BlobStore`]; the
/// caller owns the returned URL and must revoke it.
pub struct GenerationClient<A> {
    api: A,
    store: BlobStore,
    poll_interval: Duration,
}

impl<A: VideoApi> GenerationClient<A> {
    pub fn new(api: A, store: BlobStore) -> Self {
        Self {
            api,
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }
}

#[async_trait]
impl<A: VideoApi> VideoGenerator for GenerationClient<A> {
    async fn generate(
        &self,
        prompt: &str,
        credential: &str,
        is_cancelled: CancelCheck<'_>,
    ) -> Result<GeneratedVideo, ClientError> {
        if prompt.trim().is_empty() {
            return Err(ClientError::Missing("Prompt"));
        }
        if credential.trim().is_empty() {
            return Err(ClientError::Missing("API Key"));
        }

        let mut operation = self.api.submit(prompt, credential).await?;
        tracing::info!(operation = %operation.name, "Submitted video generation");

        let mut polls = 0u32;
        while !operation.done {
            if is_cancelled() {
                tracing::info!(operation = %operation.name, polls, "Video generation cancelled");
                return Err(ClientError::Cancelled);
            }
            tokio::time::sleep(self.poll_interval).await;
            operation = self.api.refresh(&operation, credential).await?;
            polls += 1;
            tracing::debug!(operation = %operation.name, polls, done = operation.done, "Polled video operation");
        }

        if let Some(error) = &operation.error {
            return Err(ClientError::Remote {
                code: error.code,
                message: error.message.clone(),
            });
        }

        let locator = operation
            .download_locator()
            .ok_or(ClientError::MissingDownloadLink)?;

        let response = self.api.download(&with_credential(locator, credential)?).await?;
        if !response.is_success() {
            tracing::warn!(
                operation = %operation.name,
                status = response.status,
                "Failed to fetch video file",
            );
            return Err(ClientError::download(response.status, &response.body));
        }

        let content_type = response
            .content_type
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let blob = Blob::new(response.body, content_type);
        let url = self.store.insert(blob.clone());

        tracing::info!(operation = %operation.name, bytes = blob.len(), polls, "Video downloaded");

        Ok(GeneratedVideo { blob, url })
    }
}
