//! Remote video-generation API.
//!
//! [`VideoApi`] is the opaque outbound capability used by the generation
//! client: submit a prompt, refresh an operation, fetch a media URL.
//! [`GeminiApi`] implements it over the Generative Language REST API
//! using [`reqwest`].

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::schemas::{DownloadResponse, GenerateVideosRequest, Operation};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Starts generating one video for `prompt`.
    async fn submit(&self, prompt: &str, credential: &str) -> Result<Operation, ClientError>;

    /// Fetches the current state of `operation`.
    async fn refresh(&self, operation: &Operation, credential: &str) -> Result<Operation, ClientError>;

    /// Plain GET of a media locator. Non-success statuses are returned, not raised.
    async fn download(&self, locator: &str) -> Result<DownloadResponse, ClientError>;
}

pub struct GeminiApi {
    client: reqwest::Client,
    config: ClientConfig,
}

impl GeminiApi {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Reuses an existing [`reqwest::Client`] and its connection pool.
    pub fn with_client(client: reqwest::Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn submit_url(&self) -> String {
        format!("{}/models/{}:predictLongRunning", self.config.base_url, self.config.model)
    }

    fn operation_url(&self, operation: &Operation) -> String {
        format!("{}/{}", self.config.base_url, operation.name.trim_start_matches('/'))
    }

    async fn parse_operation(response: reqwest::Response) -> Result<Operation, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Operation>().await?)
    }
}

#[async_trait]
impl VideoApi for GeminiApi {
    async fn submit(&self, prompt: &str, credential: &str) -> Result<Operation, ClientError> {
        let response = self
            .client
            .post(self.submit_url())
            .header(API_KEY_HEADER, credential)
            .json(&GenerateVideosRequest::single(prompt))
            .send()
            .await?;

        Self::parse_operation(response).await
    }

    async fn refresh(&self, operation: &Operation, credential: &str) -> Result<Operation, ClientError> {
        let response = self
            .client
            .get(self.operation_url(operation))
            .header(API_KEY_HEADER, credential)
            .send()
            .await?;

        Self::parse_operation(response).await
    }

    async fn download(&self, locator: &str) -> Result<DownloadResponse, ClientError> {
        // The locator carries the credential; keep it out of error messages.
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(reqwest::Error::without_url)?
            .to_vec();

        Ok(DownloadResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Appends `key=<credential>` to a locator's query, percent-encoded.
pub fn with_credential(locator: &str, credential: &str) -> Result<String, ClientError> {
    let mut url = reqwest::Url::parse(locator)
        .map_err(|_| ClientError::InvalidDownloadLink(locator.to_string()))?;
    url.query_pairs_mut().append_pair("key", credential);
    Ok(url.into())
}
