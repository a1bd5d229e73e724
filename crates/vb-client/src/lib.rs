//! Client for a remote asynchronous video-generation API.
//!
//! [`GenerationClient`] turns one prompt into one downloaded video:
//! it submits the request, polls the long-running operation at a fixed
//! interval until it is done (or the caller cancels), then fetches the
//! media and registers it in a [`vb_core::BlobStore`].

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod schemas;

pub use api::{GeminiApi, VideoApi};
pub use client::{CancelCheck, GenerationClient, VideoGenerator, DEFAULT_POLL_INTERVAL};
pub use config::ClientConfig;
pub use error::ClientError;
