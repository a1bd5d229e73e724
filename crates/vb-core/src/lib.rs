pub mod job;
pub mod media;
pub mod progress;

pub use job::{Job, JobId, JobStatus};
pub use media::{Blob, BlobStore, GeneratedVideo, ObjectUrl};
