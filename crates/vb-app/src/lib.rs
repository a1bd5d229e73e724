pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod ticker;

pub use orchestrator::Orchestrator;
