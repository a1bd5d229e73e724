use std::env;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::Context;
use tokio::io::AsyncReadExt;
use vb_client::{ClientConfig, DEFAULT_POLL_INTERVAL};
use crate::error::AppError;
use crate::orchestrator::DEFAULT_PROGRESS_INTERVAL;

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
const BASE_URL_VAR: &str = "VEO_API_BASE_URL";
const MODEL_VAR: &str = "VEO_MODEL";
const POLL_INTERVAL_VAR: &str = "VEO_POLL_INTERVAL_SECS";
const PROGRESS_INTERVAL_VAR: &str = "VEO_PROGRESS_INTERVAL_SECS";
const OUTPUT_DIR_VAR: &str = "VEO_OUTPUT_DIR";
const PROMPTS_FILE_VAR: &str = "VEO_PROMPTS_FILE";

const DEFAULT_OUTPUT_DIR: &str = "outputs";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub client: ClientConfig,
    pub poll_interval: Duration,
    pub progress_interval: Duration,
    pub output_dir: PathBuf,
    /// Read the prompt block from stdin when unset.
    pub prompts_file: Option<PathBuf>,
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn load() -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e).context("Failed to read .env");
            }
        }

        Ok(Self::from_lookup(|name| env::var(name).ok())?)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_key = var(API_KEY_VAR).ok_or(AppError::MissingConfig(API_KEY_VAR))?;

        let mut client = ClientConfig::default();
        if let Some(base_url) = var(BASE_URL_VAR) {
            client = client.with_base_url(base_url);
        }
        if let Some(model) = var(MODEL_VAR) {
            client = client.with_model(model);
        }

        let poll_interval = match var(POLL_INTERVAL_VAR) {
            Some(value) => parse_secs(POLL_INTERVAL_VAR, &value)?,
            None => DEFAULT_POLL_INTERVAL,
        };
        let progress_interval = match var(PROGRESS_INTERVAL_VAR) {
            Some(value) => parse_secs(PROGRESS_INTERVAL_VAR, &value)?,
            None => DEFAULT_PROGRESS_INTERVAL,
        };

        Ok(Self {
            api_key,
            client,
            poll_interval,
            progress_interval,
            output_dir: var(OUTPUT_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            prompts_file: var(PROMPTS_FILE_VAR).map(PathBuf::from),
        })
    }

    /// Raw prompt block, one prompt per line.
    pub async fn read_prompt_block(&self) -> anyhow::Result<String> {
        match &self.prompts_file {
            Some(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompts from {}", path.display())),
            None => {
                let mut block = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut block)
                    .await
                    .context("Failed to read prompts from stdin")?;
                Ok(block)
            }
        }
    }
}

fn parse_secs(name: &'static str, value: &str) -> Result<Duration, AppError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(AppError::InvalidConfig {
            name,
            value: value.to_string(),
        }),
    }
}
