use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Server-side ceiling on set cardinality. The effective limit of any
    /// materialization is min(this, requested size).
    pub max_set_size: usize,
    /// Cap on the sample returned by union previews.
    pub max_preview_size: usize,
    /// Timeout applied to every search collaborator call.
    pub search_timeout: Duration,
    pub job_workers: usize,
    pub job_queue_depth: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            max_set_size: env::var("MAX_SET_SIZE")
                .unwrap_or_else(|_| "200000".to_string())
                .parse()
                .context("MAX_SET_SIZE must be a valid number")?,
            max_preview_size: env::var("MAX_PREVIEW_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("MAX_PREVIEW_SIZE must be a valid number")?,
            search_timeout: Duration::from_secs(
                env::var("SEARCH_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("SEARCH_TIMEOUT_SECS must be a valid number")?,
            ),
            job_workers: env::var("JOB_WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("JOB_WORKERS must be a valid number")?,
            job_queue_depth: env::var("JOB_QUEUE_DEPTH")
                .unwrap_or_else(|_| "64".to_string())
                .parse()
                .context("JOB_QUEUE_DEPTH must be a valid number")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            max_set_size: 200_000,
            max_preview_size: 1000,
            search_timeout: Duration::from_secs(30),
            job_workers: 4,
            job_queue_depth: 64,
        }
    }
}
