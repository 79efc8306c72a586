use thiserror::Error;

use crate::pipeline::JobStatus;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Unknown preset: {0}. Expected one of: mobile, gitlab")]
    UnknownPreset(String),

    #[error("Illegal status transition for job {job_id}: {from} -> {to}")]
    IllegalTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Unsupported definition format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
