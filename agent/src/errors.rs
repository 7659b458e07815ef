//! Error types for the satellite agent

use thiserror::Error;

/// Main error type for the satellite agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Control plane returned {status}: {body}")]
    ControlPlaneError { status: u16, body: String },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Container runtime error: {0}")]
    RuntimeError(String),

    #[error("Task error: {0}")]
    TaskError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
