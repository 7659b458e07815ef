//! Agent API models

use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Inference access request sent by model servers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceAccessIn {
    pub api_key: String,
}

/// Inference access decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceAccessOut {
    pub authorized: bool,
}

/// A deployment served from this satellite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub deployment_id: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}
