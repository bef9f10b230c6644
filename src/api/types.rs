//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::jobs::{Job, OverallStatus, TaskStatus};

/// Request to analyze a list of channels.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    /// Channel URLs, processed in this order
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Response after submitting an analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
    pub task_number: u32,
}

/// One task as seen by a polling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusView {
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Job status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub overall_status: OverallStatus,
    pub tasks: Vec<TaskStatusView>,
    /// Only set when the job id is unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn not_found() -> Self {
        Self {
            overall_status: OverallStatus::Failed,
            tasks: Vec::new(),
            error: Some("Job not found".to_string()),
        }
    }
}

impl From<Job> for StatusResponse {
    fn from(job: Job) -> Self {
        Self {
            overall_status: job.overall_status,
            tasks: job
                .tasks
                .into_iter()
                .map(|t| TaskStatusView {
                    status: t.status,
                    sheet_url: t.sheet_url,
                    error: t.error,
                })
                .collect(),
            error: None,
        }
    }
}

/// Where to send the user to grant access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthLoginResponse {
    pub auth_url: String,
}

/// Query parameters of the OAuth redirect.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user declines
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Number of jobs held in memory
    pub jobs: usize,
}
