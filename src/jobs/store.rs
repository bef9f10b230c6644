//! In-memory job registry (non-persistent).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle of a single task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet picked up
    Queue,
    /// Orchestrator is processing it
    Working,
    /// Exported; the task carries a link
    Done,
    /// Aborted; the task carries an error
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queue => write!(f, "queue"),
            Self::Working => write!(f, "working"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Status of a job, derived from its tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Processing,
    Complete,
    Failed,
}

impl OverallStatus {
    /// `complete` when every task is done, `failed` when every task is terminal and
    /// one failed, `processing` otherwise.
    pub fn derive(tasks: &[Task]) -> Self {
        if tasks.is_empty() || !tasks.iter().all(|t| t.status.is_terminal()) {
            return Self::Processing;
        }
        if tasks.iter().any(|t| t.status == TaskStatus::Failed) {
            Self::Failed
        } else {
            Self::Complete
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Task {
    pub task_number: u32,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    fn queued(task_number: u32) -> Self {
        Self {
            task_number,
            status: TaskStatus::Queue,
            sheet_url: None,
            error: None,
        }
    }

    /// Apply a transition. Terminal tasks never change; `working` only follows `queue`.
    fn apply(&mut self, update: &TaskUpdate) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match update {
            TaskUpdate::Working => {
                if self.status != TaskStatus::Queue {
                    return false;
                }
                self.status = TaskStatus::Working;
            }
            TaskUpdate::Done { sheet_url } => {
                self.status = TaskStatus::Done;
                self.sheet_url = Some(sheet_url.clone());
                self.error = None;
            }
            TaskUpdate::Failed { error } => {
                self.status = TaskStatus::Failed;
                self.error = Some(error.clone());
                self.sheet_url = None;
            }
        }
        true
    }
}

/// A transition requested for a job's task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    Working,
    Done { sheet_url: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub tasks: Vec<Task>,
    pub overall_status: OverallStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Task number of the job's (single) task.
    pub fn task_number(&self) -> Option<u32> {
        self.tasks.first().map(|t| t.task_number)
    }
}

/// Owns every job for the lifetime of the process.
///
/// Each operation takes the lock once, so an update to one job is atomic and
/// concurrent updates to the same job are serialized.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job with one queued task and return its id.
    pub async fn create_job(&self, task_number: u32) -> String {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let tasks = vec![Task::queued(task_number)];
        let job = Job {
            id: id.clone(),
            overall_status: OverallStatus::derive(&tasks),
            tasks,
            created_at: now,
            updated_at: now,
        };
        self.jobs.write().await.insert(id.clone(), job);
        id
    }

    pub async fn get_job(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Transition the job's task. Unknown ids and updates to terminal tasks are
    /// ignored; returns whether anything changed.
    pub async fn update_task(&self, job_id: &str, update: TaskUpdate) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            tracing::debug!(job_id, "Ignoring update for unknown job");
            return false;
        };

        let Some(task) = job.tasks.first_mut() else {
            return false;
        };
        if !task.apply(&update) {
            tracing::debug!(job_id, status = %task.status, ?update, "Ignoring task transition");
            return false;
        }

        job.overall_status = OverallStatus::derive(&job.tasks);
        job.updated_at = Utc::now();
        true
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Number of jobs still processing.
    pub async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|j| j.overall_status == OverallStatus::Processing)
            .count()
    }
}
