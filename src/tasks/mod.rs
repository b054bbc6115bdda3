//! Task registry shared between the HTTP handlers and the job workers.
//!
//! A [`Task`] enforces its own state machine: statuses only move forward,
//! the download percentage never goes down, and terminal tasks ignore any
//! further mutation. The store only has to make each read or update atomic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// Opaque task identifier handed out to clients
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a task. Variants are declared in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Starting,
    Downloading,
    Processing,
    Done,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Starting => "starting",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Processing => "processing",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one submitted job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    pub status: TaskStatus,

    /// Download progress, 0 to 100
    pub percent: u8,

    /// Failure message, only set when `status` is `Error`
    pub error: Option<String>,

    /// Produced file, only set when `status` is `Done`
    pub artifact_path: Option<PathBuf>,

    /// Sanitized filename stem used when delivering the artifact
    pub display_title: Option<String>,

    /// Directory owned by this job, removed on delivery or expiry
    pub job_dir: Option<PathBuf>,

    pub created_at: DateTime<Utc>,

    /// When the task reached `done` or `error`
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            status: TaskStatus::Starting,
            percent: 0,
            error: None,
            artifact_path: None,
            display_title: None,
            job_dir: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    fn advance(&mut self, next: TaskStatus) -> bool {
        if self.status.is_terminal() || next < self.status {
            return false;
        }
        self.status = next;
        true
    }

    /// Record download progress. Lower percentages than the current one are ignored.
    pub fn record_progress(&mut self, percent: u8) {
        if !self.advance(TaskStatus::Downloading) {
            return;
        }
        self.percent = self.percent.max(percent.min(100));
    }

    /// The transfer phase is over; post-processing may still run.
    pub fn mark_processing(&mut self) {
        if self.advance(TaskStatus::Processing) {
            self.percent = 100;
        }
    }

    pub fn complete(&mut self, artifact_path: PathBuf, display_title: String) {
        if self.advance(TaskStatus::Done) {
            self.percent = 100;
            self.artifact_path = Some(artifact_path);
            self.display_title = Some(display_title);
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Error;
        self.error = Some(message.into());
        self.finished_at = Some(Utc::now());
    }

    /// Finished at least `ttl` ago. Running tasks never expire.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.finished_at
            .and_then(|finished| (Utc::now() - finished).to_std().ok())
            .map_or(false, |elapsed| elapsed >= ttl)
    }
}

/// Storage seam for task state.
///
/// Implementations must apply every operation atomically: readers never see a
/// half-applied `update`.
pub trait TaskStore: Send + Sync {
    /// Insert a fresh `starting` task and return its id
    fn create(&self) -> TaskId;

    /// Snapshot of the task, `None` if it was never created or already removed
    fn get(&self, id: &TaskId) -> Option<Task>;

    /// Apply `mutate` to the task. Missing tasks are silently skipped.
    fn update(&self, id: &TaskId, mutate: &mut dyn FnMut(&mut Task));

    /// Remove the task, returning it if it was still present
    fn delete(&self, id: &TaskId) -> Option<Task>;

    /// Snapshot of every task
    fn list(&self) -> Vec<Task>;

    fn len(&self) -> usize {
        self.list().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process task store guarded by a single mutex
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Poison is ignored: mutations touch a single entry through `Task` methods.
    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskStore for MemoryTaskStore {
    fn create(&self) -> TaskId {
        let id = TaskId::new();
        self.lock().insert(id.clone(), Task::new(id.clone()));
        id
    }

    fn get(&self, id: &TaskId) -> Option<Task> {
        self.lock().get(id).cloned()
    }

    fn update(&self, id: &TaskId, mutate: &mut dyn FnMut(&mut Task)) {
        if let Some(task) = self.lock().get_mut(id) {
            mutate(task);
        }
    }

    fn delete(&self, id: &TaskId) -> Option<Task> {
        self.lock().remove(id)
    }

    fn list(&self) -> Vec<Task> {
        self.lock().values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
