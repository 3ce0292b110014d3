//! Authoritative in-memory task repository.
//!
//! Ids are assigned from a monotonically increasing counter and never
//! reused. Creates carrying an idempotency key are remembered so that a
//! retried request returns the task created the first time.

use std::collections::HashMap;

use taskboard_proto::task::{IdempotencyKey, NewTask, Task, TaskId, TaskPatch, ValidationError};
use tokio::sync::RwLock;

/// Errors returned by repository operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The payload failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No task has the given id.
    #[error("task {0} not found")]
    NotFound(TaskId),
}

/// Outcome of a create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Created {
    /// A new task was stored.
    New(Task),
    /// The idempotency key was seen before; this is the original task.
    Replayed(Task),
}

#[derive(Debug, Default)]
struct Inner {
    tasks: Vec<Task>,
    next_id: u64,
    keys: HashMap<IdempotencyKey, TaskId>,
}

/// Thread-safe task repository shared by all request handlers.
#[derive(Debug)]
pub struct TaskRepository {
    inner: RwLock<Inner>,
    max_title_len: usize,
}

impl TaskRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new(max_title_len: usize) -> Self {
        Self::with_tasks(max_title_len, Vec::new())
    }

    /// Creates a repository seeded with `tasks`. New ids continue after the
    /// largest seeded id.
    #[must_use]
    pub fn with_tasks(max_title_len: usize, tasks: Vec<Task>) -> Self {
        let next_id = tasks.iter().map(|t| t.id.get()).max().unwrap_or(0) + 1;
        Self {
            inner: RwLock::new(Inner {
                tasks,
                next_id,
                keys: HashMap::new(),
            }),
            max_title_len,
        }
    }

    /// All tasks in insertion order.
    pub async fn list(&self) -> Vec<Task> {
        self.inner.read().await.tasks.clone()
    }

    /// Stores a new task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the payload is invalid.
    pub async fn create(
        &self,
        key: Option<IdempotencyKey>,
        task: NewTask,
    ) -> Result<Created, StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = key
            .and_then(|key| inner.keys.get(&key))
            .and_then(|id| inner.tasks.iter().find(|t| t.id == *id))
        {
            return Ok(Created::Replayed(existing.clone()));
        }

        task.validate(self.max_title_len)?;

        let id = TaskId::new(inner.next_id);
        inner.next_id += 1;
        let created = Task::from_new(id, task);
        inner.tasks.push(created.clone());
        if let Some(key) = key {
            inner.keys.insert(key, id);
        }
        Ok(Created::New(created))
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for an invalid or empty patch and
    /// [`StoreError::NotFound`] for an unknown id.
    pub async fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, StoreError> {
        patch.validate(self.max_title_len)?;

        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))?;
        patch.apply_to(task);
        Ok(task.clone())
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id.
    pub async fn delete(&self, id: TaskId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let index = inner
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))?;
        inner.tasks.remove(index);
        Ok(())
    }
}
