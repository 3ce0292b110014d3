//! In-process authoritative task store.
//!
//! [`InMemoryGateway`] behaves like the REST resource: it assigns ids,
//! answers 404 for unknown tasks, validates payloads and deduplicates
//! creates by idempotency key. Failures can be queued with
//! [`fail_next`](InMemoryGateway::fail_next) to exercise rollback paths.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use taskboard_proto::task::{
    IdempotencyKey, MAX_TASK_TITLE_LENGTH, NewTask, Task, TaskId, TaskPatch,
};

use super::{Gateway, GatewayError};

#[derive(Debug)]
struct MemoryState {
    tasks: Vec<Task>,
    next_id: u64,
    created: HashMap<IdempotencyKey, TaskId>,
    failures: VecDeque<GatewayError>,
    calls: usize,
}

/// In-memory [`Gateway`]. Clones share the same backing store.
#[derive(Debug, Clone)]
pub struct InMemoryGateway {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    /// Creates an empty store; the first created task gets id 1.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tasks(Vec::new())
    }

    /// Creates a store pre-populated with `tasks`.
    ///
    /// New ids continue after the largest seeded id.
    #[must_use]
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let next_id = tasks.iter().map(|t| t.id.get()).max().unwrap_or(0) + 1;
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                tasks,
                next_id,
                created: HashMap::new(),
                failures: VecDeque::new(),
                calls: 0,
            })),
        }
    }

    /// Makes the next call fail with `error` instead of touching the store.
    ///
    /// Multiple queued failures are consumed in order.
    pub fn fail_next(&self, error: GatewayError) {
        self.state.lock().failures.push_back(error);
    }

    /// Number of queued failures not yet consumed.
    #[must_use]
    pub fn pending_failures(&self) -> usize {
        self.state.lock().failures.len()
    }

    /// Current server-side tasks.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.clone()
    }

    /// Number of calls received so far, failed ones included.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().calls
    }

    /// Counts the call and pops a queued failure, if any.
    fn begin_call(state: &mut MemoryState) -> Result<(), GatewayError> {
        state.calls += 1;
        state.failures.pop_front().map_or(Ok(()), Err)
    }
}

fn not_found(id: TaskId) -> GatewayError {
    GatewayError::rejected(404, format!("task {id} not found"))
}

impl Gateway for InMemoryGateway {
    async fn list_tasks(&self) -> Result<Vec<Task>, GatewayError> {
        let mut state = self.state.lock();
        Self::begin_call(&mut state)?;
        Ok(state.tasks.clone())
    }

    async fn create_task(&self, key: IdempotencyKey, task: &NewTask) -> Result<Task, GatewayError> {
        let mut state = self.state.lock();
        Self::begin_call(&mut state)?;

        if let Some(existing) = state
            .created
            .get(&key)
            .and_then(|id| state.tasks.iter().find(|t| t.id == *id))
        {
            return Ok(existing.clone());
        }

        task.validate(MAX_TASK_TITLE_LENGTH)
            .map_err(|e| GatewayError::rejected(400, e.to_string()))?;

        let id = TaskId::new(state.next_id);
        state.next_id += 1;
        let created = Task::from_new(id, task.clone());
        state.tasks.push(created.clone());
        state.created.insert(key, id);
        Ok(created)
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, GatewayError> {
        let mut state = self.state.lock();
        Self::begin_call(&mut state)?;

        patch
            .validate(MAX_TASK_TITLE_LENGTH)
            .map_err(|e| GatewayError::rejected(400, e.to_string()))?;

        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found(id))?;
        patch.apply_to(task);
        Ok(task.clone())
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        Self::begin_call(&mut state)?;

        let index = state
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| not_found(id))?;
        state.tasks.remove(index);
        Ok(())
    }
}
