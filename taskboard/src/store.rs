//! In-memory mirror of the remote task collection.
//!
//! [`TaskStore`] keeps tasks in insertion/reconciliation order and
//! guarantees that no two entries share an id. It is owned exclusively by
//! the [`Engine`](crate::engine::Engine); everything else reads it.

use taskboard_proto::task::{Task, TaskId, TaskPatch};

/// Ordered, id-unique collection of tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStore {
    tasks: Vec<Task>,
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Creates a store holding `tasks`, collapsing duplicate ids.
    #[must_use]
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let mut store = Self::new();
        store.replace_all(tasks);
        store
    }

    /// All tasks in store order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Index of the task with `id` in store order.
    #[must_use]
    pub fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Returns `true` if a task with `id` is present.
    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.position(id).is_some()
    }

    /// Number of tasks held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if the store holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Replaces the whole collection.
    ///
    /// A later duplicate of an id overwrites the earlier value but keeps
    /// the earlier position.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks.clear();
        for task in tasks {
            self.insert(task);
        }
    }

    /// Inserts a task, or replaces the existing entry with the same id in place.
    ///
    /// Returns the replaced task, if any.
    pub fn insert(&mut self, task: Task) -> Option<Task> {
        match self.position(task.id) {
            Some(index) => Some(std::mem::replace(&mut self.tasks[index], task)),
            None => {
                self.tasks.push(task);
                None
            }
        }
    }

    /// Inserts a task at `index` (clamped to the end of the store).
    ///
    /// If the id is already present the existing entry is replaced in place
    /// and `index` is ignored.
    pub fn insert_at(&mut self, index: usize, task: Task) {
        if let Some(existing) = self.position(task.id) {
            self.tasks[existing] = task;
            return;
        }
        let index = index.min(self.tasks.len());
        self.tasks.insert(index, task);
    }

    /// Applies a patch to the task with `id`.
    ///
    /// Returns the updated task, or `None` if no such task exists.
    pub fn apply_patch(&mut self, id: TaskId, patch: &TaskPatch) -> Option<&Task> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        patch.apply_to(task);
        Some(&*task)
    }

    /// Removes the task with `id`, returning its former index and value.
    pub fn remove_by_id(&mut self, id: TaskId) -> Option<(usize, Task)> {
        let index = self.position(id)?;
        Some((index, self.tasks.remove(index)))
    }
}
