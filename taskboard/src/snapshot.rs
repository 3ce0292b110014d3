//! Pre-mutation copies of store state used for rollback.
//!
//! A [`Snapshot`] either covers the whole store or a single task (its value
//! or its absence, plus its position in store order). Restoring consumes
//! the snapshot, so one snapshot can never be applied twice.

use taskboard_proto::task::{Task, TaskId};

use crate::store::TaskStore;

/// Immutable copy of store state taken before an optimistic mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    Full(Vec<Task>),
    Task {
        id: TaskId,
        index: usize,
        entry: Option<Task>,
    },
}

impl Snapshot {
    /// Copies the entire store.
    ///
    /// A single restore point for several local edits. The engine itself
    /// captures per task with [`capture_task`](Self::capture_task).
    #[must_use]
    pub fn capture(store: &TaskStore) -> Self {
        Self {
            scope: Scope::Full(store.tasks().to_vec()),
        }
    }

    /// Copies a single task (or records that it is absent) with its position.
    #[must_use]
    pub fn capture_task(store: &TaskStore, id: TaskId) -> Self {
        let (index, entry) = match store.position(id) {
            Some(index) => (index, Some(store.tasks()[index].clone())),
            None => (store.len(), None),
        };
        Self {
            scope: Scope::Task { id, index, entry },
        }
    }

    /// The captured task value, if this is a task snapshot of a present task.
    #[must_use]
    pub const fn entry(&self) -> Option<&Task> {
        match &self.scope {
            Scope::Full(_) => None,
            Scope::Task { entry, .. } => entry.as_ref(),
        }
    }

    /// Returns a task snapshot at the same position holding `entry` instead.
    ///
    /// Used when the server confirms a newer value for the covered task.
    /// A full-store snapshot is returned unchanged.
    #[must_use]
    pub fn with_entry(self, entry: Option<Task>) -> Self {
        match self.scope {
            Scope::Task { id, index, .. } => Self {
                scope: Scope::Task { id, index, entry },
            },
            full @ Scope::Full(_) => Self { scope: full },
        }
    }

    /// Overwrites the covered scope of `store` with the captured state.
    ///
    /// A full snapshot replaces every task. A task snapshot puts the task
    /// back (in place if present, otherwise at its captured index) or
    /// removes it if it was absent when captured.
    pub fn restore(self, store: &mut TaskStore) {
        match self.scope {
            Scope::Full(tasks) => store.replace_all(tasks),
            Scope::Task {
                index,
                entry: Some(task),
                ..
            } => store.insert_at(index, task),
            Scope::Task {
                id, entry: None, ..
            } => {
                store.remove_by_id(id);
            }
        }
    }
}
