//! Read-only board projection.
//!
//! Columns are derived from each task's status on every call; there is no
//! stored per-column order. Within a column tasks keep store order.

use taskboard_proto::task::{Task, TaskId, TaskStatus};

/// Tasks partitioned by status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    /// `todo` column.
    pub todo: Vec<Task>,
    /// `in-progress` column.
    pub in_progress: Vec<Task>,
    /// `completed` column.
    pub completed: Vec<Task>,
}

impl Board {
    /// The column holding tasks with `status`.
    #[must_use]
    pub fn column(&self, status: TaskStatus) -> &[Task] {
        match status {
            TaskStatus::Todo => &self.todo,
            TaskStatus::InProgress => &self.in_progress,
            TaskStatus::Completed => &self.completed,
        }
    }

    fn column_mut(&mut self, status: TaskStatus) -> &mut Vec<Task> {
        match status {
            TaskStatus::Todo => &mut self.todo,
            TaskStatus::InProgress => &mut self.in_progress,
            TaskStatus::Completed => &mut self.completed,
        }
    }

    /// Columns in display order, paired with their status.
    pub fn columns(&self) -> impl Iterator<Item = (TaskStatus, &[Task])> {
        TaskStatus::ALL
            .into_iter()
            .map(move |status| (status, self.column(status)))
    }

    /// Total number of projected tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.todo.len() + self.in_progress.len() + self.completed.len()
    }

    /// Whether no task was projected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The column `id` was projected into, if any.
    #[must_use]
    pub fn status_of(&self, id: TaskId) -> Option<TaskStatus> {
        self.columns()
            .find(|(_, tasks)| tasks.iter().any(|t| t.id == id))
            .map(|(status, _)| status)
    }
}

/// Whether `task`'s title contains `search`, ignoring case.
/// An empty search matches everything.
#[must_use]
pub fn matches_search(task: &Task, search: &str) -> bool {
    search.is_empty() || task.title.to_lowercase().contains(&search.to_lowercase())
}

/// Partitions `tasks` into columns, keeping only those matching `search`.
#[must_use]
pub fn project(tasks: &[Task], search: &str) -> Board {
    let mut board = Board::default();
    for task in tasks {
        if matches_search(task, search) {
            board.column_mut(task.status).push(task.clone());
        }
    }
    board
}
