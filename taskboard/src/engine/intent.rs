//! Mutation intents: transient requests consumed by the engine.

use std::fmt;

use taskboard_proto::task::{IdempotencyKey, NewTask, TaskId, TaskPatch, TaskStatus};

/// A requested change to the board.
///
/// Constructed by a caller, consumed by [`Engine::submit`](super::Engine::submit),
/// discarded after settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationIntent {
    /// Create a task. Not applied locally until the server assigns an id.
    Create {
        /// Idempotency key sent with the request.
        key: IdempotencyKey,
        /// Create payload.
        task: NewTask,
    },
    /// Edit fields of an existing task.
    Update {
        /// Target task.
        id: TaskId,
        /// Fields to change.
        patch: TaskPatch,
    },
    /// Reassign a task to another column.
    Move {
        /// Target task.
        id: TaskId,
        /// Destination column.
        status: TaskStatus,
    },
    /// Delete a task.
    Delete {
        /// Target task.
        id: TaskId,
    },
}

impl MutationIntent {
    /// A create intent with a fresh idempotency key.
    #[must_use]
    pub fn create(task: NewTask) -> Self {
        Self::Create {
            key: IdempotencyKey::new(),
            task,
        }
    }

    /// The kind of mutation.
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Create { .. } => MutationKind::Create,
            Self::Update { .. } => MutationKind::Update,
            Self::Move { .. } => MutationKind::Move,
            Self::Delete { .. } => MutationKind::Delete,
        }
    }

    /// The target task, absent for creates.
    #[must_use]
    pub const fn target(&self) -> Option<TaskId> {
        match self {
            Self::Create { .. } => None,
            Self::Update { id, .. } | Self::Move { id, .. } | Self::Delete { id } => Some(*id),
        }
    }
}

/// Discriminant of a [`MutationIntent`], used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Create.
    Create,
    /// Field edit.
    Update,
    /// Status change.
    Move,
    /// Delete.
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Move => write!(f, "move"),
            Self::Delete => write!(f, "delete"),
        }
    }
}
