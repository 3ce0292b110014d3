//! Drag-and-drop transition controller.
//!
//! Turns a drag gesture into at most one [`MutationIntent`]. Every status
//! may move directly to every other status. The controller reads the store
//! but never writes to it.

use taskboard_proto::task::{TaskId, TaskStatus, ValidationError};

use crate::engine::{MutationError, MutationIntent};
use crate::store::TaskStore;

/// A task dropped from one column onto another, as column ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragGesture {
    /// Dragged task.
    pub task_id: TaskId,
    /// Column the drag started in.
    pub source: String,
    /// Column the task was dropped on.
    pub destination: String,
}

impl DragGesture {
    /// Creates a gesture.
    pub fn new(task_id: TaskId, source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            task_id,
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Whether moving from `from` to `to` is a permitted transition.
#[must_use]
pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    from != to
}

/// Interprets `gesture` against the current store.
///
/// Returns `Ok(None)` if the gesture would not change the task's column.
///
/// # Errors
///
/// [`MutationError::Validation`] if either column id is unknown,
/// [`MutationError::NotFound`] if the task is not in the store.
pub fn interpret(
    gesture: &DragGesture,
    store: &TaskStore,
) -> Result<Option<MutationIntent>, MutationError> {
    let source: TaskStatus = gesture.source.parse().map_err(ValidationError::from)?;
    let destination: TaskStatus = gesture
        .destination
        .parse()
        .map_err(ValidationError::from)?;

    if source == destination {
        return Ok(None);
    }

    let current = store
        .get(gesture.task_id)
        .ok_or(MutationError::NotFound(gesture.task_id))?
        .status;

    if !can_transition(current, destination) {
        return Ok(None);
    }

    Ok(Some(MutationIntent::Move {
        id: gesture.task_id,
        status: destination,
    }))
}
