//! Remote Gateway abstraction for `Taskboard`.
//!
//! Defines the [`Gateway`] trait through which the engine reaches the
//! authoritative task store. Concrete implementations include:
//! - [`memory::InMemoryGateway`]: in-process authoritative store with failure injection
//! - [`manual::ManualGateway`]: parks every call until it is settled by hand (tests)
//!
//! Transport, retries and authentication belong to implementations; the
//! engine only sees success values and [`GatewayError`].

pub mod manual;
pub mod memory;

use taskboard_proto::task::{IdempotencyKey, NewTask, Task, TaskId, TaskPatch};

/// Failure reported by the remote store or the path to it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The remote store answered with a non-success status.
    #[error("{message}")]
    Rejected {
        /// HTTP-style status code.
        status: u16,
        /// Message from the response body, surfaced verbatim.
        message: String,
    },

    /// The request never produced a response (network error, timeout).
    #[error("transport failure: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Shorthand for a [`GatewayError::Rejected`].
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// HTTP-style status, if the remote store answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }

    /// Human-readable message to show the end user.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Rejected { message, .. } | Self::Transport(message) => message,
        }
    }

    /// Advisory hint for callers deciding whether to offer "try again".
    ///
    /// Transport failures, 408, 429 and 5xx are considered retryable. The
    /// engine itself never retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => matches!(*status, 408 | 429 | 500..=599),
        }
    }
}

/// Async interface to the authoritative task store.
///
/// Maps onto the REST resource `GET /tasks`, `POST /tasks`,
/// `PUT /tasks/{id}` and `DELETE /tasks/{id}`.
pub trait Gateway: Send + Sync {
    /// Fetch every task.
    fn list_tasks(&self) -> impl Future<Output = Result<Vec<Task>, GatewayError>> + Send;

    /// Create a task; the returned task carries the server-assigned id.
    ///
    /// A repeated `key` must return the task created by the first request.
    fn create_task(
        &self,
        key: IdempotencyKey,
        task: &NewTask,
    ) -> impl Future<Output = Result<Task, GatewayError>> + Send;

    /// Apply a partial update; returns the server's full representation.
    fn update_task(
        &self,
        id: TaskId,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<Task, GatewayError>> + Send;

    /// Delete a task.
    fn delete_task(&self, id: TaskId) -> impl Future<Output = Result<(), GatewayError>> + Send;
}
