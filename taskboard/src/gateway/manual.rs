//! Hand-settled gateway for deterministic concurrency tests.
//!
//! Every call made through [`ManualGateway`] is parked as a [`PendingCall`]
//! on an unbounded channel. The test receives calls in issue order and
//! settles each one whenever it likes, which makes out-of-order settlement
//! reproducible.

use tokio::sync::{mpsc, oneshot};

use taskboard_proto::task::{IdempotencyKey, NewTask, Task, TaskId, TaskPatch};

use super::{Gateway, GatewayError};

/// The request carried by a parked call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// `GET /tasks`.
    List,
    /// `POST /tasks`.
    Create {
        /// Idempotency key of the request.
        key: IdempotencyKey,
        /// Create payload.
        task: NewTask,
    },
    /// `PUT /tasks/{id}`.
    Update {
        /// Target task.
        id: TaskId,
        /// Partial update.
        patch: TaskPatch,
    },
    /// `DELETE /tasks/{id}`.
    Delete {
        /// Target task.
        id: TaskId,
    },
}

#[derive(Debug)]
enum Reply {
    Tasks(Vec<Task>),
    Task(Task),
    Deleted,
    Failed(GatewayError),
}

/// A call waiting to be settled.
///
/// Dropping it without settling fails the caller with a transport error.
#[derive(Debug)]
pub struct PendingCall {
    call: GatewayCall,
    reply: oneshot::Sender<Reply>,
}

impl PendingCall {
    /// The parked request.
    #[must_use]
    pub const fn call(&self) -> &GatewayCall {
        &self.call
    }

    /// Settles a list call.
    pub fn respond_tasks(self, tasks: Vec<Task>) {
        let _ = self.reply.send(Reply::Tasks(tasks));
    }

    /// Settles a create or update call with the server representation.
    pub fn respond_task(self, task: Task) {
        let _ = self.reply.send(Reply::Task(task));
    }

    /// Settles a delete call successfully.
    pub fn respond_deleted(self) {
        let _ = self.reply.send(Reply::Deleted);
    }

    /// Fails the call.
    pub fn fail(self, error: GatewayError) {
        let _ = self.reply.send(Reply::Failed(error));
    }
}

/// [`Gateway`] whose calls are settled by the test driving it.
#[derive(Debug, Clone)]
pub struct ManualGateway {
    calls: mpsc::UnboundedSender<PendingCall>,
}

impl ManualGateway {
    /// Creates a gateway and the receiver on which its calls arrive.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PendingCall>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Self { calls }, rx)
    }

    async fn park(&self, call: GatewayCall) -> Result<Reply, GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.calls
            .send(PendingCall { call, reply })
            .map_err(|_| GatewayError::Transport("gateway receiver closed".to_string()))?;
        match rx.await {
            Ok(Reply::Failed(error)) => Err(error),
            Ok(reply) => Ok(reply),
            Err(_) => Err(GatewayError::Transport("call dropped unsettled".to_string())),
        }
    }
}

fn unexpected(reply: &Reply) -> GatewayError {
    GatewayError::Transport(format!("unexpected reply: {reply:?}"))
}

impl Gateway for ManualGateway {
    async fn list_tasks(&self) -> Result<Vec<Task>, GatewayError> {
        match self.park(GatewayCall::List).await? {
            Reply::Tasks(tasks) => Ok(tasks),
            other => Err(unexpected(&other)),
        }
    }

    async fn create_task(&self, key: IdempotencyKey, task: &NewTask) -> Result<Task, GatewayError> {
        let call = GatewayCall::Create {
            key,
            task: task.clone(),
        };
        match self.park(call).await? {
            Reply::Task(task) => Ok(task),
            other => Err(unexpected(&other)),
        }
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, GatewayError> {
        let call = GatewayCall::Update {
            id,
            patch: patch.clone(),
        };
        match self.park(call).await? {
            Reply::Task(task) => Ok(task),
            other => Err(unexpected(&other)),
        }
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), GatewayError> {
        match self.park(GatewayCall::Delete { id }).await? {
            Reply::Deleted => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}
