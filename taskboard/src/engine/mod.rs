//! Optimistic Mutation Engine.
//!
//! [`Engine`] owns the [`TaskStore`] and is its only writer. Updates, moves
//! and deletes are applied to the store immediately and then confirmed or
//! rolled back when the [`Gateway`] settles; creates wait for the server to
//! assign an id before anything is inserted.
//!
//! Concurrent mutations on the same task are ordered by lineage (see
//! [`lineage`]): a settlement that has been superseded by a newer mutation
//! never touches the store. Every failure is returned to the caller; the
//! only recovery the engine performs on its own is the rollback.

mod intent;
mod lineage;

pub use intent::{MutationIntent, MutationKind};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use taskboard_proto::task::{
    IdempotencyKey, MAX_TASK_TITLE_LENGTH, NewTask, Task, TaskId, TaskPatch, TaskStatus,
    ValidationError,
};

use crate::board::{self, Board};
use crate::drag::{self, DragGesture};
use crate::gateway::{Gateway, GatewayError};
use crate::store::TaskStore;

use lineage::{LineageTracker, Settlement};

/// Errors returned by a failed mutation. The store has already been
/// restored to a consistent state when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// The payload was rejected before reaching the store or the gateway.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The target task is not in the local store.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The remote store rejected the mutation or could not be reached.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl MutationError {
    /// Advisory hint for offering "try again"; see [`GatewayError::is_retryable`].
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway(e) => e.is_retryable(),
            Self::Validation(_) | Self::NotFound(_) => false,
        }
    }
}

/// Store change notification for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    /// A confirmed task was added.
    Inserted(TaskId),
    /// An optimistic change was applied.
    Patched(TaskId),
    /// A task was optimistically removed.
    Removed(TaskId),
    /// A server representation was merged into the store.
    Reconciled(TaskId),
    /// A failed mutation was rolled back.
    RolledBack(TaskId),
    /// The whole store was refreshed from the server.
    Replaced,
}

/// Result of a successfully settled intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// The server created this task.
    Created(Task),
    /// The server's representation after an update or move.
    Updated(Task),
    /// The task was deleted.
    Deleted(TaskId),
}

impl Settled {
    /// The task carried by the settlement, if any.
    #[must_use]
    pub fn into_task(self) -> Option<Task> {
        match self {
            Self::Created(task) | Self::Updated(task) => Some(task),
            Self::Deleted(_) => None,
        }
    }
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum task title length in characters.
    pub max_title_len: usize,
    /// Capacity of the [`BoardEvent`] broadcast channel.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_title_len: MAX_TASK_TITLE_LENGTH,
            event_buffer: 64,
        }
    }
}

struct EngineState {
    store: TaskStore,
    lineage: LineageTracker,
}

/// Applies mutations optimistically and reconciles them with the remote store.
pub struct Engine<G: Gateway> {
    gateway: G,
    state: Mutex<EngineState>,
    events: broadcast::Sender<BoardEvent>,
    config: EngineConfig,
}

impl<G: Gateway> Engine<G> {
    /// Creates an engine with an empty store.
    pub fn new(gateway: G, config: EngineConfig) -> Self {
        Self::with_tasks(gateway, config, Vec::new())
    }

    /// Creates an engine whose store starts as a mirror of `tasks`.
    pub fn with_tasks(gateway: G, config: EngineConfig, tasks: Vec<Task>) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            gateway,
            state: Mutex::new(EngineState {
                store: TaskStore::from_tasks(tasks),
                lineage: LineageTracker::default(),
            }),
            events,
            config,
        }
    }

    /// Subscribes to store change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    /// The gateway this engine talks to.
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Projects the current store into board columns, filtered by `search`.
    pub fn board(&self, search: &str) -> Board {
        board::project(self.state.lock().store.tasks(), search)
    }

    /// A copy of every task in store order.
    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().store.tasks().to_vec()
    }

    /// A copy of one task.
    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.state.lock().store.get(id).cloned()
    }

    /// Number of unsettled mutations targeting `id`.
    pub fn in_flight(&self, id: TaskId) -> usize {
        self.state.lock().lineage.in_flight(id)
    }

    /// Re-fetches every task and reconciles the store with the result.
    ///
    /// The local value wins for any task with a mutation in flight or one
    /// that settled after this refresh started; for tasks still in flight
    /// the listed value becomes the rollback target. Every other task takes
    /// the listed value. Returns the number of tasks held afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Gateway`] if the list call fails; the store
    /// is left untouched.
    pub async fn refresh(&self) -> Result<usize, MutationError> {
        let refresh = PendingRefresh::begin(self);
        let tasks = self
            .gateway
            .list_tasks()
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "task list refresh failed"))?;

        let count = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let started = refresh.started;
            let listed = TaskStore::from_tasks(tasks);

            let mut next = TaskStore::new();
            for task in listed.tasks() {
                if !state.lineage.owns(task.id, started) {
                    next.insert(task.clone());
                } else if let Some(local) = state.store.get(task.id) {
                    next.insert(local.clone());
                }
            }
            for local in state.store.tasks() {
                if !listed.contains(local.id) && state.lineage.owns(local.id, started) {
                    next.insert(local.clone());
                }
            }

            for id in state.lineage.tracked() {
                if !state.lineage.settled_since(id, started) {
                    state.lineage.rebase(id, listed.get(id).cloned());
                }
            }
            state.store = next;
            state.store.len()
        };
        drop(refresh);

        self.emit(BoardEvent::Replaced);
        tracing::info!(count, "board refreshed");
        Ok(count)
    }

    /// Executes any intent.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError`] on validation failure, unknown target, or
    /// gateway failure (after rolling back any optimistic change).
    pub async fn submit(&self, intent: MutationIntent) -> Result<Settled, MutationError> {
        tracing::debug!(kind = %intent.kind(), target = ?intent.target(), "intent submitted");
        match intent {
            MutationIntent::Create { key, task } => {
                self.create(key, task).await.map(Settled::Created)
            }
            MutationIntent::Update { id, patch } => self
                .patch(id, patch, MutationKind::Update)
                .await
                .map(Settled::Updated),
            MutationIntent::Move { id, status } => self
                .patch(id, TaskPatch::status_only(status), MutationKind::Move)
                .await
                .map(Settled::Updated),
            MutationIntent::Delete { id } => self.delete(id).await.map(|()| Settled::Deleted(id)),
        }
    }

    /// Creates a task. Nothing is inserted until the server assigns an id.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Validation`] or [`MutationError::Gateway`].
    pub async fn submit_create(&self, task: NewTask) -> Result<Task, MutationError> {
        self.create(IdempotencyKey::new(), task).await
    }

    /// Creates a task with a caller-held idempotency key.
    ///
    /// Re-submitting with the key of a create whose outcome was ambiguous
    /// lets the server return the original task instead of a duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Validation`] or [`MutationError::Gateway`].
    pub async fn submit_create_with_key(
        &self,
        key: IdempotencyKey,
        task: NewTask,
    ) -> Result<Task, MutationError> {
        self.create(key, task).await
    }

    /// Edits fields of a task optimistically.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError`]; on gateway failure the edit is rolled back.
    pub async fn submit_update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, MutationError> {
        self.patch(id, patch, MutationKind::Update).await
    }

    /// Moves a task to another column optimistically.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError`]; on gateway failure the move is rolled back.
    pub async fn submit_move(&self, id: TaskId, status: TaskStatus) -> Result<Task, MutationError> {
        self.patch(id, TaskPatch::status_only(status), MutationKind::Move)
            .await
    }

    /// Deletes a task optimistically.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError`]; on gateway failure the task is restored.
    pub async fn submit_delete(&self, id: TaskId) -> Result<(), MutationError> {
        self.delete(id).await
    }

    /// Interprets a drag gesture and submits the resulting move, if any.
    ///
    /// Returns `Ok(None)` when the gesture does not change the task's
    /// column; no gateway call is made in that case.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Validation`] for unknown columns,
    /// [`MutationError::NotFound`] for unknown tasks, or the move's error.
    pub async fn submit_drag(&self, gesture: &DragGesture) -> Result<Option<Task>, MutationError> {
        let intent = {
            let state = self.state.lock();
            drag::interpret(gesture, &state.store)?
        };
        let Some(intent) = intent else {
            tracing::debug!(task_id = %gesture.task_id, "drag without column change ignored");
            return Ok(None);
        };
        self.submit(intent).await.map(Settled::into_task)
    }

    fn emit(&self, event: BoardEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn create(&self, key: IdempotencyKey, task: NewTask) -> Result<Task, MutationError> {
        task.validate(self.config.max_title_len)?;
        tracing::debug!(%key, status = %task.status, "sending create");

        let created = self
            .gateway
            .create_task(key, &task)
            .await
            .inspect_err(|e| tracing::warn!(%key, error = %e, "create rejected"))?;

        let id = created.id;
        let replaced = {
            let mut state = self.state.lock();
            state.lineage.record_settled(id);
            state.store.insert(created.clone())
        };
        if replaced.is_some() {
            self.emit(BoardEvent::Reconciled(id));
        } else {
            self.emit(BoardEvent::Inserted(id));
        }
        tracing::info!(task_id = %id, "task created");
        Ok(created)
    }

    async fn patch(
        &self,
        id: TaskId,
        patch: TaskPatch,
        kind: MutationKind,
    ) -> Result<Task, MutationError> {
        patch.validate(self.config.max_title_len)?;
        let pending = self.begin_patch(id, &patch, kind)?;
        tracing::debug!(task_id = %id, seq = pending.seq, %kind, "optimistic change applied");

        let result = self
            .gateway
            .update_task(id, &patch)
            .await
            .and_then(|task| {
                if task.id == id {
                    Ok(task)
                } else {
                    Err(GatewayError::Transport(format!(
                        "server returned task {} for task {id}",
                        task.id
                    )))
                }
            });

        match result {
            Ok(task) => {
                pending.confirm(Some(task.clone()));
                Ok(task)
            }
            Err(e) => Err(pending.reject(e)),
        }
    }

    async fn delete(&self, id: TaskId) -> Result<(), MutationError> {
        let pending = self.begin_delete(id)?;
        tracing::debug!(task_id = %id, seq = pending.seq, "optimistic delete applied");

        match self.gateway.delete_task(id).await {
            Ok(()) => {
                pending.confirm(None);
                Ok(())
            }
            Err(e) => Err(pending.reject(e)),
        }
    }

    fn begin_patch(
        &self,
        id: TaskId,
        patch: &TaskPatch,
        kind: MutationKind,
    ) -> Result<PendingMutation<'_, G>, MutationError> {
        let seq = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if !state.store.contains(id) {
                return Err(MutationError::NotFound(id));
            }
            let seq = state.lineage.begin(id, &state.store);
            state.store.apply_patch(id, patch);
            seq
        };
        self.emit(BoardEvent::Patched(id));
        Ok(PendingMutation::new(self, id, seq, kind))
    }

    fn begin_delete(&self, id: TaskId) -> Result<PendingMutation<'_, G>, MutationError> {
        let seq = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if !state.store.contains(id) {
                return Err(MutationError::NotFound(id));
            }
            let seq = state.lineage.begin(id, &state.store);
            state.store.remove_by_id(id);
            seq
        };
        self.emit(BoardEvent::Removed(id));
        Ok(PendingMutation::new(self, id, seq, MutationKind::Delete))
    }

    fn settle_success(&self, id: TaskId, seq: u64, kind: MutationKind, confirmed: Option<Task>) {
        let applied = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match state.lineage.confirm(id, seq, confirmed) {
                Settlement::Apply(snapshot) => {
                    snapshot.restore(&mut state.store);
                    true
                }
                Settlement::Ignore => false,
            }
        };

        if applied {
            self.emit(BoardEvent::Reconciled(id));
            tracing::info!(task_id = %id, seq, %kind, "mutation confirmed");
        } else {
            tracing::debug!(task_id = %id, seq, %kind, "superseded mutation confirmed");
        }
    }

    fn settle_failure(
        &self,
        id: TaskId,
        seq: u64,
        kind: MutationKind,
        error: GatewayError,
    ) -> MutationError {
        if self.roll_back(id, seq) {
            tracing::warn!(task_id = %id, seq, %kind, error = %error, "mutation failed, rolled back");
        } else {
            tracing::debug!(task_id = %id, seq, %kind, error = %error, "superseded mutation failed");
        }
        MutationError::Gateway(error)
    }

    fn settle_abandoned(&self, id: TaskId, seq: u64, kind: MutationKind) {
        if self.roll_back(id, seq) {
            tracing::warn!(task_id = %id, seq, %kind, "mutation abandoned, rolled back");
        } else {
            tracing::debug!(task_id = %id, seq, %kind, "superseded mutation abandoned");
        }
    }

    /// Settles `seq` as rejected; returns whether the store was restored.
    fn roll_back(&self, id: TaskId, seq: u64) -> bool {
        let rolled_back = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match state.lineage.reject(id, seq) {
                Settlement::Apply(snapshot) => {
                    snapshot.restore(&mut state.store);
                    true
                }
                Settlement::Ignore => false,
            }
        };
        if rolled_back {
            self.emit(BoardEvent::RolledBack(id));
        }
        rolled_back
    }
}

/// An optimistic mutation awaiting its gateway response.
///
/// Dropping it unsettled (the submitting future was cancelled) settles the
/// mutation as rejected, so the lineage entry is released and the store
/// rolls back if this was the latest mutation for the task.
struct PendingMutation<'a, G: Gateway> {
    engine: &'a Engine<G>,
    id: TaskId,
    seq: u64,
    kind: MutationKind,
    settled: bool,
}

impl<'a, G: Gateway> PendingMutation<'a, G> {
    const fn new(engine: &'a Engine<G>, id: TaskId, seq: u64, kind: MutationKind) -> Self {
        Self {
            engine,
            id,
            seq,
            kind,
            settled: false,
        }
    }

    fn confirm(mut self, confirmed: Option<Task>) {
        self.settled = true;
        self.engine.settle_success(self.id, self.seq, self.kind, confirmed);
    }

    fn reject(mut self, error: GatewayError) -> MutationError {
        self.settled = true;
        self.engine.settle_failure(self.id, self.seq, self.kind, error)
    }
}

impl<G: Gateway> Drop for PendingMutation<'_, G> {
    fn drop(&mut self) {
        if !self.settled {
            self.engine.settle_abandoned(self.id, self.seq, self.kind);
        }
    }
}

/// A refresh whose list call is outstanding. Unregisters itself on drop.
struct PendingRefresh<'a, G: Gateway> {
    engine: &'a Engine<G>,
    started: u64,
}

impl<'a, G: Gateway> PendingRefresh<'a, G> {
    fn begin(engine: &'a Engine<G>) -> Self {
        let started = engine.state.lock().lineage.begin_refresh();
        Self { engine, started }
    }
}

impl<G: Gateway> Drop for PendingRefresh<'_, G> {
    fn drop(&mut self) {
        self.engine.state.lock().lineage.end_refresh(self.started);
    }
}
