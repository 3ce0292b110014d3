//! Integration tests for optimistic mutations, rollback and settlement
//! ordering across concurrent mutations of the same task.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;

use taskboard::engine::{BoardEvent, Engine, EngineConfig, MutationError};
use taskboard::gateway::GatewayError;
use taskboard::gateway::manual::{GatewayCall, ManualGateway, PendingCall};
use taskboard::gateway::memory::InMemoryGateway;
use taskboard_proto::task::{IdempotencyKey, NewTask, Task, TaskId, TaskPatch, TaskStatus};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn task(id: u64, title: &str, status: TaskStatus) -> Task {
    Task {
        id: TaskId::new(id),
        title: title.to_string(),
        description: None,
        status,
        priority: None,
        due_date: None,
    }
}

fn manual(tasks: Vec<Task>) -> (Arc<Engine<ManualGateway>>, UnboundedReceiver<PendingCall>) {
    let (gateway, calls) = ManualGateway::new();
    let engine = Arc::new(Engine::with_tasks(gateway, EngineConfig::default(), tasks));
    (engine, calls)
}

fn status_of(engine: &Engine<ManualGateway>, id: u64) -> Option<TaskStatus> {
    engine.task(TaskId::new(id)).map(|t| t.status)
}

/// Issues a move on a background task and waits until its gateway call is
/// parked, so the optimistic change is already visible.
async fn spawn_move(
    engine: &Arc<Engine<ManualGateway>>,
    calls: &mut UnboundedReceiver<PendingCall>,
    id: u64,
    status: TaskStatus,
) -> (
    tokio::task::JoinHandle<Result<Task, MutationError>>,
    PendingCall,
) {
    let e = Arc::clone(engine);
    let handle = tokio::spawn(async move { e.submit_move(TaskId::new(id), status).await });
    let call = calls.recv().await.expect("move call parked");
    assert_eq!(
        call.call(),
        &GatewayCall::Update {
            id: TaskId::new(id),
            patch: TaskPatch::status_only(status),
        }
    );
    (handle, call)
}

/// Starts a refresh on a background task and waits until its list call is
/// parked.
async fn spawn_refresh(
    engine: &Arc<Engine<ManualGateway>>,
    calls: &mut UnboundedReceiver<PendingCall>,
) -> (
    tokio::task::JoinHandle<Result<usize, MutationError>>,
    PendingCall,
) {
    let e = Arc::clone(engine);
    let handle = tokio::spawn(async move { e.refresh().await });
    let call = calls.recv().await.expect("list call parked");
    assert_eq!(call.call(), &GatewayCall::List);
    (handle, call)
}

fn ids(engine: &Engine<ManualGateway>) -> Vec<u64> {
    engine.tasks().iter().map(|t| t.id.get()).collect()
}

// ---------------------------------------------------------------------------
// Rollback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_move_rolls_back_fully() {
    let tasks = vec![task(1, "A", TaskStatus::Todo)];
    let gateway = InMemoryGateway::with_tasks(tasks.clone());
    let engine = Engine::with_tasks(gateway, EngineConfig::default(), tasks);

    engine
        .gateway()
        .fail_next(GatewayError::rejected(500, "database unavailable"));
    let err = engine
        .submit_move(TaskId::new(1), TaskStatus::Completed)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "database unavailable");
    let board = engine.board("");
    assert_eq!(board.todo.len(), 1);
    assert!(board.completed.is_empty());
    assert_eq!(engine.in_flight(TaskId::new(1)), 0);
}

#[tokio::test]
async fn failed_delete_restores_task_to_its_column() {
    let tasks = vec![
        task(1, "A", TaskStatus::Todo),
        task(2, "B", TaskStatus::InProgress),
    ];
    let gateway = InMemoryGateway::with_tasks(tasks.clone());
    let engine = Engine::with_tasks(gateway, EngineConfig::default(), tasks.clone());

    engine
        .gateway()
        .fail_next(GatewayError::Transport("connection reset".to_string()));
    let err = engine.submit_delete(TaskId::new(2)).await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(engine.board("").in_progress, vec![tasks[1].clone()]);
    assert_eq!(engine.tasks(), tasks);
}

#[tokio::test]
async fn optimistic_state_is_visible_before_settlement() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (handle, call) = spawn_move(&engine, &mut calls, 1, TaskStatus::InProgress).await;
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::InProgress));
    assert_eq!(engine.in_flight(TaskId::new(1)), 1);

    call.fail(GatewayError::rejected(422, "invalid transition"));
    let err = handle.await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "invalid transition");
    assert!(!err.is_retryable());
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Todo));
}

#[tokio::test]
async fn reconciles_with_server_representation() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (handle, call) = spawn_move(&engine, &mut calls, 1, TaskStatus::InProgress).await;
    // The server computed a different title.
    call.respond_task(task(1, "A (started)", TaskStatus::InProgress));
    handle.await.unwrap().unwrap();

    assert_eq!(
        engine.task(TaskId::new(1)).unwrap().title,
        "A (started)"
    );
}

#[tokio::test]
async fn mismatched_server_id_rolls_back() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (handle, call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;
    call.respond_task(task(2, "A", TaskStatus::Completed));
    let err = handle.await.unwrap().unwrap_err();

    assert!(matches!(err, MutationError::Gateway(GatewayError::Transport(_))));
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Todo));
    assert!(engine.task(TaskId::new(2)).is_none());
}

// ---------------------------------------------------------------------------
// Newer mutation wins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn older_failure_after_newer_success_is_ignored() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (first, first_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::InProgress).await;
    let (second, second_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;
    assert_eq!(engine.in_flight(TaskId::new(1)), 2);

    second_call.respond_task(task(1, "A", TaskStatus::Completed));
    second.await.unwrap().unwrap();
    first_call.fail(GatewayError::rejected(500, "boom"));
    first.await.unwrap().unwrap_err();

    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Completed));
    assert_eq!(engine.in_flight(TaskId::new(1)), 0);
}

#[tokio::test]
async fn older_failure_before_newer_success_is_ignored() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (first, first_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::InProgress).await;
    let (second, second_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;

    first_call.fail(GatewayError::rejected(500, "boom"));
    first.await.unwrap().unwrap_err();
    // The stale rollback must not erase the newer optimistic move.
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Completed));

    second_call.respond_task(task(1, "A", TaskStatus::Completed));
    second.await.unwrap().unwrap();
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Completed));
}

#[tokio::test]
async fn older_success_after_newer_success_is_ignored() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (first, first_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::InProgress).await;
    let (second, second_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;

    second_call.respond_task(task(1, "A", TaskStatus::Completed));
    second.await.unwrap().unwrap();
    first_call.respond_task(task(1, "A", TaskStatus::InProgress));
    first.await.unwrap().unwrap();

    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Completed));
}

#[tokio::test]
async fn newer_failure_rolls_back_to_older_confirmed_state() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (first, first_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::InProgress).await;
    let (second, second_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;

    first_call.respond_task(task(1, "A", TaskStatus::InProgress));
    first.await.unwrap().unwrap();
    // Superseded confirmation leaves the optimistic value in place.
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Completed));

    second_call.fail(GatewayError::rejected(409, "conflict"));
    second.await.unwrap().unwrap_err();
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::InProgress));
}

#[tokio::test]
async fn late_older_success_after_newer_failure_is_applied() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (first, first_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::InProgress).await;
    let (second, second_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;

    second_call.fail(GatewayError::rejected(409, "conflict"));
    second.await.unwrap().unwrap_err();
    // Nothing is confirmed yet, so the rollback target is the original state.
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Todo));

    first_call.respond_task(task(1, "A", TaskStatus::InProgress));
    first.await.unwrap().unwrap();
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::InProgress));
}

#[tokio::test]
async fn both_failing_restore_original() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (first, first_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::InProgress).await;
    let (second, second_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;

    second_call.fail(GatewayError::Transport("timeout".to_string()));
    first_call.fail(GatewayError::Transport("timeout".to_string()));
    second.await.unwrap().unwrap_err();
    first.await.unwrap().unwrap_err();

    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Todo));
}

#[tokio::test]
async fn rollback_of_one_task_keeps_edits_to_another() {
    let (engine, mut calls) = manual(vec![
        task(1, "A", TaskStatus::Todo),
        task(2, "B", TaskStatus::Todo),
    ]);

    let (first, first_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;
    let (second, second_call) = spawn_move(&engine, &mut calls, 2, TaskStatus::InProgress).await;

    second_call.respond_task(task(2, "B", TaskStatus::InProgress));
    second.await.unwrap().unwrap();
    first_call.fail(GatewayError::rejected(500, "boom"));
    first.await.unwrap().unwrap_err();

    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Todo));
    assert_eq!(status_of(&engine, 2), Some(TaskStatus::InProgress));
}

#[tokio::test]
async fn delete_superseding_move_wins() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (first, first_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::InProgress).await;

    let e = Arc::clone(&engine);
    let delete = tokio::spawn(async move { e.submit_delete(TaskId::new(1)).await });
    let delete_call = calls.recv().await.unwrap();
    assert_eq!(delete_call.call(), &GatewayCall::Delete { id: TaskId::new(1) });
    assert!(engine.task(TaskId::new(1)).is_none());

    first_call.respond_task(task(1, "A", TaskStatus::InProgress));
    first.await.unwrap().unwrap();
    assert!(engine.task(TaskId::new(1)).is_none());

    delete_call.respond_deleted();
    delete.await.unwrap().unwrap();
    assert!(engine.tasks().is_empty());
}

#[tokio::test]
async fn mutation_on_removed_task_is_not_found() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let e = Arc::clone(&engine);
    let delete = tokio::spawn(async move { e.submit_delete(TaskId::new(1)).await });
    let delete_call = calls.recv().await.unwrap();

    let err = engine
        .submit_update(TaskId::new(1), TaskPatch::title("renamed"))
        .await
        .unwrap_err();
    assert_eq!(err, MutationError::NotFound(TaskId::new(1)));

    delete_call.respond_deleted();
    delete.await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_inserts_exactly_one_server_task() {
    let (engine, mut calls) = manual(vec![]);

    let e = Arc::clone(&engine);
    let handle = tokio::spawn(async move {
        e.submit_create(NewTask::new("B").with_status(TaskStatus::Todo))
            .await
    });
    let call = calls.recv().await.unwrap();
    // Nothing provisional is inserted while the create is pending.
    assert!(engine.tasks().is_empty());
    assert!(matches!(call.call(), GatewayCall::Create { task, .. } if task.title == "B"));

    call.respond_task(task(42, "B", TaskStatus::Todo));
    let created = handle.await.unwrap().unwrap();

    assert_eq!(created.id, TaskId::new(42));
    let tasks = engine.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, TaskId::new(42));
    assert_eq!(tasks[0].title, "B");
}

#[tokio::test]
async fn failed_create_leaves_store_untouched() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);
    let mut events = engine.subscribe();

    let e = Arc::clone(&engine);
    let handle = tokio::spawn(async move { e.submit_create(NewTask::new("B")).await });
    calls
        .recv()
        .await
        .unwrap()
        .fail(GatewayError::rejected(400, "title is required"));

    let err = handle.await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "title is required");
    assert_eq!(engine.tasks().len(), 1);
    assert!(matches!(events.try_recv(), Err(tokio::sync::broadcast::error::TryRecvError::Empty)));
}

#[tokio::test]
async fn retried_create_with_same_key_does_not_duplicate() {
    let engine = Engine::new(InMemoryGateway::new(), EngineConfig::default());
    let key = IdempotencyKey::new();

    let first = engine
        .submit_create_with_key(key, NewTask::new("B"))
        .await
        .unwrap();
    let second = engine
        .submit_create_with_key(key, NewTask::new("B"))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.tasks().len(), 1);
    assert_eq!(engine.gateway().tasks().len(), 1);
}

#[tokio::test]
async fn invalid_payloads_never_reach_the_gateway() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let long = "x".repeat(300);
    assert!(matches!(
        engine.submit_create(NewTask::new(long.clone())).await,
        Err(MutationError::Validation(_))
    ));
    assert!(matches!(
        engine.submit_update(TaskId::new(1), TaskPatch::title(long)).await,
        Err(MutationError::Validation(_))
    ));
    assert!(matches!(
        engine.submit_update(TaskId::new(1), TaskPatch::default()).await,
        Err(MutationError::Validation(_))
    ));

    assert!(matches!(calls.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(engine.task(TaskId::new(1)).unwrap().title, "A");
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_keeps_in_flight_edits_and_rebases_them() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (first, first_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;

    let e = Arc::clone(&engine);
    let refresh = tokio::spawn(async move { e.refresh().await });
    let list_call = calls.recv().await.unwrap();
    assert_eq!(list_call.call(), &GatewayCall::List);
    list_call.respond_tasks(vec![
        task(1, "A (server)", TaskStatus::InProgress),
        task(2, "B", TaskStatus::Todo),
    ]);
    assert_eq!(refresh.await.unwrap().unwrap(), 2);

    // Local optimistic value survives the refresh.
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Completed));
    assert_eq!(status_of(&engine, 2), Some(TaskStatus::Todo));

    first_call.fail(GatewayError::rejected(500, "boom"));
    first.await.unwrap().unwrap_err();

    // Rollback lands on the refreshed server state, not the stale snapshot.
    let restored = engine.task(TaskId::new(1)).unwrap();
    assert_eq!(restored.status, TaskStatus::InProgress);
    assert_eq!(restored.title, "A (server)");
}

#[tokio::test]
async fn move_confirmed_during_refresh_survives_stale_list() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (refresh, list_call) = spawn_refresh(&engine, &mut calls).await;
    let (moved, move_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;
    move_call.respond_task(task(1, "A", TaskStatus::Completed));
    moved.await.unwrap().unwrap();
    assert_eq!(engine.in_flight(TaskId::new(1)), 0);

    // Produced before the move reached the server.
    list_call.respond_tasks(vec![task(1, "A", TaskStatus::Todo)]);
    assert_eq!(refresh.await.unwrap().unwrap(), 1);
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Completed));
}

#[tokio::test]
async fn delete_confirmed_during_refresh_is_not_resurrected() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (refresh, list_call) = spawn_refresh(&engine, &mut calls).await;
    let e = Arc::clone(&engine);
    let delete = tokio::spawn(async move { e.submit_delete(TaskId::new(1)).await });
    calls.recv().await.unwrap().respond_deleted();
    delete.await.unwrap().unwrap();

    list_call.respond_tasks(vec![task(1, "A", TaskStatus::Todo)]);
    assert_eq!(refresh.await.unwrap().unwrap(), 0);
    assert!(engine.tasks().is_empty());
}

#[tokio::test]
async fn create_confirmed_during_refresh_is_kept() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (refresh, list_call) = spawn_refresh(&engine, &mut calls).await;
    let e = Arc::clone(&engine);
    let create = tokio::spawn(async move { e.submit_create(NewTask::new("B")).await });
    calls
        .recv()
        .await
        .unwrap()
        .respond_task(task(42, "B", TaskStatus::Todo));
    create.await.unwrap().unwrap();
    assert_eq!(ids(&engine), vec![1, 42]);

    list_call.respond_tasks(vec![task(1, "A", TaskStatus::Todo)]);
    assert_eq!(refresh.await.unwrap().unwrap(), 2);
    assert_eq!(ids(&engine), vec![1, 42]);
}

#[tokio::test]
async fn refresh_started_after_settlement_takes_listed_value() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (moved, move_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;
    move_call.respond_task(task(1, "A", TaskStatus::Completed));
    moved.await.unwrap().unwrap();

    // Another client moved it back in the meantime.
    let (refresh, list_call) = spawn_refresh(&engine, &mut calls).await;
    list_call.respond_tasks(vec![task(1, "A", TaskStatus::InProgress)]);
    refresh.await.unwrap().unwrap();
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::InProgress));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn aborted_move_rolls_back_and_releases_lineage() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);
    let mut events = engine.subscribe();

    let (handle, _call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Todo));
    assert_eq!(engine.in_flight(TaskId::new(1)), 0);
    assert_eq!(events.try_recv().unwrap(), BoardEvent::Patched(TaskId::new(1)));
    assert_eq!(events.try_recv().unwrap(), BoardEvent::RolledBack(TaskId::new(1)));

    // Nothing is left in flight, so a refresh takes the listed value.
    let (refresh, list_call) = spawn_refresh(&engine, &mut calls).await;
    list_call.respond_tasks(vec![task(1, "A", TaskStatus::InProgress)]);
    refresh.await.unwrap().unwrap();
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::InProgress));
}

#[tokio::test]
async fn aborted_older_move_leaves_newer_in_place() {
    let (engine, mut calls) = manual(vec![task(1, "A", TaskStatus::Todo)]);

    let (first, _first_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::InProgress).await;
    let (second, second_call) = spawn_move(&engine, &mut calls, 1, TaskStatus::Completed).await;

    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Completed));
    assert_eq!(engine.in_flight(TaskId::new(1)), 1);

    second_call.respond_task(task(1, "A", TaskStatus::Completed));
    second.await.unwrap().unwrap();
    assert_eq!(status_of(&engine, 1), Some(TaskStatus::Completed));
    assert_eq!(engine.in_flight(TaskId::new(1)), 0);
}

#[tokio::test]
async fn events_announce_every_store_change() {
    let tasks = vec![task(1, "A", TaskStatus::Todo)];
    let engine = Engine::with_tasks(
        InMemoryGateway::with_tasks(tasks.clone()),
        EngineConfig::default(),
        tasks,
    );
    let mut events = engine.subscribe();

    engine
        .submit_move(TaskId::new(1), TaskStatus::InProgress)
        .await
        .unwrap();
    let created = engine.submit_create(NewTask::new("B")).await.unwrap();
    engine.submit_delete(TaskId::new(1)).await.unwrap();
    engine.refresh().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            BoardEvent::Patched(TaskId::new(1)),
            BoardEvent::Reconciled(TaskId::new(1)),
            BoardEvent::Inserted(created.id),
            BoardEvent::Removed(TaskId::new(1)),
            BoardEvent::Reconciled(TaskId::new(1)),
            BoardEvent::Replaced,
        ]
    );
}
