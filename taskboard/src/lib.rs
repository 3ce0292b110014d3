//! `Taskboard` -- Kanban board state with optimistic remote sync.
//!
//! The [`engine::Engine`] owns the local [`store::TaskStore`], applies
//! mutations before the remote store confirms them and rolls them back when
//! it refuses. [`board::project`] derives the column view and
//! [`drag::interpret`] turns drag gestures into move intents.

pub mod board;
pub mod config;
pub mod drag;
pub mod engine;
pub mod gateway;
pub mod shell;
pub mod snapshot;
pub mod store;
