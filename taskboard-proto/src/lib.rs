//! Shared task model and JSON wire types for `Taskboard`.

pub mod codec;
pub mod task;
