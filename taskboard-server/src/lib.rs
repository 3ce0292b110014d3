//! `Taskboard` development server library.
//!
//! Serves the `/tasks` REST resource from memory so the board can be
//! exercised against a real HTTP endpoint.

pub mod config;
pub mod routes;
pub mod store;
