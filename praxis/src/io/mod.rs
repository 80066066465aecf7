//! Side-effecting operations (filesystem, child processes, prompt rendering).
//!
//! Everything here is scoped by explicit paths; nothing changes the process
//! working directory.

pub mod config;
pub mod fs_util;
pub mod generator;
pub mod materialize;
pub mod process;
pub mod prompt;
pub mod records;
pub mod workspace_store;
