//! Praxis: a multi-agent task-decomposition runner.
//!
//! An orchestrator breaks an objective into sub-tasks, a sub-agent executes
//! each one, and a refiner synthesizes the final output, which may describe a
//! file tree that is then written into the workspace.
//!
//! - **[`core`]**: pure logic (task ledger, completion detection, refiner
//!   output parsing, naming). No I/O.
//! - **[`io`]**: side effects (workspace store, records, materializer, prompt
//!   rendering, the agent process boundary).
//! - **[`agents`]**: one wrapper per agent role.
//!
//! Orchestration lives in [`looping`], [`objective`], [`chat`] and [`tools`].

pub mod agents;
pub mod chat;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod objective;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
