//! Deterministic, pure logic shared by the decomposition loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod artifact;
pub mod cancel;
pub mod completion;
pub mod ledger;
pub mod naming;
pub mod types;
