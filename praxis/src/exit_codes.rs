//! Stable exit codes of the `praxis` CLI.

/// Command succeeded; a run reached completion.
pub const OK: i32 = 0;
/// Any error: workspace errors, agent failures, invalid config.
pub const FAILED: i32 = 1;
/// `praxis run` spent its iteration budget without completing.
pub const INCOMPLETE: i32 = 2;
/// `praxis run` was cancelled between iterations.
pub const CANCELLED: i32 = 3;
