//! Stable exit codes for the agent CLI.

/// A generated parser passed its tests.
pub const OK: i32 = 0;
/// Every attempt in the budget failed its tests.
pub const EXHAUSTED: i32 = 1;
/// The run aborted: invalid configuration, missing credential, generation
/// failure, or a filesystem error.
pub const FATAL: i32 = 2;
