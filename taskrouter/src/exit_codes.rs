//! Stable exit codes for taskrouter CLI commands.

/// Command succeeded or the workflow reported `DONE`.
pub const OK: i32 = 0;
/// Malformed task, invalid config, or a collaborator failure.
pub const INVALID: i32 = 1;
/// `taskrouter route` stopped an auto-loop on the step cap or an abort request.
pub const STOPPED: i32 = 2;
/// `taskrouter route` named an agent missing from the roster.
pub const UNKNOWN_AGENT: i32 = 3;
