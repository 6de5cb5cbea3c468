//! Stable exit codes for learnstack CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid config, input files or other errors.
pub const INVALID: i32 = 1;
/// No API key was supplied and none was found in the environment.
pub const MISSING_CREDENTIAL: i32 = 2;
