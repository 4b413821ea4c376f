//! Stable exit codes for the `startapps` binary.

/// Run completed and documents were written.
pub const OK: i32 = 0;
/// Run aborted on a fatal error (bad input, unloadable app, I/O failure).
pub const FAILED: i32 = 1;
