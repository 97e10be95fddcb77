//! Stable exit codes for the shipyard CLI.
//!
//! A failed push exits with the push command's own code, and a delegated run
//! (recording or container) with the delegate's code; these constants cover
//! everything else.

/// Workflow completed, or a query command succeeded.
pub const OK: i32 = 0;
/// Invalid input or settings, a missing mandatory tool, or any other error.
pub const INVALID: i32 = 1;
