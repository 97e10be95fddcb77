//! Pure, deterministic logic. No I/O.

pub mod capability;
pub mod commit_log;
pub mod link;
pub mod machine;
pub mod types;
