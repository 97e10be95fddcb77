//! Take a local project to a hosted git repository.
//!
//! One run probes the external tools, resolves the operator's choices,
//! optionally delegates to a recorder or a container, reconciles local and
//! hosted repository state, commits and pushes, and writes a commit-history
//! visualization.
//!
//! - **[`core`]**: pure, deterministic logic (link derivation, reconciliation
//!   planning, the workflow state machine, commit-log parsing).
//! - **[`io`]**: side effects (processes, files, prompts, the git / gh /
//!   docker / asciinema backends), behind seams that tests replace.
//!
//! [`workflow`] coordinates the two; [`reconcile`] and [`history`] are the
//! components it drives.

pub mod collect;
pub mod core;
pub mod exit_codes;
pub mod history;
pub mod io;
pub mod logging;
pub mod reconcile;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
