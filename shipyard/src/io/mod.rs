//! Side-effecting adapters: processes, files, prompts and the four backends.

pub mod config;
pub mod git;
pub mod hosting;
pub mod isolation;
pub mod probe;
pub mod process;
pub mod prompt;
pub mod recorder;
pub mod session_log;
pub mod settings;
pub mod shell;
pub mod visualization;
