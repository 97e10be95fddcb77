//! Logged command execution shared by every backend.

use std::path::PathBuf;

use anyhow::Result;
use thiserror::Error;

use crate::io::process::{CommandOutput, CommandRunner, Invocation};
use crate::io::session_log::SessionLog;

/// A backend command exited unsuccessfully.
///
/// `detail` is the backend's own error text, unmodified, so the operator can
/// look it up against the tool's documentation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{command}` failed ({}): {detail}", exit_label(.code))]
pub struct CommandFailed {
    pub command: String,
    pub code: Option<i32>,
    pub detail: String,
}

impl CommandFailed {
    /// Exit code to propagate to our own caller.
    pub fn exit_code(&self) -> i32 {
        match self.code {
            Some(code) if code != 0 => code,
            _ => 1,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit {code}"),
        None => "terminated".to_string(),
    }
}

/// Runs invocations through a [`CommandRunner`] and records each one in the
/// session log together with its output.
#[derive(Clone, Copy)]
pub struct Shell<'a> {
    runner: &'a dyn CommandRunner,
    log: &'a SessionLog,
}

impl<'a> Shell<'a> {
    pub fn new(runner: &'a dyn CommandRunner, log: &'a SessionLog) -> Self {
        Self { runner, log }
    }

    pub fn log(&self) -> &'a SessionLog {
        self.log
    }

    pub fn locate(&self, program: &str) -> Option<PathBuf> {
        self.runner.locate(program)
    }

    /// Run and capture, whatever the exit status.
    pub fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.log.command(&invocation.command_line());
        let output = match self.runner.run(invocation) {
            Ok(output) => output,
            Err(err) => {
                self.log.warn(&format!("{err:#}"));
                return Err(err);
            }
        };
        self.log.output(&output.stdout);
        self.log.output(&output.stderr);
        if output.timed_out {
            self.log.warn(&format!(
                "`{}` timed out and was stopped",
                invocation.command_line()
            ));
        }
        Ok(output)
    }

    /// Run and capture; a non-zero exit becomes [`CommandFailed`].
    pub fn run_checked(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let output = self.run(invocation)?;
        if !output.success() {
            return Err(CommandFailed {
                command: invocation.command_line(),
                code: output.code,
                detail: output.error_text().to_string(),
            }
            .into());
        }
        Ok(output)
    }

    /// Run attached to the terminal. Output is not captured, only the status.
    pub fn run_attached(&self, invocation: &Invocation) -> Result<Option<i32>> {
        self.log.command(&invocation.command_line());
        let code = match self.runner.run_attached(invocation) {
            Ok(code) => code,
            Err(err) => {
                self.log.warn(&format!("{err:#}"));
                return Err(err);
            }
        };
        self.log.note(&format!(
            "`{}` finished ({})",
            invocation.program,
            exit_label(&code)
        ));
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBackends;

    #[test]
    fn failed_command_keeps_raw_backend_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        let fake = FakeBackends::new();
        fake.init_repository();
        fake.fail_push(1, "! [rejected]        main -> main (fetch first)");
        let shell = Shell::new(&fake, &log);

        let err = shell
            .run_checked(&Invocation::new("git", ["push", "-u", "origin", "main"]))
            .expect_err("push should fail");
        let failed = err.downcast_ref::<CommandFailed>().expect("CommandFailed");
        assert_eq!(failed.exit_code(), 1);
        assert_eq!(failed.detail, "! [rejected]        main -> main (fetch first)");
        assert!(err.to_string().contains("(fetch first)"));
        assert_eq!(log.commands(), vec!["git push -u origin main"]);
    }

    #[test]
    fn exit_code_never_reports_success() {
        let failed = CommandFailed {
            command: "git push".to_string(),
            code: None,
            detail: "killed".to_string(),
        };
        assert_eq!(failed.exit_code(), 1);
        assert!(failed.to_string().contains("terminated"));
    }
}
