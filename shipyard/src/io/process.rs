//! Child process execution behind the [`CommandRunner`] seam.
//!
//! Every backend (git, gh, docker, asciinema) goes through a `CommandRunner`,
//! so tests can swap in a scripted runner without spawning anything.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Bytes of stdout/stderr kept per stream; the rest is drained and dropped.
pub const OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// A single external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Kill the child after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            timeout: None,
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Shell-quoted command line, as written to the session log.
    pub fn command_line(&self) -> String {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        match shlex::try_join(words) {
            Ok(line) => line,
            Err(_) => {
                let mut line = self.program.clone();
                for arg in &self.args {
                    line.push(' ');
                    line.push_str(arg);
                }
                line
            }
        }
    }

    /// True if `program args...` starts with the given words.
    pub fn starts_with(&self, words: &[&str]) -> bool {
        let mut argv = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        words.iter().all(|w| argv.next() == Some(*w))
    }
}

/// Captured child process output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal or timeout.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.timed_out
    }

    /// Backend's own error text: stderr, or stdout when stderr is empty.
    pub fn error_text(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Abstraction over spawning external programs.
pub trait CommandRunner {
    /// Resolve a program on `PATH`.
    fn locate(&self, program: &str) -> Option<PathBuf>;

    /// Run to completion with stdin closed and output captured.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Run attached to the terminal (interactive login, recording, container).
    /// Returns the exit code, `None` if the child was killed by a signal.
    fn run_attached(&self, invocation: &Invocation) -> Result<Option<i32>>;
}

/// Runner that spawns real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    #[instrument(skip_all, fields(program = %invocation.program, timeout = ?invocation.timeout))]
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let mut cmd = build_command(invocation);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("spawning child process");
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                error!(err = %e, "failed to spawn command");
                return Err(e).with_context(|| format!("spawn {}", invocation.program));
            }
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;

        // Drain both pipes while the child runs so a chatty child cannot deadlock.
        let stdout_handle = thread::spawn(move || read_stream_limited(stdout, OUTPUT_LIMIT_BYTES));
        let stderr_handle = thread::spawn(move || read_stream_limited(stderr, OUTPUT_LIMIT_BYTES));

        let mut timed_out = false;
        let status = match invocation.timeout {
            Some(timeout) => match child.wait_timeout(timeout).context("wait for command")? {
                Some(status) => status,
                None => {
                    warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
                    timed_out = true;
                    child.kill().context("kill command")?;
                    child.wait().context("wait command after kill")?
                }
            },
            None => child.wait().context("wait for command")?,
        };

        let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
        let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;
        if stdout_truncated > 0 || stderr_truncated > 0 {
            warn!(stdout_truncated, stderr_truncated, "output truncated");
        }

        debug!(exit_code = ?status.code(), timed_out, "command finished");
        Ok(CommandOutput {
            code: if timed_out { None } else { status.code() },
            stdout: with_truncation_notice(stdout, stdout_truncated),
            stderr: with_truncation_notice(stderr, stderr_truncated),
            timed_out,
        })
    }

    #[instrument(skip_all, fields(program = %invocation.program))]
    fn run_attached(&self, invocation: &Invocation) -> Result<Option<i32>> {
        let status = build_command(invocation)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("spawn {}", invocation.program))?;
        debug!(exit_code = ?status.code(), "attached command finished");
        Ok(status.code())
    }
}

fn build_command(invocation: &Invocation) -> Command {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args);
    if let Some(dir) = &invocation.cwd {
        cmd.current_dir(dir);
    }
    cmd
}

fn with_truncation_notice(bytes: Vec<u8>, truncated: usize) -> String {
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if truncated > 0 {
        text.push_str(&format!("\n[truncated {truncated} bytes]\n"));
    }
    text
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
