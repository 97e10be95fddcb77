//! Git adapter: the version-control backend.
//!
//! Every call goes through [`Shell`], so each command and its output lands in
//! the session log.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument, warn};

use crate::core::commit_log::LOG_FORMAT;
use crate::core::types::IdentityRecord;
use crate::io::process::{CommandOutput, Invocation};
use crate::io::shell::Shell;

/// Wrapper for executing git commands in a working directory.
#[derive(Clone, Copy)]
pub struct Git<'a> {
    shell: Shell<'a>,
    workdir: &'a Path,
}

impl<'a> Git<'a> {
    pub fn new(shell: Shell<'a>, workdir: &'a Path) -> Self {
        Self { shell, workdir }
    }

    pub fn workdir(&self) -> &Path {
        self.workdir
    }

    /// Global `user.name` / `user.email`; unset keys come back as `None`.
    pub fn global_identity(&self) -> Result<IdentityRecord> {
        Ok(IdentityRecord {
            name: self.global_value("user.name")?,
            email: self.global_value("user.email")?,
        })
    }

    #[instrument(skip_all)]
    pub fn set_global_identity(&self, name: &str, email: &str) -> Result<()> {
        self.run_checked(&["config", "--global", "user.name", name])?;
        self.run_checked(&["config", "--global", "user.email", email])?;
        Ok(())
    }

    /// True if the working directory is the top level of its own work tree.
    pub fn is_repository(&self) -> Result<bool> {
        if !self.workdir.is_dir() {
            return Ok(false);
        }
        let out = self.run(&["rev-parse", "--show-toplevel"])?;
        if !out.success() {
            return Ok(false);
        }
        // A work tree belonging to a parent directory is not ours.
        let toplevel = fs::canonicalize(out.stdout.trim())
            .with_context(|| format!("resolve {}", out.stdout.trim()))?;
        let workdir = fs::canonicalize(self.workdir)
            .with_context(|| format!("resolve {}", self.workdir.display()))?;
        if toplevel != workdir {
            debug!(toplevel = %toplevel.display(), "working directory is nested in another repository");
            return Ok(false);
        }
        Ok(true)
    }

    /// `git init`; a no-op on an existing repository.
    #[instrument(skip_all)]
    pub fn init(&self) -> Result<()> {
        self.run_checked(&["init"])?;
        Ok(())
    }

    /// URL of the named remote, or `None` if it is not configured.
    pub fn remote_url(&self, remote: &str) -> Result<Option<String>> {
        let out = self.run(&["remote", "get-url", remote])?;
        if out.success() {
            let url = out.stdout.trim();
            return Ok((!url.is_empty()).then(|| url.to_string()));
        }
        if out.code == Some(2) || out.stderr.contains("No such remote") {
            return Ok(None);
        }
        bail!("git remote get-url {remote} failed: {}", out.error_text());
    }

    pub fn add_remote(&self, remote: &str, url: &str) -> Result<()> {
        self.run_checked(&["remote", "add", remote, url])?;
        Ok(())
    }

    pub fn set_remote_url(&self, remote: &str, url: &str) -> Result<()> {
        self.run_checked(&["remote", "set-url", remote, url])?;
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Commit staged changes. Nothing to commit is an error carrying git's
    /// own text.
    #[instrument(skip_all)]
    pub fn commit(&self, message: &str) -> Result<()> {
        self.run_checked(&["commit", "-m", message])?;
        Ok(())
    }

    /// Current branch name; works before the first commit.
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_checked(&["symbolic-ref", "--short", "HEAD"])?;
        let name = out.stdout.trim().to_string();
        if name.is_empty() {
            warn!("detached HEAD detected");
            bail!("detached HEAD (refuse to push)");
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Push `branch` to `remote` and set upstream. Never forced.
    #[instrument(skip_all, fields(remote, branch))]
    pub fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_checked(&["push", "-u", remote, branch])?;
        Ok(())
    }

    /// Raw delimited log, oldest first. An unborn branch yields an empty log.
    pub fn log_raw(&self) -> Result<String> {
        let format = format!("--pretty=format:{LOG_FORMAT}");
        let out = self.run(&["log", "--reverse", &format])?;
        if out.success() {
            return Ok(out.stdout);
        }
        if out.stderr.contains("does not have any commits") {
            debug!("no commits yet");
            return Ok(String::new());
        }
        bail!("git log failed: {}", out.error_text());
    }

    fn global_value(&self, key: &str) -> Result<Option<String>> {
        let out = self.run(&["config", "--global", "--get", key])?;
        let value = out.stdout.trim();
        Ok((out.success() && !value.is_empty()).then(|| value.to_string()))
    }

    fn invocation(&self, args: &[&str]) -> Invocation {
        Invocation::new("git", args.iter().copied()).in_dir(self.workdir)
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        self.shell.run(&self.invocation(args))
    }

    fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        self.shell.run_checked(&self.invocation(args))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::process::Command;

    use super::*;
    use crate::io::process::SystemRunner;
    use crate::io::session_log::SessionLog;
    use crate::io::shell::CommandFailed;

    fn git_available() -> bool {
        which::which("git").is_ok()
    }

    fn configure_local_identity(dir: &Path) {
        for (key, value) in [("user.name", "Test"), ("user.email", "test@example.com")] {
            let status = Command::new("git")
                .args(["config", key, value])
                .current_dir(dir)
                .status()
                .expect("git config");
            assert!(status.success());
        }
    }

    #[test]
    fn init_is_idempotent_and_remote_round_trips() {
        if !git_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        let work = temp.path().join("work");
        fs::create_dir_all(&work).expect("mkdir");
        let git = Git::new(Shell::new(&SystemRunner, &log), &work);

        assert!(!git.is_repository().expect("probe"));
        git.init().expect("init");
        git.init().expect("init again");
        assert!(git.is_repository().expect("probe"));

        assert_eq!(git.remote_url("origin").expect("get-url"), None);
        git.add_remote("origin", "git@github.com:me/demo.git")
            .expect("add remote");
        git.set_remote_url("origin", "https://github.com/me/demo.git")
            .expect("set-url");
        assert_eq!(
            git.remote_url("origin").expect("get-url").as_deref(),
            Some("https://github.com/me/demo.git")
        );
        assert!(log.commands().iter().any(|c| c == "git init"));
    }

    #[test]
    fn directory_inside_a_parent_repository_is_not_a_repository() {
        if !git_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        let parent = temp.path().join("parent");
        let project = parent.join("project");
        fs::create_dir_all(&project).expect("mkdir");
        let shell = Shell::new(&SystemRunner, &log);
        Git::new(shell, &parent).init().expect("init parent");

        let git = Git::new(shell, &project);
        assert!(!git.is_repository().expect("inspect"));
        git.init().expect("init nested");
        assert!(git.is_repository().expect("inspect"));
        assert!(project.join(".git").is_dir());
    }

    #[test]
    fn commit_and_log_in_order() {
        if !git_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        let work = temp.path().join("work");
        fs::create_dir_all(&work).expect("mkdir");
        let git = Git::new(Shell::new(&SystemRunner, &log), &work);
        git.init().expect("init");
        configure_local_identity(&work);

        assert_eq!(git.log_raw().expect("empty log"), "");

        fs::write(work.join("a.txt"), "a").expect("write");
        git.add_all().expect("add");
        git.commit("first").expect("commit");
        fs::write(work.join("b.txt"), "b").expect("write");
        git.add_all().expect("add");
        git.commit("second").expect("commit");

        let raw = git.log_raw().expect("log");
        let messages: Vec<&str> = raw
            .lines()
            .map(|l| l.rsplit('|').next().expect("message"))
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert!(!git.current_branch().expect("branch").is_empty());
    }

    #[test]
    fn commit_with_nothing_staged_fails_with_git_text() {
        if !git_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        let work = temp.path().join("work");
        fs::create_dir_all(&work).expect("mkdir");
        let git = Git::new(Shell::new(&SystemRunner, &log), &work);
        git.init().expect("init");
        configure_local_identity(&work);

        let err = git.commit("empty").expect_err("nothing to commit");
        let failed = err.downcast_ref::<CommandFailed>().expect("CommandFailed");
        assert!(failed.detail.contains("nothing"));
    }
}
