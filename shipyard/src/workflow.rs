//! Workflow Orchestrator.
//!
//! Drives the run through [`WorkflowState`]s:
//!
//! ```text
//! Start → ProbeTools → DecideRecording → ResolveConfiguration → {DecideIsolation}
//!       → EnsureIdentity → Reconcile → StageCommitPush → ExtractHistory
//!       → EmitVisualization → Completed
//! ```
//!
//! Only the orchestrator makes policy decisions. Each step either advances,
//! finishes the run through a delegate (recorder or container), or aborts with
//! the backend's raw error text.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::capability::Capabilities;
use crate::core::link::ReconcilePolicy;
use crate::core::machine::{StateTrail, WorkflowState};
use crate::core::types::{
    IsolationMode, RepositoryLinkState, ToolId, suggest_repository_name, validate_repository_name,
};
use crate::exit_codes;
use crate::history;
use crate::io::git::Git;
use crate::io::hosting::GhCli;
use crate::io::isolation::{CONTAINER_WORKDIR, ContainerExit, Docker};
use crate::io::probe;
use crate::io::process::CommandRunner;
use crate::io::prompt::Prompter;
use crate::io::recorder::{Asciinema, Recording};
use crate::io::shell::{CommandFailed, Shell};
use crate::reconcile::{ORIGIN, Reconciler};
use crate::session::Session;

/// Operator choices for one run, as given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub path: Option<PathBuf>,
    pub repo: Option<String>,
    pub message: Option<String>,
    pub auto: bool,
    pub no_record: bool,
    pub no_isolation: bool,
    pub sync_remote_url: bool,
    pub mode: IsolationMode,
}

impl RunOptions {
    /// `run` flags reproducing these options, minus recording and isolation
    /// markers (the delegating caller adds those).
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.path {
            args.push("--path".to_string());
            args.push(path.display().to_string());
        }
        if let Some(repo) = &self.repo {
            args.push("--repo".to_string());
            args.push(repo.clone());
        }
        if let Some(message) = &self.message {
            args.push("--message".to_string());
            args.push(message.clone());
        }
        if self.auto {
            args.push("--auto".to_string());
        }
        if self.no_isolation {
            args.push("--no-isolation".to_string());
        }
        if self.sync_remote_url {
            args.push("--sync-remote-url".to_string());
        }
        args
    }
}

/// Which delegate finished the run on our behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delegate {
    Recorder,
    Container,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Raw error text, backend output included.
    pub message: String,
    pub exit_code: i32,
}

/// What a run did and how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowReport {
    pub trail: StateTrail,
    /// State observed after reconciliation, if the run got that far.
    pub link_state: Option<RepositoryLinkState>,
    /// Path of the visualization page, if one was written.
    pub artifact: Option<PathBuf>,
    pub delegated_to: Option<Delegate>,
    pub warnings: Vec<String>,
    pub failure: Option<Failure>,
}

impl WorkflowReport {
    pub fn state(&self) -> WorkflowState {
        self.trail.current()
    }

    pub fn exit_code(&self) -> i32 {
        match &self.failure {
            Some(failure) => failure.exit_code,
            None if self.state() == WorkflowState::Completed => exit_codes::OK,
            None => exit_codes::INVALID,
        }
    }
}

/// Values resolved during `ResolveConfiguration`.
#[derive(Debug, Clone)]
struct Resolved {
    working_path: PathBuf,
    repository_name: String,
    use_isolation: bool,
}

enum Flow {
    Continue,
    Finished,
}

/// Run the workflow once. Errors are reserved for internal faults; every
/// backend failure is reported through [`WorkflowReport::failure`].
pub fn run_workflow(
    session: &Session,
    runner: &dyn CommandRunner,
    prompter: &dyn Prompter,
    options: &RunOptions,
) -> Result<WorkflowReport> {
    let program = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("shipyard"));
    Workflow::new(session, runner, prompter, options, program).run()
}

struct Workflow<'a> {
    session: &'a Session,
    shell: Shell<'a>,
    prompter: &'a dyn Prompter,
    options: &'a RunOptions,
    /// This executable, re-invoked under the recorder.
    program: PathBuf,
    trail: StateTrail,
    capabilities: Capabilities,
    resolved: Option<Resolved>,
    link_state: Option<RepositoryLinkState>,
    /// Reconcile actions that failed, with the backend's text.
    reconcile_failures: Vec<String>,
    artifact: Option<PathBuf>,
    delegated_to: Option<Delegate>,
    failure: Option<Failure>,
}

impl<'a> Workflow<'a> {
    fn new(
        session: &'a Session,
        runner: &'a dyn CommandRunner,
        prompter: &'a dyn Prompter,
        options: &'a RunOptions,
        program: PathBuf,
    ) -> Self {
        Self {
            session,
            shell: Shell::new(runner, session.log()),
            prompter,
            options,
            program,
            trail: StateTrail::default(),
            capabilities: Capabilities::default(),
            resolved: None,
            link_state: None,
            reconcile_failures: Vec::new(),
            artifact: None,
            delegated_to: None,
            failure: None,
        }
    }

    #[instrument(skip_all, fields(mode = ?self.options.mode))]
    fn run(mut self) -> Result<WorkflowReport> {
        let steps: [(WorkflowState, fn(&mut Self) -> Result<Flow>); 8] = [
            (WorkflowState::ProbeTools, Self::probe_tools),
            (WorkflowState::DecideRecording, Self::decide_recording),
            (WorkflowState::ResolveConfiguration, Self::resolve_configuration),
            (WorkflowState::DecideIsolation, Self::decide_isolation),
            (WorkflowState::EnsureIdentity, Self::ensure_identity),
            (WorkflowState::Reconcile, Self::reconcile),
            (WorkflowState::StageCommitPush, Self::stage_commit_push),
            (WorkflowState::ExtractHistory, Self::extract_and_emit),
        ];

        for (state, step) in steps {
            if state == WorkflowState::DecideIsolation
                && self.options.mode == IsolationMode::Isolated
            {
                continue;
            }
            self.trail.advance(state)?;
            debug!(state = %state, "entering step");
            if let Flow::Finished = step(&mut self)? {
                break;
            }
        }
        if !self.trail.current().is_terminal() {
            self.trail.advance(WorkflowState::Completed)?;
        }
        info!(state = %self.trail.current(), "workflow finished");

        Ok(WorkflowReport {
            trail: self.trail,
            link_state: self.link_state,
            artifact: self.artifact,
            delegated_to: self.delegated_to,
            warnings: self.session.log().warnings(),
            failure: self.failure,
        })
    }

    fn abort(&mut self, message: String, exit_code: i32) -> Result<Flow> {
        warn!(exit_code, "workflow aborted");
        self.session.log().warn(&message);
        self.failure = Some(Failure { message, exit_code });
        self.trail.advance(WorkflowState::Aborted)?;
        Ok(Flow::Finished)
    }

    /// Abort with an error, propagating a backend's exit code when there is one.
    fn abort_with(&mut self, context: &str, err: &anyhow::Error) -> Result<Flow> {
        self.abort(format!("{context}: {err:#}"), exit_code_of(err))
    }

    fn resolved(&self) -> Result<&Resolved> {
        self.resolved
            .as_ref()
            .context("configuration was not resolved before this step")
    }

    // ── Steps ──

    fn probe_tools(&mut self) -> Result<Flow> {
        self.capabilities = probe::probe_all(self.shell, self.session.settings().probe_timeout());
        let missing = self.capabilities.missing_mandatory();
        if let Some(tool) = missing.first() {
            return self.abort(
                format!("{tool} is required but was not found on PATH"),
                exit_codes::INVALID,
            );
        }
        Ok(Flow::Continue)
    }

    fn decide_recording(&mut self) -> Result<Flow> {
        let settings = self.session.settings();
        if self.options.mode == IsolationMode::Isolated
            || self.options.no_record
            || !settings.recording.enabled
            || !self.capabilities.has(ToolId::Asciinema)
        {
            debug!("recording not applicable");
            return Ok(Flow::Continue);
        }

        let mut argv = vec![
            self.program.display().to_string(),
            "run".to_string(),
            "--no-record".to_string(),
        ];
        argv.extend(self.options.to_args());
        let command = shlex::try_join(argv.iter().map(String::as_str))
            .unwrap_or_else(|_| argv.join(" "));

        let cast = &self.session.paths().cast_path;
        match Asciinema::new(self.shell).record_if_absent(cast, &command) {
            Ok(Recording::AlreadyRecorded) => {
                self.session.log().note(&format!(
                    "{} already exists; continuing without recording",
                    cast.display()
                ));
                Ok(Flow::Continue)
            }
            Ok(Recording::Recorded { exit }) => {
                self.delegated_to = Some(Delegate::Recorder);
                match exit {
                    Some(0) => {
                        self.trail.advance(WorkflowState::Completed)?;
                        Ok(Flow::Finished)
                    }
                    other => self.abort(
                        format!("recorded run failed ({})", describe_exit(other)),
                        other.unwrap_or(exit_codes::INVALID),
                    ),
                }
            }
            Err(err) => {
                self.session
                    .log()
                    .warn(&format!("recording unavailable, running unrecorded: {err:#}"));
                Ok(Flow::Continue)
            }
        }
    }

    fn resolve_configuration(&mut self) -> Result<Flow> {
        let store = self.session.config();
        let launch_dir = self.session.paths().root.clone();
        let saved = store.load();

        let working_path = match &self.options.path {
            Some(path) => path.clone(),
            None => {
                let default = saved.working_path.clone().unwrap_or_else(|| launch_dir.clone());
                let answer = match self
                    .prompter
                    .ask("Project path", Some(&default.display().to_string()))
                {
                    Ok(answer) => answer,
                    Err(err) => return self.abort_with("project path", &err),
                };
                PathBuf::from(answer)
            }
        };
        let working_path = if working_path.is_absolute() {
            working_path
        } else {
            launch_dir.join(working_path)
        };
        if !working_path.is_dir() {
            return self.abort(
                format!("project path {} is not a directory", working_path.display()),
                exit_codes::INVALID,
            );
        }
        let same_project = saved.working_path.as_deref() == Some(working_path.as_path());
        store.update(|cfg| cfg.working_path = Some(working_path.clone()))?;
        self.session
            .log()
            .note(&format!("working in {}", working_path.display()));

        let use_isolation = self.options.mode == IsolationMode::Host
            && !self.options.no_isolation
            && self.capabilities.has(ToolId::Docker)
            && match self.prompter.confirm(
                "Run inside docker for full isolation?",
                self.session.settings().isolation.enabled,
            ) {
                Ok(choice) => choice,
                Err(err) => return self.abort_with("isolation choice", &err),
            };

        let repository_name = match &self.options.repo {
            Some(repo) => repo.clone(),
            None => {
                let default = saved
                    .repository_name
                    .clone()
                    .filter(|_| same_project)
                    .unwrap_or_else(|| {
                        let base = working_path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        suggest_repository_name(&base)
                    });
                match self.prompter.ask("Repository name", Some(&default)) {
                    Ok(answer) => answer,
                    Err(err) => return self.abort_with("repository name", &err),
                }
            }
        };
        if let Err(err) = validate_repository_name(&repository_name) {
            return self.abort(format!("{err:#}"), exit_codes::INVALID);
        }
        store.update(|cfg| cfg.repository_name = Some(repository_name.clone()))?;
        store.update(|cfg| cfg.last_run_timestamp = Some(Utc::now()))?;

        self.resolved = Some(Resolved {
            working_path,
            repository_name,
            use_isolation,
        });
        Ok(Flow::Continue)
    }

    fn decide_isolation(&mut self) -> Result<Flow> {
        let resolved = self.resolved()?.clone();
        if !resolved.use_isolation {
            debug!("isolation not requested");
            return Ok(Flow::Continue);
        }

        let settings = &self.session.settings().isolation;
        let log = self.session.log();
        let dockerfile = resolved.working_path.join(&settings.dockerfile);
        if !dockerfile.is_file() {
            log.warn(&format!(
                "no {} in {}; running natively",
                settings.dockerfile,
                resolved.working_path.display()
            ));
            return Ok(Flow::Continue);
        }

        let docker = Docker::new(self.shell);
        if let Err(err) = docker.build(&settings.image, &dockerfile, &resolved.working_path) {
            log.warn(&format!("isolation build failed, running natively: {err:#}"));
            return Ok(Flow::Continue);
        }

        let command = self.container_command(&resolved);
        match docker.run(
            &settings.image,
            &resolved.working_path,
            self.prompter.is_interactive(),
            &command,
        ) {
            Ok(ContainerExit::Workflow(0)) => {
                self.delegated_to = Some(Delegate::Container);
                self.trail.advance(WorkflowState::Completed)?;
                Ok(Flow::Finished)
            }
            Ok(ContainerExit::Workflow(code)) => {
                self.delegated_to = Some(Delegate::Container);
                self.abort(format!("isolated workflow exited with code {code}"), code)
            }
            Ok(ContainerExit::DockerFailed(code)) => {
                log.warn(&format!(
                    "docker could not run the image ({}); running natively",
                    describe_exit(code)
                ));
                Ok(Flow::Continue)
            }
            Err(err) => {
                log.warn(&format!("docker run failed, running natively: {err:#}"));
                Ok(Flow::Continue)
            }
        }
    }

    fn container_command(&self, resolved: &Resolved) -> Vec<String> {
        let mut command = vec![
            self.session.settings().isolation.command.clone(),
            "run".to_string(),
            "--isolated".to_string(),
            "--no-record".to_string(),
            "--path".to_string(),
            CONTAINER_WORKDIR.to_string(),
            "--repo".to_string(),
            resolved.repository_name.clone(),
        ];
        if let Some(message) = &self.options.message {
            command.push("--message".to_string());
            command.push(message.clone());
        }
        if self.options.auto {
            command.push("--auto".to_string());
        }
        if self.options.sync_remote_url {
            command.push("--sync-remote-url".to_string());
        }
        command
    }

    fn ensure_identity(&mut self) -> Result<Flow> {
        let working_path = self.resolved()?.working_path.clone();
        let git = Git::new(self.shell, &working_path);
        let identity = match git.global_identity() {
            Ok(identity) => identity,
            Err(err) => return self.abort_with("read git identity", &err),
        };
        if identity.is_complete() {
            return Ok(Flow::Continue);
        }

        let name = match identity.name {
            Some(name) => name,
            None => match self.prompter.ask("Git user.name", None) {
                Ok(name) => name,
                Err(err) => return self.abort_with("git identity", &err),
            },
        };
        let email = match identity.email {
            Some(email) => email,
            None => match self.prompter.ask("Git user.email", None) {
                Ok(email) => email,
                Err(err) => return self.abort_with("git identity", &err),
            },
        };
        if let Err(err) = git.set_global_identity(&name, &email) {
            return self.abort_with("write git identity", &err);
        }
        Ok(Flow::Continue)
    }

    fn reconcile(&mut self) -> Result<Flow> {
        let resolved = self.resolved()?.clone();
        let settings = self.session.settings();
        let gh = GhCli::new(self.shell, &resolved.working_path);
        let hosting = self.hosting_ready(gh).then_some(gh);

        let outcome = Reconciler::new(
            Git::new(self.shell, &resolved.working_path),
            hosting,
            self.session.log(),
            ReconcilePolicy {
                sync_remote_url: self.options.sync_remote_url || settings.hosting.sync_remote_url,
            },
            settings.hosting.visibility,
        )
        .reconcile(&resolved.repository_name);
        self.link_state = Some(outcome.state);
        self.reconcile_failures = outcome.failures.into_iter().map(|(_, text)| text).collect();
        Ok(Flow::Continue)
    }

    /// Whether hosting lookups can be made: installed and authenticated,
    /// logging in interactively when needed.
    fn hosting_ready(&self, gh: GhCli<'_>) -> bool {
        if !self.capabilities.has(ToolId::Gh) {
            return false;
        }
        let log = self.session.log();
        match gh.is_authenticated() {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => {
                log.warn(&format!("gh auth status failed: {err:#}"));
                return false;
            }
        }
        if !self.prompter.is_interactive() {
            log.warn("gh is not authenticated; remote repository handling skipped");
            return false;
        }
        match gh.login() {
            Ok(true) => true,
            Ok(false) => {
                log.warn("gh login did not complete; remote repository handling skipped");
                false
            }
            Err(err) => {
                log.warn(&format!("gh login failed: {err:#}"));
                false
            }
        }
    }

    fn stage_commit_push(&mut self) -> Result<Flow> {
        let working_path = self.resolved()?.working_path.clone();
        let git = Git::new(self.shell, &working_path);

        if let Err(err) = git.add_all() {
            return self.abort_with("stage changes", &err);
        }
        let message = match &self.options.message {
            Some(message) => message.clone(),
            None => {
                let default = self.session.settings().default_commit_message.clone();
                match self.prompter.ask("Commit message", Some(&default)) {
                    Ok(message) => message,
                    Err(err) => return self.abort_with("commit message", &err),
                }
            }
        };
        if let Err(err) = git.commit(&message) {
            return self.abort_with("commit", &err);
        }

        let branch = match git.current_branch() {
            Ok(branch) => branch,
            Err(err) => return self.abort_with("resolve branch", &err),
        };
        // Push regardless of link state; git reports a missing remote itself.
        if let Err(err) = git.push(ORIGIN, &branch) {
            let mut lines = vec![format!("push: {err:#}")];
            if self.link_state != Some(RepositoryLinkState::Linked) {
                let state = self
                    .link_state
                    .map_or_else(|| "unknown".to_string(), |s| s.to_string());
                lines.push(format!("repository state after reconciliation: {state}"));
                lines.extend(self.reconcile_failures.iter().cloned());
            }
            return self.abort(lines.join("\n"), exit_code_of(&err));
        }
        Ok(Flow::Continue)
    }

    /// ExtractHistory then EmitVisualization. Failures here are warnings: the
    /// push already happened.
    fn extract_and_emit(&mut self) -> Result<Flow> {
        let resolved = self.resolved()?.clone();
        let log = self.session.log();
        let git = Git::new(self.shell, &resolved.working_path);

        let records = match history::extract(&git, log) {
            Ok(records) => records,
            Err(err) => {
                log.warn(&format!("commit history unavailable: {err:#}"));
                return Ok(Flow::Continue);
            }
        };

        self.trail.advance(WorkflowState::EmitVisualization)?;
        let title = history::page_title(&resolved.repository_name);
        match history::emit(&records, &resolved.working_path, title) {
            Ok(page) => {
                log.note(&format!("commit visualization written to {}", page.display()));
                self.artifact = Some(page);
            }
            Err(err) => log.warn(&format!("visualization failed: {err:#}")),
        }
        Ok(Flow::Continue)
    }
}

/// A backend's own exit code when the error carries one.
fn exit_code_of(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CommandFailed>()
        .map_or(exit_codes::INVALID, CommandFailed::exit_code)
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit {code}"),
        None => "terminated".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_args_round_trips_operator_flags() {
        let options = RunOptions {
            path: Some(PathBuf::from("/work/demo")),
            repo: Some("me/demo".to_string()),
            message: Some("first commit".to_string()),
            auto: true,
            no_record: true,
            no_isolation: false,
            sync_remote_url: true,
            mode: IsolationMode::Host,
        };
        assert_eq!(
            options.to_args(),
            vec![
                "--path",
                "/work/demo",
                "--repo",
                "me/demo",
                "--message",
                "first commit",
                "--auto",
                "--sync-remote-url",
            ]
        );
    }

    #[test]
    fn exit_code_follows_failure_then_state() {
        let mut trail = StateTrail::default();
        trail.advance(WorkflowState::ProbeTools).expect("advance");
        trail.advance(WorkflowState::Aborted).expect("advance");
        let report = WorkflowReport {
            trail,
            link_state: None,
            artifact: None,
            delegated_to: None,
            warnings: Vec::new(),
            failure: Some(Failure {
                message: "push: rejected".to_string(),
                exit_code: 128,
            }),
        };
        assert_eq!(report.exit_code(), 128);
        assert_eq!(report.state(), WorkflowState::Aborted);
    }
}
