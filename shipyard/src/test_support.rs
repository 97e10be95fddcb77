//! Test-only doubles: a simulated git/gh/docker/asciinema world, a scripted
//! prompter, and a throwaway session.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tempfile::TempDir;

use crate::core::types::{IdentityRecord, ToolId};
use crate::io::process::{CommandOutput, CommandRunner, Invocation};
use crate::io::prompt::Prompter;
use crate::io::settings::Settings;
use crate::session::Session;
use crate::workflow::RunOptions;

const HOSTING_OWNER: &str = "fake-user";
const NOT_A_REPOSITORY: &str =
    "fatal: not a git repository (or any of the parent directories): .git";

#[derive(Debug)]
struct World {
    installed: BTreeSet<ToolId>,
    authenticated: bool,
    login_succeeds: bool,
    identity: IdentityRecord,
    initialized: bool,
    origin: Option<String>,
    branch: String,
    /// Working tree has changes not yet staged.
    dirty: bool,
    staged: bool,
    commits: Vec<String>,
    commit_log: Option<String>,
    hosted: BTreeMap<String, String>,
    hosting_failure: Option<String>,
    create_failure: Option<(i32, String)>,
    push_failure: Option<(i32, String)>,
    graphql_response: Option<String>,
    docker_build_failure: Option<(i32, String)>,
    docker_run_exit: Option<i32>,
    recorder_exit: Option<i32>,
    invocations: Vec<Invocation>,
}

impl Default for World {
    fn default() -> Self {
        Self {
            installed: [ToolId::Git, ToolId::Gh].into_iter().collect(),
            authenticated: true,
            login_succeeds: true,
            identity: IdentityRecord {
                name: Some("Fake Author".to_string()),
                email: Some("fake@example.com".to_string()),
            },
            initialized: false,
            origin: None,
            branch: "main".to_string(),
            dirty: true,
            staged: false,
            commits: Vec::new(),
            commit_log: None,
            hosted: BTreeMap::new(),
            hosting_failure: None,
            create_failure: None,
            push_failure: None,
            graphql_response: None,
            docker_build_failure: None,
            docker_run_exit: Some(0),
            recorder_exit: Some(0),
            invocations: Vec::new(),
        }
    }
}

/// [`CommandRunner`] that simulates the four backends in memory and records
/// every invocation.
///
/// Defaults: git and gh installed, gh authenticated, a global identity set,
/// no local repository, no hosted repositories, and uncommitted changes in
/// the working tree.
#[derive(Debug, Default)]
pub struct FakeBackends {
    world: RefCell<World>,
}

impl FakeBackends {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Setup ──

    pub fn install(&self, tool: ToolId) {
        self.world.borrow_mut().installed.insert(tool);
    }

    pub fn uninstall(&self, tool: ToolId) {
        self.world.borrow_mut().installed.remove(&tool);
    }

    pub fn log_out(&self, login_succeeds: bool) {
        let mut world = self.world.borrow_mut();
        world.authenticated = false;
        world.login_succeeds = login_succeeds;
    }

    pub fn clear_identity(&self) {
        self.world.borrow_mut().identity = IdentityRecord::default();
    }

    pub fn init_repository(&self) {
        self.world.borrow_mut().initialized = true;
    }

    pub fn set_origin(&self, url: &str) {
        let mut world = self.world.borrow_mut();
        world.initialized = true;
        world.origin = Some(url.to_string());
    }

    /// Nothing left to stage or commit.
    pub fn set_clean(&self) {
        self.world.borrow_mut().dirty = false;
    }

    /// Replace the generated commit log with raw `git log` output.
    pub fn set_commit_log(&self, raw: &str) {
        self.world.borrow_mut().commit_log = Some(raw.to_string());
    }

    pub fn host_repository(&self, name: &str, url: &str) {
        self.world
            .borrow_mut()
            .hosted
            .insert(name.to_string(), url.to_string());
    }

    /// Every `gh repo view` fails with `stderr`.
    pub fn fail_hosting_queries(&self, stderr: &str) {
        self.world.borrow_mut().hosting_failure = Some(stderr.to_string());
    }

    pub fn fail_repo_create(&self, code: i32, stderr: &str) {
        self.world.borrow_mut().create_failure = Some((code, stderr.to_string()));
    }

    pub fn fail_push(&self, code: i32, stderr: &str) {
        self.world.borrow_mut().push_failure = Some((code, stderr.to_string()));
    }

    pub fn set_graphql_response(&self, json: &str) {
        self.world.borrow_mut().graphql_response = Some(json.to_string());
    }

    pub fn fail_docker_build(&self, code: i32, stderr: &str) {
        self.world.borrow_mut().docker_build_failure = Some((code, stderr.to_string()));
    }

    pub fn set_docker_run_exit(&self, code: Option<i32>) {
        self.world.borrow_mut().docker_run_exit = code;
    }

    pub fn set_recorder_exit(&self, code: Option<i32>) {
        self.world.borrow_mut().recorder_exit = code;
    }

    // ── Inspection ──

    pub fn invocations(&self) -> Vec<Invocation> {
        self.world.borrow().invocations.clone()
    }

    /// Every invocation as `program arg arg...`, unquoted.
    pub fn commands(&self) -> Vec<String> {
        self.world
            .borrow()
            .invocations
            .iter()
            .map(|inv| {
                std::iter::once(inv.program.as_str())
                    .chain(inv.args.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    pub fn count_prefix(&self, words: &[&str]) -> usize {
        self.world
            .borrow()
            .invocations
            .iter()
            .filter(|inv| inv.starts_with(words))
            .count()
    }

    pub fn is_initialized(&self) -> bool {
        self.world.borrow().initialized
    }

    pub fn origin(&self) -> Option<String> {
        self.world.borrow().origin.clone()
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.world.borrow().commits.clone()
    }

    pub fn identity(&self) -> IdentityRecord {
        self.world.borrow().identity.clone()
    }

    // ── Simulation ──

    fn simulate(&self, inv: &Invocation) -> CommandOutput {
        let args: Vec<&str> = inv.args.iter().map(String::as_str).collect();
        if args == ["--version"] {
            return CommandOutput::ok(version_banner(&inv.program));
        }
        match inv.program.as_str() {
            "git" => self.simulate_git(&args, inv.cwd.as_deref()),
            "gh" => self.simulate_gh(&args),
            "docker" => self.simulate_docker(&args),
            _ => unexpected(inv),
        }
    }

    fn simulate_git(&self, args: &[&str], cwd: Option<&Path>) -> CommandOutput {
        let mut world = self.world.borrow_mut();
        match args {
            ["config", "--global", "--get", key] => {
                let value = match *key {
                    "user.name" => world.identity.name.clone(),
                    "user.email" => world.identity.email.clone(),
                    _ => None,
                };
                value.map_or_else(|| CommandOutput::failed(1, ""), |v| CommandOutput::ok(v + "\n"))
            }
            ["config", "--global", key, value] => {
                match *key {
                    "user.name" => world.identity.name = Some((*value).to_string()),
                    "user.email" => world.identity.email = Some((*value).to_string()),
                    _ => {}
                }
                CommandOutput::ok("")
            }
            ["init"] => {
                world.initialized = true;
                CommandOutput::ok("Initialized empty Git repository\n")
            }
            _ if !world.initialized => CommandOutput::failed(128, NOT_A_REPOSITORY),
            ["rev-parse", "--show-toplevel"] => match cwd {
                Some(dir) => CommandOutput::ok(format!("{}\n", dir.display())),
                None => CommandOutput::failed(128, NOT_A_REPOSITORY),
            },
            ["remote", "get-url", "origin"] => match &world.origin {
                Some(url) => CommandOutput::ok(format!("{url}\n")),
                None => CommandOutput::failed(2, "error: No such remote 'origin'"),
            },
            ["remote", "add", "origin", url] => {
                if world.origin.is_some() {
                    return CommandOutput::failed(3, "error: remote origin already exists.");
                }
                world.origin = Some((*url).to_string());
                CommandOutput::ok("")
            }
            ["remote", "set-url", "origin", url] => {
                if world.origin.is_none() {
                    return CommandOutput::failed(2, "error: No such remote 'origin'");
                }
                world.origin = Some((*url).to_string());
                CommandOutput::ok("")
            }
            ["add", "-A"] => {
                if world.dirty {
                    world.staged = true;
                    world.dirty = false;
                }
                CommandOutput::ok("")
            }
            ["commit", "-m", message] => {
                if !world.staged {
                    return CommandOutput {
                        code: Some(1),
                        stdout: format!(
                            "On branch {}\nnothing to commit, working tree clean\n",
                            world.branch
                        ),
                        ..CommandOutput::default()
                    };
                }
                world.staged = false;
                world.commits.push((*message).to_string());
                CommandOutput::ok(format!("[{} {:07x}] {message}\n", world.branch, world.commits.len()))
            }
            ["symbolic-ref", "--short", "HEAD"] => CommandOutput::ok(format!("{}\n", world.branch)),
            ["push", "-u", "origin", _branch] => {
                if let Some((code, stderr)) = &world.push_failure {
                    return CommandOutput::failed(*code, stderr.clone());
                }
                if world.origin.is_none() {
                    return CommandOutput::failed(
                        128,
                        "fatal: 'origin' does not appear to be a git repository",
                    );
                }
                CommandOutput::ok("")
            }
            ["log", "--reverse", format] if format.starts_with("--pretty=format:") => {
                if let Some(raw) = &world.commit_log {
                    return CommandOutput::ok(raw.clone());
                }
                if world.commits.is_empty() {
                    return CommandOutput::failed(
                        128,
                        format!(
                            "fatal: your current branch '{}' does not have any commits yet",
                            world.branch
                        ),
                    );
                }
                let lines: Vec<String> = world
                    .commits
                    .iter()
                    .enumerate()
                    .map(|(i, message)| {
                        format!(
                            "{:040x}|Fake Author|2024-01-{:02}T12:00:00+00:00|{message}",
                            i + 1,
                            i + 1
                        )
                    })
                    .collect();
                CommandOutput::ok(lines.join("\n"))
            }
            _ => CommandOutput::failed(127, format!("fake git: unexpected {}", args.join(" "))),
        }
    }

    fn simulate_gh(&self, args: &[&str]) -> CommandOutput {
        let mut world = self.world.borrow_mut();
        match args {
            ["auth", "status"] if world.authenticated => {
                CommandOutput::ok(format!("github.com\n  Logged in to github.com account {HOSTING_OWNER}\n"))
            }
            ["auth", "status"] => CommandOutput::failed(
                1,
                "You are not logged into any GitHub hosts. To log in, run: gh auth login",
            ),
            ["repo", "view", name, ..] => {
                if let Some(stderr) = &world.hosting_failure {
                    return CommandOutput::failed(1, stderr.clone());
                }
                match world.hosted.get(*name) {
                    Some(url) => CommandOutput::ok(format!("{url}\n")),
                    None => CommandOutput::failed(
                        1,
                        format!(
                            "GraphQL: Could not resolve to a Repository with the name '{}'. (repository)",
                            qualified(name)
                        ),
                    ),
                }
            }
            ["repo", "create", name, ..] => {
                if let Some((code, stderr)) = &world.create_failure {
                    return CommandOutput::failed(*code, stderr.clone());
                }
                let url = format!("https://github.com/{}.git", qualified(name));
                world.hosted.insert((*name).to_string(), url.clone());
                if world.initialized && world.origin.is_none() {
                    world.origin = Some(url.clone());
                }
                CommandOutput::ok(format!("{url}\n"))
            }
            ["api", "graphql", "-f", query] if query.starts_with("query=") => {
                match &world.graphql_response {
                    Some(json) => CommandOutput::ok(json.clone()),
                    None => CommandOutput::failed(1, "gh: Bad credentials (HTTP 401)"),
                }
            }
            _ => CommandOutput::failed(127, format!("fake gh: unexpected {}", args.join(" "))),
        }
    }

    fn simulate_docker(&self, args: &[&str]) -> CommandOutput {
        let world = self.world.borrow();
        match args {
            ["build", ..] => match &world.docker_build_failure {
                Some((code, stderr)) => CommandOutput::failed(*code, stderr.clone()),
                None => CommandOutput::ok("Successfully built\n"),
            },
            _ => CommandOutput::failed(127, format!("fake docker: unexpected {}", args.join(" "))),
        }
    }
}

impl CommandRunner for FakeBackends {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        let world = self.world.borrow();
        world
            .installed
            .iter()
            .any(|tool| tool.program() == program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }

    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.world
            .borrow_mut()
            .invocations
            .push(invocation.clone());
        if self.locate(&invocation.program).is_none() {
            bail!("spawn {}: No such file or directory", invocation.program);
        }
        Ok(self.simulate(invocation))
    }

    fn run_attached(&self, invocation: &Invocation) -> Result<Option<i32>> {
        self.world
            .borrow_mut()
            .invocations
            .push(invocation.clone());
        if self.locate(&invocation.program).is_none() {
            bail!("spawn {}: No such file or directory", invocation.program);
        }
        let mut world = self.world.borrow_mut();
        let args: Vec<&str> = invocation.args.iter().map(String::as_str).collect();
        let code = match (invocation.program.as_str(), args.as_slice()) {
            ("gh", ["auth", "login"]) => {
                world.authenticated = world.login_succeeds;
                Some(if world.login_succeeds { 0 } else { 1 })
            }
            ("asciinema", ["rec", cast, ..]) => {
                if let Some(parent) = Path::new(cast).parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(cast, "{\"version\": 2}\n")?;
                world.recorder_exit
            }
            ("docker", ["run", ..]) => world.docker_run_exit,
            _ => Some(127),
        };
        Ok(code)
    }
}

fn version_banner(program: &str) -> String {
    match program {
        "git" => "git version 2.43.0\n",
        "gh" => "gh version 2.40.1 (2023-12-13)\nhttps://github.com/cli/cli/releases/tag/v2.40.1\n",
        "docker" => "Docker version 24.0.7, build afdd53b\n",
        "asciinema" => "asciinema 2.4.0\n",
        _ => "",
    }
    .to_string()
}

fn qualified(name: &str) -> String {
    if name.contains('/') {
        name.to_string()
    } else {
        format!("{HOSTING_OWNER}/{name}")
    }
}

fn unexpected(inv: &Invocation) -> CommandOutput {
    CommandOutput::failed(127, format!("fake: unexpected command {}", inv.command_line()))
}

/// [`Prompter`] fed from a fixed list of answers. An empty answer takes the
/// default; running out of answers is an error.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<String>>,
    questions: RefCell<Vec<String>>,
    interactive: bool,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: RefCell::new(answers.into_iter().map(Into::into).collect()),
            questions: RefCell::new(Vec::new()),
            interactive: true,
        }
    }

    /// Behave like `--auto` for attached logins.
    pub fn non_interactive(mut self) -> Self {
        self.interactive = false;
        self
    }

    /// Questions asked so far, in order.
    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }

    fn next_answer(&self, question: &str) -> Result<String> {
        self.questions.borrow_mut().push(question.to_string());
        match self.answers.borrow_mut().pop_front() {
            Some(answer) => Ok(answer),
            None => bail!("no scripted answer for `{question}`"),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, question: &str, default: Option<&str>) -> Result<String> {
        let answer = self.next_answer(question)?;
        match (answer.is_empty(), default) {
            (true, Some(d)) => Ok(d.to_string()),
            (true, None) => bail!("empty answer for `{question}`"),
            (false, _) => Ok(answer),
        }
    }

    fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        let answer = self.next_answer(question)?;
        Ok(match answer.as_str() {
            "" => default,
            a => a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes"),
        })
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}

/// Session rooted in a fresh temporary directory, which doubles as the
/// project directory.
pub struct TestSession {
    pub session: Session,
    temp: TempDir,
}

impl TestSession {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let session = Session::open(temp.path())
            .expect("open session")
            .quiet()
            .with_settings(settings);
        Self { session, temp }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Non-interactive options for the project at the session root.
    pub fn options(&self) -> RunOptions {
        RunOptions {
            path: Some(self.root().to_path_buf()),
            repo: Some("demo".to_string()),
            message: Some("init".to_string()),
            auto: true,
            ..RunOptions::default()
        }
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new()
    }
}
