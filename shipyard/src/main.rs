//! `shipyard`: take a local project to a hosted git repository.
//!
//! Running without a subcommand runs the workflow. `.shipyard/` in the launch
//! directory holds the remembered choices, the session log and the cast file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use shipyard::collect::{self, DEFAULT_LIMIT, DEFAULT_OUTPUT};
use shipyard::core::capability::{self, Requirement};
use shipyard::core::machine::WorkflowState;
use shipyard::core::types::{IsolationMode, suggest_repository_name};
use shipyard::exit_codes;
use shipyard::history;
use shipyard::io::git::Git;
use shipyard::io::hosting::GhCli;
use shipyard::io::probe;
use shipyard::io::process::SystemRunner;
use shipyard::io::prompt::{AutoPrompter, Prompter, TerminalPrompter};
use shipyard::io::shell::Shell;
use shipyard::logging;
use shipyard::session::Session;
use shipyard::workflow::{Delegate, RunOptions, run_workflow};

#[derive(Parser)]
#[command(
    name = "shipyard",
    version,
    about = "Initialize, link, commit and push a project, then visualize its history",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Run the workflow (the default).
    Run(RunArgs),
    /// Report which external tools are installed.
    Doctor,
    /// Regenerate the commit visualization only.
    History {
        /// Project directory (defaults to the remembered one).
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Save the most recently updated repositories of the gh account as JSON.
    Repos {
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,
        #[arg(long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// Project directory; skips the prompt.
    #[arg(long)]
    path: Option<PathBuf>,
    /// Hosted repository name (`name` or `owner/name`); skips the prompt.
    #[arg(long)]
    repo: Option<String>,
    /// Commit message; skips the prompt.
    #[arg(long)]
    message: Option<String>,
    /// Never prompt; take every default.
    #[arg(long)]
    auto: bool,
    /// Do not record the session.
    #[arg(long)]
    no_record: bool,
    /// Do not offer to run inside docker.
    #[arg(long)]
    no_isolation: bool,
    /// Overwrite a divergent `origin` URL with the hosted repository's URL.
    #[arg(long)]
    sync_remote_url: bool,
    /// Set when re-invoked inside the container.
    #[arg(long, hide = true)]
    isolated: bool,
}

impl From<RunArgs> for RunOptions {
    fn from(args: RunArgs) -> Self {
        RunOptions {
            path: args.path,
            repo: args.repo,
            message: args.message,
            auto: args.auto,
            no_record: args.no_record,
            no_isolation: args.no_isolation,
            sync_remote_url: args.sync_remote_url,
            mode: if args.isolated {
                IsolationMode::Isolated
            } else {
                IsolationMode::Host
            },
        }
    }
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let launch_dir = std::env::current_dir().context("resolve current directory")?;
    let command = match cli.command {
        Some(command) => command,
        None => Command::Run(cli.run),
    };
    match command {
        Command::Run(args) => cmd_run(&launch_dir, args),
        Command::Doctor => cmd_doctor(&launch_dir),
        Command::History { path } => cmd_history(&launch_dir, path),
        Command::Repos { limit, output } => cmd_repos(&launch_dir, limit, &output),
    }
}

fn cmd_run(launch_dir: &Path, args: RunArgs) -> Result<i32> {
    let session = Session::open(launch_dir)?;
    let prompter: &dyn Prompter = if args.auto {
        &AutoPrompter
    } else {
        &TerminalPrompter
    };
    let options = RunOptions::from(args);
    let report = run_workflow(&session, &SystemRunner, prompter, &options)?;

    match (report.state(), report.delegated_to, &report.failure) {
        (WorkflowState::Completed, Some(Delegate::Recorder), _) => {
            println!(
                "recorded session saved to {}",
                session.paths().cast_path.display()
            );
        }
        (WorkflowState::Completed, Some(Delegate::Container), _) => {
            println!("workflow completed inside the container");
        }
        (WorkflowState::Completed, None, _) => {
            if let Some(state) = report.link_state {
                println!("workflow completed (repository {state})");
            }
            if let Some(page) = &report.artifact {
                println!("visualization: {}", page.display());
            }
        }
        (_, _, Some(failure)) => eprintln!("aborted: {}", failure.message),
        (state, _, None) => eprintln!("stopped in state {state}"),
    }
    Ok(report.exit_code())
}

fn cmd_doctor(launch_dir: &Path) -> Result<i32> {
    let session = Session::open(launch_dir)?.quiet();
    let shell = Shell::new(&SystemRunner, session.log());
    let caps = probe::probe_all(shell, session.settings().probe_timeout());
    for status in caps.statuses() {
        let requirement = match capability::requirement(status.tool) {
            Requirement::Mandatory => "required",
            Requirement::Optional => "optional",
        };
        if status.installed {
            println!(
                "{:<10} ok       {} ({requirement})",
                status.name(),
                status.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            println!(
                "{:<10} missing  {} ({requirement})",
                status.name(),
                capability::fallback(status.tool).describe()
            );
        }
    }
    if caps.missing_mandatory().is_empty() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::INVALID)
    }
}

fn cmd_history(launch_dir: &Path, path: Option<PathBuf>) -> Result<i32> {
    let session = Session::open(launch_dir)?.quiet();
    let saved = session.config().load();
    let working_path = path
        .or(saved.working_path)
        .unwrap_or_else(|| launch_dir.to_path_buf());
    let working_path = if working_path.is_absolute() {
        working_path
    } else {
        launch_dir.join(working_path)
    };

    let shell = Shell::new(&SystemRunner, session.log());
    let git = Git::new(shell, &working_path);
    let records = history::extract(&git, session.log())?;
    let title = match &saved.repository_name {
        Some(name) => history::page_title(name).to_string(),
        None => suggest_repository_name(
            &working_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ),
    };
    let page = history::emit(&records, &working_path, &title)?;
    println!("{}", page.display());
    Ok(exit_codes::OK)
}

fn cmd_repos(launch_dir: &Path, limit: u32, output: &Path) -> Result<i32> {
    let session = Session::open(launch_dir)?.quiet();
    let shell = Shell::new(&SystemRunner, session.log());
    let gh = GhCli::new(shell, launch_dir);
    let response = collect::collect(&gh, limit)?;
    let output = launch_dir.join(output);
    collect::write_output(&output, &response)?;
    println!("saved {}", output.display());
    Ok(exit_codes::OK)
}
