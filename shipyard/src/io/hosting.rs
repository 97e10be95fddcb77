//! GitHub CLI adapter: the hosting backend.

use std::path::Path;

use anyhow::{Result, bail};
use tracing::{debug, instrument, warn};

use crate::core::link::HostedLookup;
use crate::io::process::{CommandOutput, Invocation};
use crate::io::settings::Visibility;
use crate::io::shell::Shell;

/// Text `gh repo view` prints when the repository does not exist.
const NOT_FOUND_MARKER: &str = "Could not resolve to a Repository";

#[derive(Clone, Copy)]
pub struct GhCli<'a> {
    shell: Shell<'a>,
    workdir: &'a Path,
}

impl<'a> GhCli<'a> {
    pub fn new(shell: Shell<'a>, workdir: &'a Path) -> Self {
        Self { shell, workdir }
    }

    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.run(&["auth", "status"])?.success())
    }

    /// Interactive `gh auth login`, attached to the terminal.
    #[instrument(skip_all)]
    pub fn login(&self) -> Result<bool> {
        let code = self
            .shell
            .run_attached(&self.invocation(&["auth", "login"]))?;
        Ok(code == Some(0))
    }

    /// Look a repository up by name and resolve its canonical URL.
    ///
    /// Only a definite "not found" answer maps to [`HostedLookup::Missing`];
    /// any other failure is [`HostedLookup::Unknown`].
    #[instrument(skip_all, fields(name))]
    pub fn lookup(&self, name: &str) -> Result<HostedLookup> {
        let out = self.run(&["repo", "view", name, "--json", "url", "--jq", ".url"])?;
        if out.success() {
            let url = out.stdout.trim();
            if url.is_empty() {
                warn!("gh repo view returned no url");
                return Ok(HostedLookup::Unknown);
            }
            debug!(url, "hosted repository found");
            return Ok(HostedLookup::Found(url.to_string()));
        }
        if out.stderr.contains(NOT_FOUND_MARKER) {
            return Ok(HostedLookup::Missing);
        }
        Ok(HostedLookup::Unknown)
    }

    /// Create the repository from the working directory, add it as `origin`,
    /// and push.
    #[instrument(skip_all, fields(name))]
    pub fn create_and_push(&self, name: &str, visibility: Visibility) -> Result<()> {
        self.shell.run_checked(&self.invocation(&[
            "repo",
            "create",
            name,
            "--source=.",
            "--remote=origin",
            "--push",
            visibility.flag(),
        ]))?;
        Ok(())
    }

    /// Run a GraphQL query; returns the raw JSON response.
    pub fn graphql(&self, query: &str) -> Result<String> {
        let query_arg = format!("query={query}");
        let out = self
            .shell
            .run_checked(&self.invocation(&["api", "graphql", "-f", &query_arg]))?;
        if out.stdout.trim().is_empty() {
            bail!("gh api graphql returned an empty response");
        }
        Ok(out.stdout)
    }

    fn invocation(&self, args: &[&str]) -> Invocation {
        Invocation::new("gh", args.iter().copied()).in_dir(self.workdir)
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        self.shell.run(&self.invocation(args))
    }
}
