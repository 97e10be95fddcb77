//! Docker adapter: the isolation backend.

use std::path::Path;

use anyhow::Result;
use tracing::instrument;

use crate::io::process::Invocation;
use crate::io::shell::Shell;

/// Mount point of the working directory inside the container.
pub const CONTAINER_WORKDIR: &str = "/workspace";

/// Tokens forwarded into the container so `gh` stays authenticated.
const FORWARDED_ENV: [&str; 2] = ["GH_TOKEN", "GITHUB_TOKEN"];

/// Exit codes `docker run` uses for its own failures (daemon error, command
/// not executable, command not found) as opposed to the contained program's.
pub const DOCKER_FAILURE_CODES: [i32; 3] = [125, 126, 127];

/// Outcome of running the workflow inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerExit {
    /// The contained workflow ran and exited with this code.
    Workflow(i32),
    /// Docker itself could not run the container.
    DockerFailed(Option<i32>),
}

#[derive(Clone, Copy)]
pub struct Docker<'a> {
    shell: Shell<'a>,
}

impl<'a> Docker<'a> {
    pub fn new(shell: Shell<'a>) -> Self {
        Self { shell }
    }

    /// `docker build -t <image> -f <dockerfile> <context>`.
    #[instrument(skip_all, fields(image))]
    pub fn build(&self, image: &str, dockerfile: &Path, context: &Path) -> Result<()> {
        let dockerfile = dockerfile.display().to_string();
        let context_arg = context.display().to_string();
        self.shell.run_checked(
            &Invocation::new(
                "docker",
                ["build", "-t", image, "-f", &dockerfile, &context_arg],
            )
            .in_dir(context),
        )?;
        Ok(())
    }

    /// Run `command` in `image` with `workdir` mounted at [`CONTAINER_WORKDIR`].
    #[instrument(skip_all, fields(image))]
    pub fn run(
        &self,
        image: &str,
        workdir: &Path,
        interactive: bool,
        command: &[String],
    ) -> Result<ContainerExit> {
        let invocation = Invocation::new("docker", run_args(image, workdir, interactive, command));
        let code = self.shell.run_attached(&invocation)?;
        Ok(match code {
            Some(code) if !DOCKER_FAILURE_CODES.contains(&code) => ContainerExit::Workflow(code),
            other => ContainerExit::DockerFailed(other),
        })
    }
}

fn run_args(image: &str, workdir: &Path, interactive: bool, command: &[String]) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--rm".to_string()];
    if interactive {
        args.push("-it".to_string());
    }
    args.push("-v".to_string());
    args.push(format!("{}:{CONTAINER_WORKDIR}", workdir.display()));
    args.push("-w".to_string());
    args.push(CONTAINER_WORKDIR.to_string());
    for var in FORWARDED_ENV {
        args.push("-e".to_string());
        args.push(var.to_string());
    }
    args.push(image.to_string());
    args.extend(command.iter().cloned());
    args
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn run_args_mount_workdir_and_forward_tokens() {
        let args = run_args(
            "shipyard-workspace",
            &PathBuf::from("/home/me/demo"),
            false,
            &["shipyard".to_string(), "run".to_string()],
        );
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "-v",
                "/home/me/demo:/workspace",
                "-w",
                "/workspace",
                "-e",
                "GH_TOKEN",
                "-e",
                "GITHUB_TOKEN",
                "shipyard-workspace",
                "shipyard",
                "run",
            ]
        );
    }

    #[test]
    fn interactive_run_allocates_a_tty() {
        let args = run_args("img", &PathBuf::from("/w"), true, &[]);
        assert_eq!(&args[..3], ["run", "--rm", "-it"]);
    }
}
