//! Shared deterministic types for the push workflow.
//!
//! These types define stable contracts between components. They carry no
//! handles to external state; anything derived from a backend is recomputed
//! every run.

use std::fmt;

use anyhow::{Result, anyhow};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// External tools the workflow knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolId {
    Git,
    Gh,
    Docker,
    Asciinema,
}

impl ToolId {
    /// Every tool, in probe order.
    pub const ALL: [ToolId; 4] = [ToolId::Git, ToolId::Gh, ToolId::Docker, ToolId::Asciinema];

    /// Executable name looked up on `PATH`.
    pub fn program(self) -> &'static str {
        match self {
            ToolId::Git => "git",
            ToolId::Gh => "gh",
            ToolId::Docker => "docker",
            ToolId::Asciinema => "asciinema",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Presence and version of one tool. Recomputed every run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub tool: ToolId,
    pub installed: bool,
    pub version: Option<String>,
}

impl ToolStatus {
    pub fn missing(tool: ToolId) -> Self {
        Self {
            tool,
            installed: false,
            version: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.tool.program()
    }
}

/// Global author identity as reported by the version-control backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityRecord {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl IdentityRecord {
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.email.is_some()
    }
}

/// Check a hosted repository name: `name` or `owner/name`, each part
/// `[A-Za-z0-9._-]`.
pub fn validate_repository_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("repository name must not be empty"));
    }
    let parts: Vec<&str> = name.split('/').collect();
    if parts.len() > 2 {
        return Err(anyhow!("repository name must be 'name' or 'owner/name' (got '{name}')"));
    }
    for part in parts {
        if part.is_empty() || part == "." || part == ".." {
            return Err(anyhow!("repository name has an empty or dot segment (got '{name}')"));
        }
        if part
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
        {
            return Err(anyhow!(
                "repository name must be [A-Za-z0-9._-] only (got '{name}')"
            ));
        }
    }
    Ok(())
}

/// Repository name suggested for a directory: its basename with every
/// character outside `[A-Za-z0-9._-]` replaced by `-`.
pub fn suggest_repository_name(dir_name: &str) -> String {
    dir_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// How the local repository relates to the hosting backend.
///
/// Always derived from a fresh observation; never cached across a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryLinkState {
    /// No local repository.
    Unlinked,
    /// Local repository without `origin`, and no usable hosted repository.
    LocalOnly,
    /// The hosting backend has the repository but `origin` is not configured.
    RemoteExistsUnlinked,
    /// `origin` is configured.
    Linked,
}

impl RepositoryLinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            RepositoryLinkState::Unlinked => "unlinked",
            RepositoryLinkState::LocalOnly => "local_only",
            RepositoryLinkState::RemoteExistsUnlinked => "remote_exists_unlinked",
            RepositoryLinkState::Linked => "linked",
        }
    }
}

impl fmt::Display for RepositoryLinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the orchestrator is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationMode {
    /// Directly on the operator's machine; may delegate to the isolation backend.
    #[default]
    Host,
    /// Already inside the isolated environment; never delegates again.
    Isolated,
}

/// One commit, as fed to the visualization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: String,
    pub author: Option<String>,
    pub date: DateTime<FixedOffset>,
    pub message: String,
    pub sequence_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_names_allow_an_owner_prefix() {
        assert!(validate_repository_name("demo").is_ok());
        assert!(validate_repository_name("me/demo.rs").is_ok());
        assert!(validate_repository_name("a/b/c").is_err());
        assert!(validate_repository_name("me/").is_err());
        let err = validate_repository_name("my repo").unwrap_err();
        assert!(err.to_string().contains("[A-Za-z0-9._-]"));
    }

    #[test]
    fn suggested_name_is_always_valid() {
        assert_eq!(suggest_repository_name("my project (v2)"), "my-project--v2-");
        assert!(validate_repository_name(&suggest_repository_name("my project (v2)")).is_ok());
    }
}
