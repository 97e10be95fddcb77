//! Repository metadata collector: the viewer's most recently updated
//! repositories, fetched through `gh api graphql`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::hosting::GhCli;

pub const DEFAULT_LIMIT: u32 = 5;
pub const DEFAULT_OUTPUT: &str = "graphql_output.json";

/// GitHub caps connection page sizes at 100.
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: ViewerData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerData {
    pub viewer: Viewer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub login: String,
    pub repositories: RepositoryConnection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConnection {
    pub nodes: Vec<RepositoryNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryNode {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

pub fn viewer_query(limit: u32) -> String {
    format!(
        "{{ viewer {{ login repositories(first: {limit}, orderBy: {{field: UPDATED_AT, direction: DESC}}) {{ nodes {{ name url }} }} }} }}"
    )
}

pub fn collect(gh: &GhCli<'_>, limit: u32) -> Result<QueryResponse> {
    if limit == 0 || limit > MAX_LIMIT {
        bail!("limit must be between 1 and {MAX_LIMIT} (got {limit})");
    }
    let raw = gh.graphql(&viewer_query(limit))?;
    parse_response(&raw)
}

fn parse_response(raw: &str) -> Result<QueryResponse> {
    let errors = serde_json::from_str::<ErrorResponse>(raw)
        .map(|r| r.errors)
        .unwrap_or_default();
    if !errors.is_empty() {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        bail!("graphql query failed:\n- {}", messages.join("\n- "));
    }
    let response: QueryResponse =
        serde_json::from_str(raw).context("parse graphql response")?;
    debug!(
        login = %response.data.viewer.login,
        repositories = response.data.viewer.repositories.nodes.len(),
        "graphql response parsed"
    );
    Ok(response)
}

/// Write `response` as pretty JSON with a trailing newline.
pub fn write_output(path: &Path, response: &QueryResponse) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(response).context("serialize json")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::session_log::SessionLog;
    use crate::io::shell::{CommandFailed, Shell};
    use crate::test_support::FakeBackends;

    const RESPONSE: &str = r#"{"data":{"viewer":{"login":"octo","repositories":{"nodes":[{"name":"demo","url":"https://github.com/octo/demo"},{"name":"tools","url":"https://github.com/octo/tools"}]}}}}"#;

    #[test]
    fn query_orders_by_most_recent_update() {
        let query = viewer_query(5);
        assert!(query.contains("repositories(first: 5, orderBy: {field: UPDATED_AT, direction: DESC})"));
        assert!(query.contains("nodes { name url }"));
    }

    #[test]
    fn collects_and_writes_pretty_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        let fake = FakeBackends::new();
        fake.set_graphql_response(RESPONSE);
        let gh = GhCli::new(Shell::new(&fake, &log), temp.path());

        let response = collect(&gh, 5).expect("collect");
        assert_eq!(response.data.viewer.login, "octo");
        let names: Vec<&str> = response
            .data
            .viewer
            .repositories
            .nodes
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(names, vec!["demo", "tools"]);

        let out = temp.path().join(DEFAULT_OUTPUT);
        write_output(&out, &response).expect("write");
        let written = fs::read_to_string(&out).expect("read");
        assert!(written.starts_with("{\n  \"data\""));
        assert!(written.ends_with("}\n"));
    }

    #[test]
    fn failed_query_surfaces_gh_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        let fake = FakeBackends::new();
        let gh = GhCli::new(Shell::new(&fake, &log), temp.path());

        let err = collect(&gh, 5).expect_err("no response configured");
        let failed = err.downcast_ref::<CommandFailed>().expect("CommandFailed");
        assert!(failed.detail.contains("Bad credentials"));
    }

    #[test]
    fn graphql_errors_are_reported() {
        let err = parse_response(r#"{"errors":[{"message":"Field 'nope' doesn't exist"}]}"#)
            .expect_err("errors");
        assert!(err.to_string().contains("Field 'nope' doesn't exist"));
    }

    #[test]
    fn limit_is_bounded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        let fake = FakeBackends::new();
        let gh = GhCli::new(Shell::new(&fake, &log), temp.path());
        assert!(collect(&gh, 0).is_err());
        assert!(fake.commands().is_empty());
    }
}
