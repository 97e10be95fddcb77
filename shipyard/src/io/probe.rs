//! Tool Availability Prober.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::core::capability::{self, Capabilities};
use crate::core::types::{ToolId, ToolStatus};
use crate::io::process::Invocation;
use crate::io::shell::Shell;

static VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)+").expect("version pattern should be valid"));

/// First dotted version number in `--version` output.
pub fn parse_version(output: &str) -> Option<String> {
    VERSION.find(output).map(|m| m.as_str().to_string())
}

/// Check presence and version of one tool. Never fails: anything that goes
/// wrong is reported as missing or as an unknown version.
pub fn probe(shell: Shell<'_>, tool: ToolId, timeout: Duration) -> ToolStatus {
    let log = shell.log();
    if shell.locate(tool.program()).is_none() {
        log.warn(&format!(
            "{tool} not found on PATH; {}",
            capability::fallback(tool).describe()
        ));
        return ToolStatus::missing(tool);
    }

    let invocation = Invocation::new(tool.program(), ["--version"]).with_timeout(timeout);
    let version = match shell.run(&invocation) {
        Ok(out) if out.success() => parse_version(&out.stdout).or_else(|| parse_version(&out.stderr)),
        Ok(_) => None,
        Err(err) => {
            debug!(tool = %tool, err = %err, "version probe failed");
            None
        }
    };
    log.note(&format!(
        "{tool}: installed ({})",
        version.as_deref().unwrap_or("unknown version")
    ));
    ToolStatus {
        tool,
        installed: true,
        version,
    }
}

/// Probe every known tool in order.
pub fn probe_all(shell: Shell<'_>, timeout: Duration) -> Capabilities {
    Capabilities::new(
        ToolId::ALL
            .iter()
            .map(|tool| probe(shell, *tool, timeout))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::session_log::SessionLog;
    use crate::test_support::FakeBackends;

    #[test]
    fn parses_versions_from_common_banners() {
        assert_eq!(parse_version("git version 2.43.0").as_deref(), Some("2.43.0"));
        assert_eq!(
            parse_version("gh version 2.40.1 (2023-12-13)\nhttps://github.com/cli/cli").as_deref(),
            Some("2.40.1")
        );
        assert_eq!(
            parse_version("Docker version 24.0.7, build afdd53b").as_deref(),
            Some("24.0.7")
        );
        assert_eq!(parse_version("asciinema 2.4.0").as_deref(), Some("2.4.0"));
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn missing_tool_is_a_warning_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        let fake = FakeBackends::new();
        fake.install(ToolId::Asciinema);
        fake.uninstall(ToolId::Docker);
        let shell = Shell::new(&fake, &log);

        let caps = probe_all(shell, Duration::from_secs(1));
        assert!(caps.has(ToolId::Git));
        assert!(!caps.has(ToolId::Docker));
        assert_eq!(
            caps.status(ToolId::Git).and_then(|s| s.version.clone()).as_deref(),
            Some("2.43.0")
        );
        let warnings = log.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("docker not found"));
        assert!(caps.missing_mandatory().is_empty());
    }
}
