//! Capability table: what the workflow does when a tool is missing.

use crate::core::types::{ToolId, ToolStatus};

/// Whether the run can proceed without a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Mandatory,
    Optional,
}

/// Branch taken when a tool is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Abort the run before touching any state.
    Abort,
    /// Keep the repository local; no hosting lookups or creation.
    SkipHosting,
    /// Run every step natively.
    RunNatively,
    /// Run without a session recording.
    RunUnrecorded,
}

impl Fallback {
    pub fn describe(self) -> &'static str {
        match self {
            Fallback::Abort => "cannot continue",
            Fallback::SkipHosting => "remote repository handling will be skipped",
            Fallback::RunNatively => "the workflow will run natively",
            Fallback::RunUnrecorded => "the session will not be recorded",
        }
    }
}

/// Requirement and fallback for each tool, keyed by tool identity.
pub const CAPABILITY_TABLE: [(ToolId, Requirement, Fallback); 4] = [
    (ToolId::Git, Requirement::Mandatory, Fallback::Abort),
    (ToolId::Gh, Requirement::Optional, Fallback::SkipHosting),
    (ToolId::Docker, Requirement::Optional, Fallback::RunNatively),
    (ToolId::Asciinema, Requirement::Optional, Fallback::RunUnrecorded),
];

pub fn requirement(tool: ToolId) -> Requirement {
    entry(tool).1
}

pub fn fallback(tool: ToolId) -> Fallback {
    entry(tool).2
}

fn entry(tool: ToolId) -> (ToolId, Requirement, Fallback) {
    CAPABILITY_TABLE
        .iter()
        .copied()
        .find(|(id, _, _)| *id == tool)
        .unwrap_or((tool, Requirement::Optional, Fallback::RunNatively))
}

/// Probe results folded into per-tool availability.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    statuses: Vec<ToolStatus>,
}

impl Capabilities {
    pub fn new(statuses: Vec<ToolStatus>) -> Self {
        Self { statuses }
    }

    pub fn has(&self, tool: ToolId) -> bool {
        self.status(tool).is_some_and(|s| s.installed)
    }

    pub fn status(&self, tool: ToolId) -> Option<&ToolStatus> {
        self.statuses.iter().find(|s| s.tool == tool)
    }

    pub fn statuses(&self) -> &[ToolStatus] {
        &self.statuses
    }

    /// Mandatory tools that were not found, in table order.
    pub fn missing_mandatory(&self) -> Vec<ToolId> {
        CAPABILITY_TABLE
            .iter()
            .filter(|(tool, req, _)| *req == Requirement::Mandatory && !self.has(*tool))
            .map(|(tool, _, _)| *tool)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed(tool: ToolId) -> ToolStatus {
        ToolStatus {
            tool,
            installed: true,
            version: Some("1.0".to_string()),
        }
    }

    #[test]
    fn only_git_is_mandatory() {
        for tool in ToolId::ALL {
            let expected = if tool == ToolId::Git {
                Requirement::Mandatory
            } else {
                Requirement::Optional
            };
            assert_eq!(requirement(tool), expected, "{tool}");
        }
    }

    #[test]
    fn missing_mandatory_reports_git() {
        let caps = Capabilities::new(vec![
            ToolStatus::missing(ToolId::Git),
            installed(ToolId::Gh),
        ]);
        assert_eq!(caps.missing_mandatory(), vec![ToolId::Git]);
        assert!(caps.has(ToolId::Gh));
        assert!(!caps.has(ToolId::Docker));
    }

    #[test]
    fn optional_absence_is_not_fatal() {
        let caps = Capabilities::new(vec![
            installed(ToolId::Git),
            ToolStatus::missing(ToolId::Docker),
        ]);
        assert!(caps.missing_mandatory().is_empty());
        assert_eq!(fallback(ToolId::Docker), Fallback::RunNatively);
    }
}
