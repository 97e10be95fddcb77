//! Workflow states and the transitions allowed between them.

use std::fmt;

use anyhow::{Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Start,
    ProbeTools,
    DecideRecording,
    ResolveConfiguration,
    DecideIsolation,
    EnsureIdentity,
    Reconcile,
    StageCommitPush,
    ExtractHistory,
    EmitVisualization,
    Completed,
    Aborted,
}

impl WorkflowState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Start => "start",
            WorkflowState::ProbeTools => "probe_tools",
            WorkflowState::DecideRecording => "decide_recording",
            WorkflowState::ResolveConfiguration => "resolve_configuration",
            WorkflowState::DecideIsolation => "decide_isolation",
            WorkflowState::EnsureIdentity => "ensure_identity",
            WorkflowState::Reconcile => "reconcile",
            WorkflowState::StageCommitPush => "stage_commit_push",
            WorkflowState::ExtractHistory => "extract_history",
            WorkflowState::EmitVisualization => "emit_visualization",
            WorkflowState::Completed => "completed",
            WorkflowState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Aborted)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Valid transitions ──

const VALID_TRANSITIONS: &[(WorkflowState, &[WorkflowState])] = &[
    (WorkflowState::Start, &[WorkflowState::ProbeTools]),
    (
        WorkflowState::ProbeTools,
        &[WorkflowState::DecideRecording, WorkflowState::Aborted],
    ),
    (
        WorkflowState::DecideRecording,
        &[
            WorkflowState::ResolveConfiguration,
            WorkflowState::Completed,
            WorkflowState::Aborted,
        ],
    ),
    (
        WorkflowState::ResolveConfiguration,
        &[
            WorkflowState::DecideIsolation,
            // Isolated mode skips the isolation decision.
            WorkflowState::EnsureIdentity,
            WorkflowState::Aborted,
        ],
    ),
    (
        WorkflowState::DecideIsolation,
        &[
            WorkflowState::EnsureIdentity,
            WorkflowState::Completed,
            WorkflowState::Aborted,
        ],
    ),
    (
        WorkflowState::EnsureIdentity,
        &[WorkflowState::Reconcile, WorkflowState::Aborted],
    ),
    (WorkflowState::Reconcile, &[WorkflowState::StageCommitPush]),
    (
        WorkflowState::StageCommitPush,
        &[WorkflowState::ExtractHistory, WorkflowState::Aborted],
    ),
    (
        WorkflowState::ExtractHistory,
        &[WorkflowState::EmitVisualization, WorkflowState::Completed],
    ),
    (WorkflowState::EmitVisualization, &[WorkflowState::Completed]),
    // Completed and Aborted are terminal
];

pub fn is_valid_transition(from: WorkflowState, to: WorkflowState) -> bool {
    VALID_TRANSITIONS
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

/// Ordered record of the states a run has passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTrail {
    states: Vec<WorkflowState>,
}

impl Default for StateTrail {
    fn default() -> Self {
        Self {
            states: vec![WorkflowState::Start],
        }
    }
}

impl StateTrail {
    pub fn current(&self) -> WorkflowState {
        self.states
            .last()
            .copied()
            .unwrap_or(WorkflowState::Start)
    }

    pub fn advance(&mut self, to: WorkflowState) -> Result<()> {
        let from = self.current();
        if !is_valid_transition(from, to) {
            bail!("invalid workflow transition {from} -> {to}");
        }
        self.states.push(to);
        Ok(())
    }

    pub fn states(&self) -> &[WorkflowState] {
        &self.states
    }

    pub fn visited(&self, state: WorkflowState) -> bool {
        self.states.contains(&state)
    }
}
