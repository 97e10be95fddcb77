//! Local/remote link derivation and the reconciliation planner.
//!
//! The reconciler observes the backends, asks [`plan_reconciliation`] what to
//! do, executes the plan, and observes again. Nothing here performs I/O.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::RepositoryLinkState;

/// Result of asking the hosting backend for a repository by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostedLookup {
    /// The repository exists; carries its canonical clone URL.
    Found(String),
    /// The backend answered and has no such repository.
    Missing,
    /// The backend could not be asked (not installed, not authenticated, or
    /// the query failed).
    Unknown,
}

/// Snapshot of everything the reconciler needs to decide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub local_repository: bool,
    pub origin_url: Option<String>,
    pub hosted: HostedLookup,
}

/// Operator choices that shape the plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Replace a divergent `origin` URL with the canonical one.
    pub sync_remote_url: bool,
}

/// One step of a reconciliation plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    InitRepository,
    /// Point `origin` at an existing hosted repository.
    LinkExisting { url: String },
    /// Create the hosted repository, link it as `origin`, and push.
    CreateAndPush,
    /// Overwrite `origin` with the canonical URL.
    RewriteOrigin { from: String, to: String },
    /// `origin` points somewhere other than the canonical URL; left as is.
    KeepDivergentOrigin { local: String, canonical: String },
    /// `origin` is configured but the hosting backend has no such repository.
    KeepUnhostedOrigin { local: String },
}

impl ReconcileAction {
    /// True for actions that change repository state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ReconcileAction::InitRepository
                | ReconcileAction::LinkExisting { .. }
                | ReconcileAction::CreateAndPush
                | ReconcileAction::RewriteOrigin { .. }
        )
    }
}

pub fn derive_link_state(observation: &Observation) -> RepositoryLinkState {
    if !observation.local_repository {
        return RepositoryLinkState::Unlinked;
    }
    if observation.origin_url.is_some() {
        return RepositoryLinkState::Linked;
    }
    match observation.hosted {
        HostedLookup::Found(_) => RepositoryLinkState::RemoteExistsUnlinked,
        HostedLookup::Missing | HostedLookup::Unknown => RepositoryLinkState::LocalOnly,
    }
}

/// Decide which actions converge `observation` toward [`RepositoryLinkState::Linked`].
///
/// The hosted repository is authoritative: an existing one is linked rather
/// than duplicated, and its canonical URL is what `origin` is compared to.
pub fn plan_reconciliation(
    observation: &Observation,
    policy: ReconcilePolicy,
) -> Vec<ReconcileAction> {
    let mut actions = Vec::new();
    if !observation.local_repository {
        actions.push(ReconcileAction::InitRepository);
    }

    match (&observation.origin_url, &observation.hosted) {
        (None, HostedLookup::Found(url)) => {
            actions.push(ReconcileAction::LinkExisting { url: url.clone() });
        }
        (None, HostedLookup::Missing) => actions.push(ReconcileAction::CreateAndPush),
        (None, HostedLookup::Unknown) => {}
        // Same repository over another protocol counts as linked.
        (Some(local), HostedLookup::Found(canonical)) if same_repository(local, canonical) => {}
        (Some(local), HostedLookup::Found(canonical)) => {
            if policy.sync_remote_url {
                actions.push(ReconcileAction::RewriteOrigin {
                    from: local.clone(),
                    to: canonical.clone(),
                });
            } else {
                actions.push(ReconcileAction::KeepDivergentOrigin {
                    local: local.clone(),
                    canonical: canonical.clone(),
                });
            }
        }
        (Some(local), HostedLookup::Missing) => {
            actions.push(ReconcileAction::KeepUnhostedOrigin {
                local: local.clone(),
            });
        }
        (Some(_), HostedLookup::Unknown) => {}
    }
    actions
}

static REMOTE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z][a-z0-9+.-]*://)?(?:[^@/]+@)?([^/:]+)[:/](?:\d+/)?(.+)$")
        .expect("remote url pattern should be valid")
});

/// Reduce a clone URL to `host/owner/name` so SSH and HTTPS forms compare equal.
pub fn normalize_remote_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let normalized = match REMOTE_URL.captures(trimmed) {
        Some(caps) => format!("{}/{}", &caps[1], &caps[2]),
        None => trimmed.to_string(),
    };
    normalized.to_ascii_lowercase()
}

pub fn same_repository(a: &str, b: &str) -> bool {
    normalize_remote_url(a) == normalize_remote_url(b)
}
