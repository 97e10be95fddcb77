//! Repository State Reconciler.
//!
//! Observe, plan, execute, observe again. Every action is attempted and
//! logged; a failed action never stops the ones after it, and the returned
//! state always comes from the second observation.

use tracing::{debug, info, instrument};

use crate::core::link::{
    HostedLookup, Observation, ReconcileAction, ReconcilePolicy, derive_link_state,
    plan_reconciliation,
};
use crate::core::types::RepositoryLinkState;
use crate::io::git::Git;
use crate::io::hosting::GhCli;
use crate::io::session_log::SessionLog;
use crate::io::settings::Visibility;

pub const ORIGIN: &str = "origin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub state: RepositoryLinkState,
    pub actions: Vec<ReconcileAction>,
    /// Actions that were attempted and failed, with the error text.
    pub failures: Vec<(ReconcileAction, String)>,
    pub observation: Observation,
}

pub struct Reconciler<'a> {
    git: Git<'a>,
    /// `None` when the hosting backend is unavailable or unauthenticated.
    hosting: Option<GhCli<'a>>,
    log: &'a SessionLog,
    policy: ReconcilePolicy,
    visibility: Visibility,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        git: Git<'a>,
        hosting: Option<GhCli<'a>>,
        log: &'a SessionLog,
        policy: ReconcilePolicy,
        visibility: Visibility,
    ) -> Self {
        Self {
            git,
            hosting,
            log,
            policy,
            visibility,
        }
    }

    /// Query the backends. Query failures degrade to "absent" or "unknown".
    pub fn observe(&self, repository_name: &str) -> Observation {
        let local_repository = match self.git.is_repository() {
            Ok(found) => found,
            Err(err) => {
                self.log.warn(&format!("could not inspect local repository: {err:#}"));
                false
            }
        };
        let origin_url = if local_repository {
            match self.git.remote_url(ORIGIN) {
                Ok(url) => url,
                Err(err) => {
                    self.log.warn(&format!("could not read {ORIGIN} url: {err:#}"));
                    None
                }
            }
        } else {
            None
        };
        let hosted = match &self.hosting {
            Some(gh) => gh.lookup(repository_name).unwrap_or_else(|err| {
                self.log.warn(&format!("hosting lookup failed: {err:#}"));
                HostedLookup::Unknown
            }),
            None => HostedLookup::Unknown,
        };
        Observation {
            local_repository,
            origin_url,
            hosted,
        }
    }

    /// Converge toward [`RepositoryLinkState::Linked`] and report the state
    /// observed afterwards.
    #[instrument(skip_all, fields(repository = repository_name))]
    pub fn reconcile(&self, repository_name: &str) -> ReconcileOutcome {
        let before = self.observe(repository_name);
        debug!(state = %derive_link_state(&before), "observed before reconcile");

        let actions = plan_reconciliation(&before, self.policy);
        let mut failures = Vec::new();
        for action in &actions {
            if let Err(err) = self.execute(action, repository_name) {
                let text = format!("{err:#}");
                self.log.warn(&format!("{} failed: {text}", describe(action)));
                failures.push((action.clone(), text));
            }
        }

        let observation = if actions.iter().any(ReconcileAction::is_mutation) {
            self.observe(repository_name)
        } else {
            before
        };
        let state = derive_link_state(&observation);
        info!(state = %state, actions = actions.len(), failed = failures.len(), "reconciled");
        self.log.note(&format!("repository state: {state}"));
        ReconcileOutcome {
            state,
            actions,
            failures,
            observation,
        }
    }

    fn execute(&self, action: &ReconcileAction, repository_name: &str) -> anyhow::Result<()> {
        match action {
            ReconcileAction::InitRepository => self.git.init(),
            ReconcileAction::LinkExisting { url } => {
                self.log.note(&format!("linking existing repository {url}"));
                self.git.add_remote(ORIGIN, url)
            }
            ReconcileAction::CreateAndPush => match &self.hosting {
                Some(gh) => gh.create_and_push(repository_name, self.visibility),
                None => anyhow::bail!("hosting backend unavailable"),
            },
            ReconcileAction::RewriteOrigin { from, to } => {
                self.log.note(&format!("rewriting {ORIGIN}: {from} -> {to}"));
                self.git.set_remote_url(ORIGIN, to)
            }
            ReconcileAction::KeepDivergentOrigin { local, canonical } => {
                self.log.warn(&format!(
                    "{ORIGIN} is {local} but the hosted repository is {canonical}; \
                     leaving it unchanged (use --sync-remote-url to overwrite)"
                ));
                Ok(())
            }
            ReconcileAction::KeepUnhostedOrigin { local } => {
                self.log.warn(&format!(
                    "{ORIGIN} is {local} but no hosted repository named {repository_name} was found"
                ));
                Ok(())
            }
        }
    }
}

fn describe(action: &ReconcileAction) -> &'static str {
    match action {
        ReconcileAction::InitRepository => "repository init",
        ReconcileAction::LinkExisting { .. } => "linking existing remote",
        ReconcileAction::CreateAndPush => "remote repository creation",
        ReconcileAction::RewriteOrigin { .. } => "origin url rewrite",
        ReconcileAction::KeepDivergentOrigin { .. } | ReconcileAction::KeepUnhostedOrigin { .. } => {
            "origin check"
        }
    }
}
