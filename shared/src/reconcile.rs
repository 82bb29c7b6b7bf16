//! Reconciliation of an agent's live proficiencies with a profile.
//!
//! Changing an agent's profile removes every pair the previous profile
//! defines, then associates the normalized target set. Both calls are made
//! even when the other fails; each outcome is reported separately.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::directory::{find_user_id, Directory};
use crate::error::ServiceResult;
use crate::proficiency::{dedupe, normalize, AttributePair, InvalidItem, Normalization, Proficiency};
use crate::profiles::ProfileRepository;
use crate::{Result, ServiceError};

/// Outcome of one directory write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Nothing to send.
    Skipped,
    Succeeded { attempted: usize },
    Failed { attempted: usize, error: ServiceError },
}

impl StepOutcome {
    pub fn from_call(attempted: usize, result: ServiceResult<()>) -> Self {
        match result {
            Ok(()) => StepOutcome::Succeeded { attempted },
            Err(error) => StepOutcome::Failed { attempted, error },
        }
    }

    /// HTTP status this outcome contributes.
    pub fn status(&self) -> u16 {
        match self {
            StepOutcome::Failed { error, .. } => error.status(),
            _ => 200,
        }
    }

    pub fn error(&self) -> Option<&ServiceError> {
        match self {
            StepOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error().is_some()
    }
}

/// Highest status among sub-step outcomes, 200 when there are none.
pub fn worst_status<I: IntoIterator<Item = u16>>(statuses: I) -> u16 {
    statuses.into_iter().max().unwrap_or(200)
}

/// Pairs to remove and proficiencies to add for one agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationPlan {
    pub wipe_set: Vec<AttributePair>,
    pub apply_set: Vec<Proficiency>,
    pub invalid: Vec<InvalidItem>,
}

/// Compute the plan from the previous profile's stored list and the target list.
///
/// The previous list is normalized with levels (stored entries always carry
/// one), then reduced to unique pairs. Invalid previous entries are ignored;
/// invalid target entries are reported.
pub fn plan(previous: Option<&Value>, target: &Value) -> ReconciliationPlan {
    let wipe_set = previous
        .map(|stored| dedupe(normalize(stored, true).valid.iter().map(Proficiency::pair)))
        .unwrap_or_default();
    let Normalization { valid, invalid } = normalize(target, true);

    ReconciliationPlan {
        wipe_set,
        apply_set: valid,
        invalid,
    }
}

/// Who the reconciliation is for.
#[derive(Debug, Clone, Copy)]
pub enum AgentIdentity<'a> {
    /// Resolved by scanning the user listing.
    Login(&'a str),
    /// Already resolved by the caller.
    Resolved { login: &'a str, user_id: &'a str },
}

impl AgentIdentity<'_> {
    pub fn login(&self) -> &str {
        match self {
            AgentIdentity::Login(login) => login,
            AgentIdentity::Resolved { login, .. } => login,
        }
    }
}

/// Per-step report of one reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub user_id: String,
    pub wipe: StepOutcome,
    pub apply: StepOutcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invalid: Vec<InvalidItem>,
}

impl ReconcileReport {
    pub fn status(&self) -> u16 {
        worst_status([self.wipe.status(), self.apply.status()])
    }

    pub fn succeeded(&self) -> bool {
        !self.wipe.is_failure() && !self.apply.is_failure()
    }

    /// Failed steps by name.
    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &ServiceError)> {
        [("wipe", &self.wipe), ("apply", &self.apply)]
            .into_iter()
            .filter_map(|(step, outcome)| outcome.error().map(|e| (step, e)))
    }
}

/// Applies profiles to agents through the directory.
pub struct Reconciler<'a> {
    directory: &'a dyn Directory,
    profiles: &'a ProfileRepository,
}

impl<'a> Reconciler<'a> {
    pub fn new(directory: &'a dyn Directory, profiles: &'a ProfileRepository) -> Self {
        Self { directory, profiles }
    }

    /// Replace the pairs of `previous_profile` with `target` on the agent.
    ///
    /// Fails only when the agent cannot be resolved. Removal is always issued
    /// before addition; a failure in either (or in loading the previous
    /// profile) is captured in the report.
    pub async fn apply(
        &self,
        agent: AgentIdentity<'_>,
        target: &Value,
        previous_profile: Option<&str>,
    ) -> Result<ReconcileReport> {
        let user_id = match agent {
            AgentIdentity::Login(login) => find_user_id(self.directory, login).await?,
            AgentIdentity::Resolved { user_id, .. } => user_id.to_string(),
        };

        let mut load_failure = None;
        let mut previous = None;
        if let Some(name) = previous_profile.filter(|n| !n.is_empty()) {
            match self.profiles.get_profile(name).await {
                Ok(profile) => previous = profile.map(|p| p.proficiencies),
                Err(err) => {
                    warn!(agent_login = agent.login(), profile = name, "Could not load previous profile: {}", err);
                    load_failure = Some(err.into_service_error());
                }
            }
        }

        let plan = plan(previous.as_ref(), target);

        let wipe = match load_failure {
            Some(error) => StepOutcome::Failed { attempted: 0, error },
            None if plan.wipe_set.is_empty() => StepOutcome::Skipped,
            None => StepOutcome::from_call(
                plan.wipe_set.len(),
                self.directory
                    .disassociate_user_proficiencies(&user_id, &plan.wipe_set)
                    .await,
            ),
        };

        let apply = if plan.apply_set.is_empty() {
            StepOutcome::Skipped
        } else {
            StepOutcome::from_call(
                plan.apply_set.len(),
                self.directory
                    .associate_user_proficiencies(&user_id, &plan.apply_set)
                    .await,
            )
        };

        let report = ReconcileReport {
            user_id,
            wipe,
            apply,
            invalid: plan.invalid,
        };
        for (step, error) in report.failures() {
            warn!(agent_login = agent.login(), step, code = %error.code, request_id = ?error.request_id, "Reconcile step failed: {}", error.message);
        }
        info!(
            agent_login = agent.login(),
            removed = plan.wipe_set.len(),
            added = plan.apply_set.len(),
            status = report.status(),
            "Proficiencies reconciled"
        );
        Ok(report)
    }
}
