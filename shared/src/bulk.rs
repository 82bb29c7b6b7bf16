//! Group-wide profile assignment.
//!
//! The directory offers no listing by hierarchy group, so both operations
//! walk the whole user listing and describe each user to test membership.
//! Agents are processed one at a time in listing order; a failure on one
//! agent is recorded and the walk continues.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::directory::{Directory, UserSummary};
use crate::profiles::{AgentProfileMapping, ProfileRepository};
use crate::reconcile::{worst_status, AgentIdentity, ReconcileReport, Reconciler};
use crate::{Error, Result, ServiceError};

/// Profile named by id and/or name; the name takes precedence.
#[derive(Debug, Clone, Default)]
pub struct ProfileRef {
    pub profile_id: String,
    pub profile_name: String,
}

impl ProfileRef {
    pub fn is_empty(&self) -> bool {
        self.profile_id.is_empty() && self.profile_name.is_empty()
    }
}

/// One agent that could not be fully processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFailure {
    pub agent_login: String,
    pub step: &'static str,
    pub status: u16,
    pub error: ServiceError,
}

impl AgentFailure {
    fn new(agent_login: &str, step: &'static str, error: ServiceError) -> Self {
        Self {
            agent_login: agent_login.to_string(),
            step,
            status: error.status(),
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAssignSummary {
    pub message: String,
    pub updated_count: usize,
    pub updated_agents: Vec<String>,
    pub failures: Vec<AgentFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkClearSummary {
    pub message: String,
    pub cleared_count: usize,
    pub cleared_agents: Vec<String>,
    pub failures: Vec<AgentFailure>,
}

fn failures_status(failures: &[AgentFailure]) -> u16 {
    worst_status(failures.iter().map(|f| f.status))
}

impl BulkAssignSummary {
    pub fn status(&self) -> u16 {
        failures_status(&self.failures)
    }
}

impl BulkClearSummary {
    pub fn status(&self) -> u16 {
        failures_status(&self.failures)
    }
}

/// Accumulates per-agent results during a walk.
#[derive(Default)]
struct Tally {
    done: Vec<String>,
    failures: Vec<AgentFailure>,
}

impl Tally {
    fn record(&mut self, login: &str, report: ReconcileReport) {
        if report.succeeded() {
            self.done.push(login.to_string());
        } else {
            self.failures.extend(
                report
                    .failures()
                    .map(|(step, error)| AgentFailure::new(login, step, error.clone())),
            );
        }
    }

    fn fail(&mut self, login: &str, step: &'static str, err: Error) {
        warn!(agent_login = login, step, "Bulk step failed: {}", err);
        self.failures
            .push(AgentFailure::new(login, step, err.into_service_error()));
    }
}

/// Cursor over the members of one hierarchy group, in listing order.
struct GroupMembers<'a> {
    directory: &'a dyn Directory,
    group_id: &'a str,
    page: std::vec::IntoIter<UserSummary>,
    next_token: Option<String>,
    exhausted: bool,
}

impl<'a> GroupMembers<'a> {
    fn new(directory: &'a dyn Directory, group_id: &'a str) -> Self {
        Self {
            directory,
            group_id,
            page: Vec::new().into_iter(),
            next_token: None,
            exhausted: false,
        }
    }

    /// Next member with its display name. Users that cannot be described
    /// are recorded as failures and skipped.
    async fn next(&mut self, tally: &mut Tally) -> Result<Option<(UserSummary, String)>> {
        loop {
            if let Some(summary) = self.page.next() {
                match self.directory.describe_user(&summary.id).await {
                    Ok(user) if user.hierarchy_group_id.as_deref() == Some(self.group_id) => {
                        let name = user.display_name();
                        return Ok(Some((summary, name)));
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        tally.fail(&summary.username, "describe", err.into());
                        continue;
                    }
                }
            }
            if self.exhausted {
                return Ok(None);
            }
            let page = self.directory.list_users(self.next_token.take()).await?;
            self.exhausted = page.next_token.is_none();
            self.next_token = page.next_token;
            self.page = page.items.into_iter();
        }
    }
}

/// Assign a profile to every agent in a hierarchy group.
///
/// The profile's proficiencies are resolved once. Each member's mapping is
/// replaced, then the member is reconciled from its previous profile to the
/// new one. Fails with `NotFound` when the profile has no proficiencies.
pub async fn bulk_assign(
    directory: &dyn Directory,
    profiles: &ProfileRepository,
    group_id: &str,
    profile: &ProfileRef,
) -> Result<BulkAssignSummary> {
    let target = profiles
        .resolve_proficiencies(&profile.profile_id, &profile.profile_name)
        .await?;
    if target.as_array().map_or(true, Vec::is_empty) {
        return Err(Error::NotFound("No proficiencies found for profile".to_string()));
    }

    let reconciler = Reconciler::new(directory, profiles);
    let mut members = GroupMembers::new(directory, group_id);
    let mut tally = Tally::default();

    while let Some((summary, agent_name)) = members.next(&mut tally).await? {
        let login = summary.username.as_str();
        let previous = match profiles.mapped_profile_name(login).await {
            Ok(previous) => previous,
            Err(err) => {
                tally.fail(login, "mapping", err);
                continue;
            }
        };

        let mapping = AgentProfileMapping {
            agent_login: login.to_string(),
            agent_name,
            profile_id: profile.profile_id.clone(),
            profile_name: profile.profile_name.clone(),
        };
        if let Err(err) = profiles.put_mapping(&mapping).await {
            tally.fail(login, "mapping", err);
            continue;
        }

        let identity = AgentIdentity::Resolved {
            login,
            user_id: &summary.id,
        };
        match reconciler.apply(identity, &target, previous.as_deref()).await {
            Ok(report) => tally.record(login, report),
            Err(err) => tally.fail(login, "apply", err),
        }
    }

    info!(group_id, updated = tally.done.len(), failed = tally.failures.len(), "Bulk assign finished");
    Ok(BulkAssignSummary {
        message: format!("Bulk assigned to {} agents", tally.done.len()),
        updated_count: tally.done.len(),
        updated_agents: tally.done,
        failures: tally.failures,
    })
}

/// Remove every proficiency of each member's mapped profile.
///
/// Mappings are left in place.
pub async fn bulk_clear(
    directory: &dyn Directory,
    profiles: &ProfileRepository,
    group_id: &str,
) -> Result<BulkClearSummary> {
    let reconciler = Reconciler::new(directory, profiles);
    let mut members = GroupMembers::new(directory, group_id);
    let mut tally = Tally::default();
    let nothing = Value::Array(Vec::new());

    while let Some((summary, _)) = members.next(&mut tally).await? {
        let login = summary.username.as_str();
        let previous = match profiles.mapped_profile_name(login).await {
            Ok(previous) => previous,
            Err(err) => {
                tally.fail(login, "mapping", err);
                continue;
            }
        };

        let identity = AgentIdentity::Resolved {
            login,
            user_id: &summary.id,
        };
        match reconciler.apply(identity, &nothing, previous.as_deref()).await {
            Ok(report) => tally.record(login, report),
            Err(err) => tally.fail(login, "wipe", err),
        }
    }

    info!(group_id, cleared = tally.done.len(), failed = tally.failures.len(), "Bulk clear finished");
    Ok(BulkClearSummary {
        message: format!("Cleared proficiencies for {} agents", tally.done.len()),
        cleared_count: tally.done.len(),
        cleared_agents: tally.done,
        failures: tally.failures,
    })
}
