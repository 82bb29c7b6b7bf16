//! Direct edits of one user's proficiencies.
//!
//! A change request carries up to three lists. Each is normalized, then sent
//! as its own directory call in the order associate, update, dissociate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::directory::Directory;
use crate::http::non_empty;
use crate::proficiency::{normalize, InvalidItem, Proficiency};
use crate::reconcile::{worst_status, StepOutcome};
use crate::ServiceError;

/// Requested changes for one user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "empty_list")]
    pub associate: Value,
    #[serde(default = "empty_list")]
    pub update: Value,
    #[serde(default = "empty_list")]
    pub dissociate: Value,
}

fn empty_list() -> Value {
    Value::Array(Vec::new())
}

/// One section of a change request after it ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionReport {
    pub attempted: usize,
    pub invalid: Vec<InvalidItem>,
    pub result: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionReports {
    pub associate: SectionReport,
    pub update: SectionReport,
    pub dissociate: SectionReport,
}

impl SectionReports {
    fn iter(&self) -> impl Iterator<Item = &SectionReport> {
        [&self.associate, &self.update, &self.dissociate].into_iter()
    }

    pub fn all_ok(&self) -> bool {
        self.iter().all(|s| !s.result.is_failure())
    }

    /// 200 when every section succeeded, otherwise the worst failure status.
    pub fn status(&self) -> u16 {
        worst_status(self.iter().map(|s| s.result.status()))
    }
}

/// Outcome for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserChangeReport {
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub overall_ok: bool,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<SectionReports>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceError>,
}

/// A change request with its sections normalized.
#[derive(Debug, Clone)]
pub struct PreparedChanges {
    pub user_id: String,
    pub username: Option<String>,
    associate: (Vec<Proficiency>, Vec<InvalidItem>),
    update: (Vec<Proficiency>, Vec<InvalidItem>),
    dissociate: (Vec<Proficiency>, Vec<InvalidItem>),
}

impl PreparedChanges {
    /// Normalize every section. `None` when `user_id` is missing or blank.
    pub fn prepare(request: &ChangeRequest) -> Option<Self> {
        let user_id = non_empty(request.user_id.as_deref())?.to_string();
        let split = |items: &Value, require_level: bool| {
            let result = normalize(items, require_level);
            (result.valid, result.invalid)
        };

        Some(Self {
            user_id,
            username: request.username.clone(),
            associate: split(&request.associate, true),
            update: split(&request.update, true),
            dissociate: split(&request.dissociate, false),
        })
    }

    /// Nothing valid to send and nothing rejected to report.
    pub fn is_empty(&self) -> bool {
        [&self.associate, &self.update, &self.dissociate]
            .iter()
            .all(|(valid, invalid)| valid.is_empty() && invalid.is_empty())
    }

    /// Issue the calls in order, capturing each outcome.
    pub async fn apply(self, directory: &dyn Directory) -> UserChangeReport {
        let user_id = self.user_id;

        let (valid, invalid) = self.associate;
        let associate = SectionReport {
            attempted: valid.len(),
            result: if valid.is_empty() {
                StepOutcome::Skipped
            } else {
                StepOutcome::from_call(
                    valid.len(),
                    directory.associate_user_proficiencies(&user_id, &valid).await,
                )
            },
            invalid,
        };

        let (valid, invalid) = self.update;
        let update = SectionReport {
            attempted: valid.len(),
            result: if valid.is_empty() {
                StepOutcome::Skipped
            } else {
                StepOutcome::from_call(
                    valid.len(),
                    directory.update_user_proficiencies(&user_id, &valid).await,
                )
            },
            invalid,
        };

        let (valid, invalid) = self.dissociate;
        let pairs: Vec<_> = valid.iter().map(Proficiency::pair).collect();
        let dissociate = SectionReport {
            attempted: pairs.len(),
            result: if pairs.is_empty() {
                StepOutcome::Skipped
            } else {
                StepOutcome::from_call(
                    pairs.len(),
                    directory.disassociate_user_proficiencies(&user_id, &pairs).await,
                )
            },
            invalid,
        };

        let results = SectionReports {
            associate,
            update,
            dissociate,
        };
        let overall_ok = results.all_ok();
        let status = results.status();
        info!(user_id = %user_id, overall_ok, status, "User proficiencies changed");

        UserChangeReport {
            username: self.username,
            user_id: Some(user_id),
            overall_ok,
            status,
            results: Some(results),
            error: None,
        }
    }
}

/// Apply one entry of a bulk request. A missing `user_id` is reported as a
/// 400 entry rather than failing the batch.
pub async fn apply_request(directory: &dyn Directory, request: &ChangeRequest) -> UserChangeReport {
    match PreparedChanges::prepare(request) {
        Some(prepared) => prepared.apply(directory).await,
        None => UserChangeReport {
            username: request.username.clone(),
            user_id: request.user_id.clone(),
            overall_ok: false,
            status: 400,
            results: None,
            error: Some(ServiceError::new("BadRequest", "Field 'user_id' is required.")),
        },
    }
}
