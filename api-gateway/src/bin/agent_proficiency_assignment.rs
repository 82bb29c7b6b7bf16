//! Agent Proficiency Assignment Lambda - Assigns proficiency profiles to agents.
//!
//! Endpoints:
//! - POST /agent-proficiency-assignment - Action-style body:
//!   `list`, `create`, `update`, `apply`, `clear`, `delete`, `bulk_assign`, `bulk_clear`

use std::collections::HashMap;
use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::bulk::{bulk_assign, bulk_clear, ProfileRef};
use shared::directory::{hierarchy_path, list_all_users};
use shared::http::{action_of, from_body, into_response, invalid_action, no_route, non_empty, preflight_response};
use shared::profiles::AgentProfileMapping;
use shared::reconcile::{AgentIdentity, ReconcileReport, Reconciler};
use shared::{parse_body, Config, ConnectDirectory, Directory, DynamoStore, ProfileRepository, Reply};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Mapping fields shared by the single-agent actions.
#[derive(Debug, Deserialize)]
struct AgentRequest {
    #[serde(default)]
    agent_login: String,
    #[serde(default)]
    agent_name: String,
    #[serde(default)]
    profile_id: String,
    #[serde(default)]
    profile_name: String,
}

impl AgentRequest {
    fn login(&self) -> shared::Result<&str> {
        non_empty(Some(self.agent_login.as_str()))
            .ok_or_else(|| shared::Error::Validation("Field 'agent_login' is required.".to_string()))
    }

    fn mapping(&self) -> shared::Result<AgentProfileMapping> {
        Ok(AgentProfileMapping {
            agent_login: self.login()?.to_string(),
            agent_name: self.agent_name.clone(),
            profile_id: self.profile_id.clone(),
            profile_name: self.profile_name.clone(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct GroupRequest {
    #[serde(default)]
    hierarchy_group_id: String,
    #[serde(default)]
    profile_id: String,
    #[serde(default)]
    profile_name: String,
}

/// Row of the assignment grid.
#[derive(Debug, Serialize)]
struct AgentRow {
    agent_login: String,
    agent_name: String,
    agent_hierarchy: String,
    profile_name: String,
    profile_id: String,
    hierarchy_group_id: String,
}

#[derive(Debug, Serialize)]
struct ReconcileReply<'a> {
    message: &'a str,
    agent_login: &'a str,
    report: ReconcileReport,
}

fn reconcile_reply(message: &str, agent_login: &str, report: ReconcileReport) -> shared::Result<Reply> {
    let status = report.status();
    Reply::serialized(
        status,
        &ReconcileReply {
            message,
            agent_login,
            report,
        },
    )
}

/// Application state
struct AppState {
    directory: Arc<dyn Directory>,
    profiles: ProfileRepository,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let sdk_config = config.load_aws().await;

        let directory = ConnectDirectory::new(
            aws_sdk_connect::Client::new(&sdk_config),
            config.instance_id()?,
        );
        let store = DynamoStore::new(aws_sdk_dynamodb::Client::new(&sdk_config));

        Ok(Self {
            directory: Arc::new(directory),
            profiles: ProfileRepository::from_config(Arc::new(store), &config),
        })
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(self.directory.as_ref(), &self.profiles)
    }
}

async fn list_agents(state: &AppState) -> shared::Result<Reply> {
    let directory = state.directory.as_ref();
    let mappings: HashMap<String, AgentProfileMapping> = state
        .profiles
        .list_mappings()
        .await?
        .into_iter()
        .map(|m| (m.agent_login.clone(), m))
        .collect();

    let mut agents = Vec::new();
    for summary in list_all_users(directory).await? {
        let user = directory.describe_user(&summary.id).await?;
        let agent_hierarchy = match user.hierarchy_group_id.as_deref() {
            Some(group_id) => hierarchy_path(directory, group_id).await,
            None => "-".to_string(),
        };
        let mapping = mappings.get(&summary.username);
        agents.push(AgentRow {
            agent_name: user.display_name(),
            agent_hierarchy,
            profile_name: mapping.map(|m| m.profile_name.clone()).unwrap_or_default(),
            profile_id: mapping.map(|m| m.profile_id.clone()).unwrap_or_default(),
            hierarchy_group_id: user.hierarchy_group_id.clone().unwrap_or_default(),
            agent_login: summary.username,
        });
    }

    info!(count = agents.len(), "Listed agents");
    Reply::serialized(200, &serde_json::json!({ "agents": agents }))
}

async fn dispatch(state: &AppState, body: &Value) -> shared::Result<Reply> {
    let action = action_of(body).unwrap_or_default();
    info!(action, "Agent proficiency assignment");
    let nothing = Value::Array(Vec::new());

    match action {
        "list" => list_agents(state).await,

        "create" => {
            let request: AgentRequest = from_body(body)?;
            let mapping = request.mapping()?;
            state.profiles.put_mapping(&mapping).await?;
            let target = state
                .profiles
                .resolve_proficiencies(&mapping.profile_id, &mapping.profile_name)
                .await?;
            let report = state
                .reconciler()
                .apply(AgentIdentity::Login(&mapping.agent_login), &target, None)
                .await?;
            reconcile_reply("Agent profile created", &mapping.agent_login, report)
        }

        "update" => {
            let request: AgentRequest = from_body(body)?;
            let login = request.login()?;
            let previous = state.profiles.mapped_profile_name(login).await?;

            if request.profile_id.is_empty() && request.profile_name.is_empty() {
                let report = state
                    .reconciler()
                    .apply(AgentIdentity::Login(login), &nothing, previous.as_deref())
                    .await?;
                state.profiles.delete_mapping(login).await?;
                return reconcile_reply("Profile cleared and proficiencies removed", login, report);
            }

            let mapping = request.mapping()?;
            state.profiles.update_mapping(&mapping).await?;
            let target = state
                .profiles
                .resolve_proficiencies(&mapping.profile_id, &mapping.profile_name)
                .await?;
            let report = state
                .reconciler()
                .apply(AgentIdentity::Login(login), &target, previous.as_deref())
                .await?;
            reconcile_reply("Agent profile updated", login, report)
        }

        "apply" => {
            let request: AgentRequest = from_body(body)?;
            let login = request.login()?;
            let mapping = state
                .profiles
                .get_mapping(login)
                .await?
                .ok_or_else(|| shared::Error::NotFound(format!("No mapping found for {}", login)))?;
            let target = state
                .profiles
                .resolve_proficiencies(&mapping.profile_id, &mapping.profile_name)
                .await?;
            let report = state
                .reconciler()
                .apply(AgentIdentity::Login(login), &target, None)
                .await?;
            reconcile_reply("Proficiencies applied to Connect", login, report)
        }

        "clear" => {
            let request: AgentRequest = from_body(body)?;
            let login = request.login()?;
            let previous = state.profiles.mapped_profile_name(login).await?;
            let report = state
                .reconciler()
                .apply(AgentIdentity::Login(login), &nothing, previous.as_deref())
                .await?;
            reconcile_reply("Cleared proficiencies", login, report)
        }

        "delete" => {
            let request: AgentRequest = from_body(body)?;
            state.profiles.delete_mapping(request.login()?).await?;
            Ok(Reply::message("Agent profile deleted"))
        }

        "bulk_assign" => {
            let request: GroupRequest = from_body(body)?;
            let profile = ProfileRef {
                profile_id: request.profile_id,
                profile_name: request.profile_name,
            };
            if request.hierarchy_group_id.is_empty() || profile.is_empty() {
                return Err(shared::Error::Validation(
                    "hierarchy_group_id and (profile_id or profile_name) required".to_string(),
                ));
            }
            let summary = bulk_assign(
                state.directory.as_ref(),
                &state.profiles,
                &request.hierarchy_group_id,
                &profile,
            )
            .await?;
            Reply::serialized(summary.status(), &summary)
        }

        "bulk_clear" => {
            let request: GroupRequest = from_body(body)?;
            if request.hierarchy_group_id.is_empty() {
                return Err(shared::Error::Validation("hierarchy_group_id required".to_string()));
            }
            let summary = bulk_clear(state.directory.as_ref(), &state.profiles, &request.hierarchy_group_id).await?;
            Reply::serialized(summary.status(), &summary)
        }

        _ => Err(invalid_action()),
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    info!("Received request: method={}, path={}", method, path);

    match (method, path) {
        ("OPTIONS", _) => preflight_response(),
        ("POST", "/agent-proficiency-assignment") => {
            let body: Value = parse_body!(event.body());
            into_response(dispatch(&state, &body).await)
        }
        _ => into_response(Ok(no_route(method, path))),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::proficiency::{AttributePair, Proficiency};
    use shared::testing::{Call, FakeDirectory, MemoryStore};
    use shared::ServiceError;

    struct Fixture {
        directory: Arc<FakeDirectory>,
        store: Arc<MemoryStore>,
        state: AppState,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(
            FakeDirectory::new()
                .with_agent("alice", "Alice", "Smith", Some("g-care"))
                .with_agent("bob", "", "", None)
                .with_group("g-care", &["North America", "Care"], "Care"),
        );
        let store = Arc::new(
            MemoryStore::new()
                .with_table("mapping", &["agent_login"])
                .with_table("profiles", &["profile_name"]),
        );
        store.insert(
            "profiles",
            json!({
                "profile_name": "Tier1",
                "profile_id": "p-1",
                "proficiencies": [{"attributeName": "skill_name", "attributeValue": "billing", "level": 2}]
            }),
        );
        let state = AppState {
            directory: directory.clone(),
            profiles: ProfileRepository::new(store.clone(), "mapping", "profiles"),
        };
        Fixture {
            directory,
            store,
            state,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_profile() {
        let f = fixture();
        let reply = dispatch(
            &f.state,
            &json!({"action": "create", "agent_login": "alice", "agent_name": "Alice", "profile_name": "Tier1"}),
        )
        .await
        .unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["message"], "Agent profile created");
        assert_eq!(reply.body["report"]["apply"]["status"], "succeeded");
        assert_eq!(f.directory.count(|c| matches!(c, Call::Disassociate(..))), 0);
        assert_eq!(f.store.rows("mapping").len(), 1);
    }

    #[tokio::test]
    async fn test_update_without_profile_clears_and_deletes_mapping() {
        let f = fixture();
        dispatch(&f.state, &json!({"action": "create", "agent_login": "alice", "profile_name": "Tier1"}))
            .await
            .unwrap();

        let reply = dispatch(&f.state, &json!({"action": "update", "agent_login": "alice"}))
            .await
            .unwrap();

        assert_eq!(reply.body["message"], "Profile cleared and proficiencies removed");
        assert!(f.directory.associated("id-alice").is_empty());
        assert!(f.store.rows("mapping").is_empty());
    }

    #[tokio::test]
    async fn test_update_wipes_profile_assigned_by_id() {
        let f = fixture();
        f.store.insert(
            "profiles",
            json!({"profile_name": "Tier2", "profile_id": "p-2", "proficiencies": ["language=en (L3)"]}),
        );
        dispatch(&f.state, &json!({"action": "create", "agent_login": "alice", "profile_id": "p-1"}))
            .await
            .unwrap();

        let reply = dispatch(
            &f.state,
            &json!({"action": "update", "agent_login": "alice", "profile_name": "Tier2"}),
        )
        .await
        .unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["report"]["wipe"]["status"], "succeeded");
        assert!(f.directory.calls().contains(&Call::Disassociate(
            "id-alice".into(),
            vec![AttributePair::new("skill_name", "billing")]
        )));
        assert_eq!(
            f.directory.associated("id-alice"),
            vec![Proficiency::new("language", "en", Some(3))]
        );
    }

    #[tokio::test]
    async fn test_clear_keeps_mapping() {
        let f = fixture();
        dispatch(&f.state, &json!({"action": "create", "agent_login": "alice", "profile_name": "Tier1"}))
            .await
            .unwrap();

        let reply = dispatch(&f.state, &json!({"action": "clear", "agent_login": "alice"}))
            .await
            .unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["report"]["wipe"]["status"], "succeeded");
        assert!(f.directory.associated("id-alice").is_empty());
        assert_eq!(f.store.rows("mapping").len(), 1);
    }

    #[tokio::test]
    async fn test_apply_without_mapping_is_not_found() {
        let f = fixture();
        let err = dispatch(&f.state, &json!({"action": "apply", "agent_login": "bob"}))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "No mapping found for bob");
    }

    #[tokio::test]
    async fn test_upstream_failure_sets_status() {
        let f = fixture();
        f.directory.fail(
            "associate_user_proficiencies",
            ServiceError::new("AccessDeniedException", "denied"),
        );
        let reply = dispatch(
            &f.state,
            &json!({"action": "create", "agent_login": "alice", "profile_name": "Tier1"}),
        )
        .await
        .unwrap();
        assert_eq!(reply.status, 403);
        assert_eq!(reply.body["report"]["apply"]["error"]["code"], "AccessDeniedException");
    }

    #[tokio::test]
    async fn test_list_joins_mappings_and_hierarchy() {
        let f = fixture();
        dispatch(&f.state, &json!({"action": "create", "agent_login": "alice", "profile_name": "Tier1"}))
            .await
            .unwrap();

        let reply = dispatch(&f.state, &json!({"action": "list"})).await.unwrap();
        let agents = reply.body["agents"].as_array().unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0]["agent_name"], "Alice Smith");
        assert_eq!(agents[0]["agent_hierarchy"], "North America / Care");
        assert_eq!(agents[0]["profile_name"], "Tier1");
        assert_eq!(agents[1]["agent_name"], "bob");
        assert_eq!(agents[1]["agent_hierarchy"], "-");
        assert_eq!(agents[1]["profile_name"], "");
    }

    #[tokio::test]
    async fn test_bulk_actions_validate_input() {
        let f = fixture();
        let err = dispatch(&f.state, &json!({"action": "bulk_assign", "hierarchy_group_id": "g-care"}))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = dispatch(&f.state, &json!({"action": "bulk_clear"})).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_bulk_assign_reports_counts() {
        let f = fixture();
        let reply = dispatch(
            &f.state,
            &json!({"action": "bulk_assign", "hierarchy_group_id": "g-care", "profile_id": "p-1"}),
        )
        .await
        .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["updatedCount"], 1);
        assert_eq!(reply.body["updatedAgents"], json!(["alice"]));
    }

    #[tokio::test]
    async fn test_missing_login_and_unknown_action() {
        let f = fixture();
        let err = dispatch(&f.state, &json!({"action": "delete"})).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = dispatch(&f.state, &json!({"action": "explode"})).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Invalid action");
    }
}
