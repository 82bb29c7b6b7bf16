//! Proficiency Profiles Lambda - Manages named proficiency templates.
//!
//! Endpoints:
//! - POST /agent-proficiency-profiles - Action-style body:
//!   `create`, `update`, `delete`, `list`, `listOptions`, `getByProfile`,
//!   `listPredefinedProficiencies`

use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::cache::{TtlCache, CATALOG_TTL};
use shared::catalog::{describe_all, ProficiencyOptions};
use shared::http::{action_of, from_body, into_response, invalid_action, no_route, non_empty, preflight_response};
use shared::{parse_body, Config, ConnectDirectory, Directory, DynamoStore, ProfileRepository, Reply};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct ProfileRequest {
    #[serde(default)]
    profile_name: String,
    #[serde(default = "empty_list")]
    proficiencies: Value,
}

fn empty_list() -> Value {
    Value::Array(Vec::new())
}

impl ProfileRequest {
    fn name(&self) -> shared::Result<&str> {
        non_empty(Some(self.profile_name.as_str()))
            .ok_or_else(|| shared::Error::Validation("Field 'profile_name' is required.".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ProfileOption {
    id: String,
    name: String,
}

/// Application state
struct AppState {
    directory: Arc<dyn Directory>,
    profiles: ProfileRepository,
    catalog: TtlCache<ProficiencyOptions>,
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
            catalog: TtlCache::new(CATALOG_TTL),
        })
    }
}

async fn dispatch(state: &AppState, body: &Value) -> shared::Result<Reply> {
    let action = action_of(body).unwrap_or_default();
    info!(action, "Proficiency profiles");

    match action {
        "create" => {
            let request: ProfileRequest = from_body(body)?;
            let profile = state
                .profiles
                .create_profile(request.name()?, request.proficiencies.clone())
                .await?;
            Ok(Reply::ok(json!({
                "message": "Profile created",
                "profile_id": profile.profile_id,
            })))
        }

        "update" => {
            let request: ProfileRequest = from_body(body)?;
            state
                .profiles
                .update_proficiencies(request.name()?, request.proficiencies.clone())
                .await?;
            Ok(Reply::message("Profile updated"))
        }

        "delete" => {
            let request: ProfileRequest = from_body(body)?;
            state.profiles.delete_profile(request.name()?).await?;
            Ok(Reply::message("Profile deleted"))
        }

        "list" => {
            let profiles = state.profiles.list_profiles().await?;
            Reply::serialized(200, &json!({ "profiles": profiles }))
        }

        "listOptions" => {
            let options: Vec<ProfileOption> = state
                .profiles
                .list_profiles()
                .await?
                .into_iter()
                .filter(|p| !p.profile_id.is_empty())
                .map(|p| ProfileOption {
                    id: p.profile_id,
                    name: p.profile_name,
                })
                .collect();
            Reply::serialized(200, &json!({ "options": options }))
        }

        "getByProfile" => {
            let request: ProfileRequest = from_body(body)?;
            let profile = match state.profiles.get_profile(request.name()?).await? {
                Some(profile) => serde_json::to_value(profile)?,
                None => json!({}),
            };
            Ok(Reply::ok(json!({ "profile": profile })))
        }

        "listPredefinedProficiencies" => {
            let options = state
                .catalog
                .get_or_refresh(|| async {
                    let details = describe_all(state.directory.as_ref()).await?;
                    Ok::<_, shared::Error>(ProficiencyOptions::from_details(details))
                })
                .await?;
            info!(count = options.proficiencies.len(), "Returned proficiencies");
            Reply::serialized(200, options.as_ref())
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
        ("POST", "/agent-proficiency-profiles") => {
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
    use shared::testing::{Call, FakeDirectory, MemoryStore};

    fn state() -> (Arc<FakeDirectory>, Arc<MemoryStore>, AppState) {
        let directory = Arc::new(
            FakeDirectory::new()
                .with_attribute("skill_name", &["billing", "Outage"])
                .with_attribute("language", &["en"]),
        );
        let store = Arc::new(
            MemoryStore::new()
                .with_table("mapping", &["agent_login"])
                .with_table("profiles", &["profile_name"]),
        );
        let state = AppState {
            directory: directory.clone(),
            profiles: ProfileRepository::new(store.clone(), "mapping", "profiles"),
            catalog: TtlCache::new(CATALOG_TTL),
        };
        (directory, store, state)
    }

    #[tokio::test]
    async fn test_create_then_get_and_list_options() {
        let (_, store, state) = state();
        let reply = dispatch(
            &state,
            &json!({"action": "create", "profile_name": "Tier1", "proficiencies": ["skill_name=billing (L2)"]}),
        )
        .await
        .unwrap();
        let profile_id = reply.body["profile_id"].as_str().unwrap().to_string();
        assert_eq!(reply.body["message"], "Profile created");
        assert!(uuid::Uuid::parse_str(&profile_id).is_ok());

        store.insert("profiles", json!({"profile_name": "Legacy"}));

        let fetched = dispatch(&state, &json!({"action": "getByProfile", "profile_name": "Tier1"}))
            .await
            .unwrap();
        assert_eq!(fetched.body["profile"]["proficiencies"], json!(["skill_name=billing (L2)"]));

        let options = dispatch(&state, &json!({"action": "listOptions"})).await.unwrap();
        assert_eq!(options.body["options"], json!([{"id": profile_id, "name": "Tier1"}]));
    }

    #[tokio::test]
    async fn test_get_unknown_profile_is_empty_object() {
        let (_, _, state) = state();
        let reply = dispatch(&state, &json!({"action": "getByProfile", "profile_name": "Nope"}))
            .await
            .unwrap();
        assert_eq!(reply.body, json!({"profile": {}}));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (_, store, state) = state();
        dispatch(&state, &json!({"action": "create", "profile_name": "Tier1"}))
            .await
            .unwrap();

        let reply = dispatch(
            &state,
            &json!({"action": "update", "profile_name": "Tier1", "proficiencies": ["language=en"]}),
        )
        .await
        .unwrap();
        assert_eq!(reply.body["message"], "Profile updated");
        assert_eq!(store.rows("profiles")[0]["proficiencies"], json!(["language=en"]));

        dispatch(&state, &json!({"action": "delete", "profile_name": "Tier1"}))
            .await
            .unwrap();
        assert!(store.rows("profiles").is_empty());
    }

    #[tokio::test]
    async fn test_profile_name_required() {
        let (_, _, state) = state();
        let err = dispatch(&state, &json!({"action": "create"})).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Field 'profile_name' is required.");
    }

    #[tokio::test]
    async fn test_predefined_proficiencies_cached() {
        let (directory, _, state) = state();
        let first = dispatch(&state, &json!({"action": "listPredefinedProficiencies"}))
            .await
            .unwrap();
        assert_eq!(
            first.body["proficiencies"],
            json!(["language=en (L1)", "skill_name=billing (L1)", "skill_name=Outage (L1)"])
        );
        assert_eq!(first.body["rawAttributes"].as_array().unwrap().len(), 2);

        let second = dispatch(&state, &json!({"action": "listPredefinedProficiencies"}))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(directory.count(|c| matches!(c, Call::ListAttributes)), 1);
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let (_, _, state) = state();
        let err = dispatch(&state, &json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid action");
    }
}
