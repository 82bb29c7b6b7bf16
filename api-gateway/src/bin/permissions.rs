//! Permissions Lambda - Console users, tab configurations and dashboards.
//!
//! Endpoints:
//! - POST /userconfig - Action-style CRUD on console users, plus `listTeamsProfiles`
//! - POST /profileconfig - Action-style CRUD on tab configurations, plus `listTeamsTabs`
//! - GET /dashboards?email= - Tabs visible to a console user

use std::collections::BTreeSet;
use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::http::{action_of, from_body, into_response, invalid_action, no_route, non_empty, preflight_response};
use shared::store::{key, Item};
use shared::{parse_body, Config, DynamoStore, KeyValueStore, Reply};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// A console user's team and security profile.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPermission {
    username: String,
    team: String,
    #[serde(rename = "security_profile")]
    security_profile: String,
    team_display: String,
    security_profile_display: String,
}

impl UserPermission {
    fn attributes(&self) -> Item {
        let mut item = Item::new();
        for (name, value) in [
            ("team", &self.team),
            ("security_profile", &self.security_profile),
            ("team_display", &self.team_display),
            ("security_profile_display", &self.security_profile_display),
        ] {
            item.insert(name.to_string(), Value::String(value.clone()));
        }
        item
    }
}

#[derive(Debug, Deserialize)]
struct Username {
    username: String,
}

/// Tabs granted to a security profile within a team.
#[derive(Debug, Deserialize)]
struct TabConfig {
    securityprofile: String,
    team: String,
    #[serde(default)]
    tabnames: Value,
}

impl TabConfig {
    fn key(&self) -> Item {
        key(&[("securityprofile", self.securityprofile.as_str()), ("team", self.team.as_str())])
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TeamOption {
    team: String,
    team_display: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessLevelOption {
    access_level: String,
    access_level_display: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Dashboard {
    email: String,
    security_profile: String,
    tabs: Value,
}

fn text<'a>(item: &'a Item, name: &str) -> Option<&'a str> {
    non_empty(item.get(name).and_then(Value::as_str))
}

/// Unique `(key, display)` pairs in first-seen order.
fn display_pairs(items: &[Item], key_attr: &str, display_attr: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for item in items {
        if let (Some(k), Some(display)) = (text(item, key_attr), text(item, display_attr)) {
            match pairs.iter_mut().find(|(existing, _)| existing == k) {
                Some(pair) => pair.1 = display.to_string(),
                None => pairs.push((k.to_string(), display.to_string())),
            }
        }
    }
    pairs
}

/// Tab names, unwrapping stored `{"S": name}` elements.
fn tab_names(item: &Item) -> Vec<String> {
    let Some(Value::Array(tabs)) = item.get("tabnames") else {
        return Vec::new();
    };
    tabs.iter()
        .filter_map(|tab| match tab {
            Value::String(name) => Some(name.clone()),
            Value::Object(wrapped) => wrapped.get("S").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}

/// Application state
struct AppState {
    store: Arc<dyn KeyValueStore>,
    users_table: String,
    tabs_table: String,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let sdk_config = config.load_aws().await;

        Ok(Self {
            store: Arc::new(DynamoStore::new(aws_sdk_dynamodb::Client::new(&sdk_config))),
            users_table: config.user_permission_table,
            tabs_table: config.profile_permissions_table,
        })
    }
}

async fn user_config(state: &AppState, body: &Value) -> shared::Result<Reply> {
    let action = action_of(body)
        .ok_or_else(|| shared::Error::Validation("Missing 'action' parameter".to_string()))?;
    info!(action, username = body.get("username").and_then(serde_json::Value::as_str), "User config");
    let table = state.users_table.as_str();

    match action {
        "create" => {
            let user: UserPermission = from_body(body)?;
            let mut item = user.attributes();
            item.insert("username".to_string(), Value::String(user.username.clone()));
            state.store.put(table, item).await?;
            info!(username = %user.username, "User created");
            Ok(Reply::message("User created successfully"))
        }

        "update" => {
            let user: UserPermission = from_body(body)?;
            state
                .store
                .update(table, &key(&[("username", user.username.as_str())]), user.attributes())
                .await?;
            info!(username = %user.username, "User updated");
            Ok(Reply::message("User updated successfully"))
        }

        "delete" => {
            let user: Username = from_body(body)?;
            state.store.delete(table, &key(&[("username", user.username.as_str())])).await?;
            info!(username = %user.username, "User deleted");
            Ok(Reply::message("User deleted successfully"))
        }

        "list" => {
            let users = state.store.scan(table, None).await?;
            info!(count = users.len(), "Listed users");
            Ok(Reply::ok(json!({ "users": users })))
        }

        "listTeamsProfiles" => {
            let items = state.store.scan(&state.tabs_table, None).await?;
            let teams: Vec<TeamOption> = display_pairs(&items, "team", "team_display")
                .into_iter()
                .map(|(team, team_display)| TeamOption { team, team_display })
                .collect();
            let access_levels: Vec<AccessLevelOption> =
                display_pairs(&items, "security_profile", "security_profile_display")
                    .into_iter()
                    .map(|(access_level, access_level_display)| AccessLevelOption {
                        access_level,
                        access_level_display,
                    })
                    .collect();
            info!(teams = teams.len(), access_levels = access_levels.len(), "Listed teams and profiles");
            Reply::serialized(200, &json!({ "teams": teams, "accessLevels": access_levels }))
        }

        _ => Err(invalid_action()),
    }
}

async fn profile_config(state: &AppState, body: &Value) -> shared::Result<Reply> {
    let action = action_of(body).unwrap_or_default();
    info!(action, securityprofile = body.get("securityprofile").and_then(serde_json::Value::as_str), "Profile config");
    let table = state.tabs_table.as_str();

    match action {
        "create" => {
            let config: TabConfig = from_body(body)?;
            let mut item = config.key();
            item.insert("tabnames".to_string(), config.tabnames);
            state.store.put(table, item).await?;
            Ok(Reply::message("Tab configuration created"))
        }

        "update" => {
            let config: TabConfig = from_body(body)?;
            let mut changes = Item::new();
            changes.insert("tabnames".to_string(), config.tabnames.clone());
            state.store.update(table, &config.key(), changes).await?;
            Ok(Reply::message("Tab configuration updated"))
        }

        "delete" => {
            let config: TabConfig = from_body(body)?;
            state.store.delete(table, &config.key()).await?;
            Ok(Reply::message("Tab configuration deleted"))
        }

        "list" => {
            let users = state.store.scan(table, None).await?;
            Ok(Reply::ok(json!({ "users": users })))
        }

        "listTeamsTabs" => {
            let items = state.store.scan(table, None).await?;
            let teams: BTreeSet<&str> = items.iter().filter_map(|item| text(item, "team")).collect();
            let mut tabs: Vec<String> = Vec::new();
            for tab in items.iter().flat_map(tab_names) {
                if !tabs.contains(&tab) {
                    tabs.push(tab);
                }
            }
            Ok(Reply::ok(json!({ "teams": teams, "tabs": tabs })))
        }

        _ => Err(invalid_action()),
    }
}

/// Tabs for the user behind `email`.
///
/// The user record's security profile is read from `security_profile`, or
/// the older `securityprofile` spelling.
async fn dashboard(state: &AppState, email: Option<&str>) -> shared::Result<Reply> {
    let email = non_empty(email)
        .ok_or_else(|| shared::Error::Validation("Email not found in token".to_string()))?;

    let user = state
        .store
        .get(&state.users_table, &key(&[("username", email)]))
        .await?
        .ok_or_else(|| shared::Error::NotFound("User not found".to_string()))?;
    let security_profile = text(&user, "security_profile")
        .or_else(|| text(&user, "securityprofile"))
        .unwrap_or_default();
    let team = text(&user, "team").unwrap_or_default();

    let tab_config = state
        .store
        .get(
            &state.tabs_table,
            &key(&[("securityprofile", security_profile), ("team", team)]),
        )
        .await?
        .ok_or_else(|| shared::Error::NotFound("No tab config found".to_string()))?;

    info!(email, security_profile, team, "Resolved dashboard tabs");
    Reply::serialized(
        200,
        &Dashboard {
            email: email.to_string(),
            security_profile: security_profile.to_string(),
            tabs: tab_config.get("tabnames").cloned().unwrap_or_else(|| json!([])),
        },
    )
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    info!("Received request: method={}, path={}", method, path);

    match (method, path) {
        ("OPTIONS", _) => preflight_response(),
        ("POST", "/userconfig") => {
            let body: Value = parse_body!(event.body());
            into_response(user_config(&state, &body).await)
        }
        ("POST", "/profileconfig") => {
            let body: Value = parse_body!(event.body());
            into_response(profile_config(&state, &body).await)
        }
        ("GET", "/dashboards") => {
            let params = event.query_string_parameters();
            into_response(dashboard(&state, params.first("email")).await)
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
    use shared::testing::MemoryStore;

    fn state() -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(
            MemoryStore::new()
                .with_table("users", &["username"])
                .with_table("tabs", &["securityprofile", "team"]),
        );
        let state = AppState {
            store: store.clone(),
            users_table: "users".to_string(),
            tabs_table: "tabs".to_string(),
        };
        (store, state)
    }

    fn alice() -> Value {
        json!({
            "username": "alice@example.com",
            "team": "care",
            "security_profile": "supervisor",
            "teamDisplay": "Customer Care",
            "securityProfileDisplay": "Supervisor"
        })
    }

    #[tokio::test]
    async fn test_user_lifecycle() {
        let (store, state) = state();
        let mut create = alice();
        create["action"] = json!("create");
        let reply = user_config(&state, &create).await.unwrap();
        assert_eq!(reply.body["message"], "User created successfully");
        assert_eq!(
            Value::Object(store.rows("users")[0].clone()),
            json!({
                "username": "alice@example.com",
                "team": "care",
                "security_profile": "supervisor",
                "team_display": "Customer Care",
                "security_profile_display": "Supervisor"
            })
        );

        let mut update = alice();
        update["action"] = json!("update");
        update["team"] = json!("sales");
        user_config(&state, &update).await.unwrap();
        assert_eq!(store.rows("users")[0]["team"], "sales");

        let listed = user_config(&state, &json!({"action": "list"})).await.unwrap();
        assert_eq!(listed.body["users"].as_array().unwrap().len(), 1);

        user_config(&state, &json!({"action": "delete", "username": "alice@example.com"}))
            .await
            .unwrap();
        assert!(store.rows("users").is_empty());
    }

    #[tokio::test]
    async fn test_user_config_validation() {
        let (_, state) = state();
        let err = user_config(&state, &json!({"username": "a"})).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing 'action' parameter");

        let err = user_config(&state, &json!({"action": "create", "username": "a"}))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = user_config(&state, &json!({"action": "rename"})).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid action");
    }

    #[tokio::test]
    async fn test_list_teams_profiles_unique_pairs() {
        let (store, state) = state();
        store.insert(
            "tabs",
            json!({"securityprofile": "sup", "team": "care", "team_display": "Care", "security_profile": "sup", "security_profile_display": "Supervisor"}),
        );
        store.insert(
            "tabs",
            json!({"securityprofile": "agent", "team": "care", "team_display": "Care", "security_profile": "agent", "security_profile_display": "Agent"}),
        );
        store.insert("tabs", json!({"securityprofile": "x", "team": "sales"}));

        let reply = user_config(&state, &json!({"action": "listTeamsProfiles"})).await.unwrap();
        assert_eq!(reply.body["teams"], json!([{"team": "care", "teamDisplay": "Care"}]));
        assert_eq!(
            reply.body["accessLevels"],
            json!([
                {"accessLevel": "sup", "accessLevelDisplay": "Supervisor"},
                {"accessLevel": "agent", "accessLevelDisplay": "Agent"}
            ])
        );
    }

    #[tokio::test]
    async fn test_profile_config_and_teams_tabs() {
        let (store, state) = state();
        profile_config(
            &state,
            &json!({"action": "create", "securityprofile": "sup", "team": "sales", "tabnames": ["Queues", "Agents"]}),
        )
        .await
        .unwrap();
        store.insert(
            "tabs",
            json!({"securityprofile": "agent", "team": "care", "tabnames": [{"S": "Queues"}, {"S": "Reports"}]}),
        );

        let reply = profile_config(&state, &json!({"action": "listTeamsTabs"})).await.unwrap();
        assert_eq!(reply.body["teams"], json!(["care", "sales"]));
        assert_eq!(reply.body["tabs"], json!(["Queues", "Agents", "Reports"]));

        profile_config(
            &state,
            &json!({"action": "update", "securityprofile": "sup", "team": "sales", "tabnames": ["Queues"]}),
        )
        .await
        .unwrap();
        assert_eq!(store.rows("tabs")[0]["tabnames"], json!(["Queues"]));

        profile_config(&state, &json!({"action": "delete", "securityprofile": "sup", "team": "sales"}))
            .await
            .unwrap();
        assert_eq!(store.rows("tabs").len(), 1);
    }

    #[tokio::test]
    async fn test_dashboard() {
        let (store, state) = state();
        store.insert(
            "users",
            json!({"username": "alice@example.com", "team": "care", "security_profile": "sup"}),
        );
        store.insert(
            "users",
            json!({"username": "bob@example.com", "team": "care", "securityprofile": "agent"}),
        );
        store.insert(
            "tabs",
            json!({"securityprofile": "sup", "team": "care", "tabnames": ["Queues", "Agents"]}),
        );

        let reply = dashboard(&state, Some("alice@example.com")).await.unwrap();
        assert_eq!(
            reply.body,
            json!({"email": "alice@example.com", "securityProfile": "sup", "tabs": ["Queues", "Agents"]})
        );

        let err = dashboard(&state, Some("bob@example.com")).await.unwrap_err();
        assert_eq!(err.to_string(), "No tab config found");
        let err = dashboard(&state, Some("carol@example.com")).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "User not found");
        let err = dashboard(&state, None).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
