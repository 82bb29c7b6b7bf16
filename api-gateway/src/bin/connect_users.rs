//! Connect Users Lambda - Read-only views of the instance's users.
//!
//! Endpoints:
//! - GET /business-configuration/users - Users with their current proficiencies
//! - GET /list-connect-agents - Flat agent listing

use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::Serialize;
use serde_json::json;
use shared::directory::list_all_users;
use shared::http::{into_response, no_route, preflight_response};
use shared::{Config, ConnectDirectory, Directory, Reply};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Proficiency as shown in the users grid.
#[derive(Debug, Serialize)]
struct ProficiencyLabel {
    label: String,
    level: Option<u8>,
}

#[derive(Debug, Serialize)]
struct UserRow {
    login: String,
    name: String,
    user_id: String,
    proficiencies: Vec<ProficiencyLabel>,
}

#[derive(Debug, Serialize)]
struct AgentEntry {
    agent_login: String,
    agent_name: String,
    agent_id: String,
}

/// Application state
struct AppState {
    directory: Arc<dyn Directory>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let sdk_config = config.load_aws().await;

        let directory = ConnectDirectory::new(
            aws_sdk_connect::Client::new(&sdk_config),
            config.instance_id()?,
        );

        Ok(Self {
            directory: Arc::new(directory),
        })
    }
}

/// Every user with a `Last, First` name and `attr=value` proficiency labels.
///
/// Users that cannot be described are skipped; a failed proficiency listing
/// shows as no proficiencies.
async fn list_users(state: &AppState) -> shared::Result<Reply> {
    let directory = state.directory.as_ref();
    let mut items = Vec::new();

    for summary in list_all_users(directory).await? {
        let user = match directory.describe_user(&summary.id).await {
            Ok(user) => user,
            Err(err) => {
                warn!(user_id = %summary.id, code = %err.code, "DescribeUser failed: {}", err.message);
                continue;
            }
        };

        let proficiencies = match directory.list_user_proficiencies(&summary.id).await {
            Ok(list) => list,
            Err(err) => {
                warn!(login = %user.username, code = %err.code, "ListUserProficiencies failed: {}", err.message);
                Vec::new()
            }
        };

        items.push(UserRow {
            name: user.sortable_name(),
            login: user.username,
            user_id: summary.id,
            proficiencies: proficiencies
                .iter()
                .map(|p| ProficiencyLabel {
                    label: p.label(),
                    level: p.level,
                })
                .collect(),
        });
    }

    items.sort_by_key(|row| row.login.to_lowercase());
    info!(count = items.len(), "Listed users");
    Reply::serialized(200, &json!({ "count": items.len(), "items": items }))
}

async fn list_agents(state: &AppState) -> shared::Result<Reply> {
    let agents: Vec<AgentEntry> = list_all_users(state.directory.as_ref())
        .await?
        .into_iter()
        .map(|user| AgentEntry {
            agent_name: user.username.clone(),
            agent_login: user.username,
            agent_id: user.id,
        })
        .collect();

    info!(count = agents.len(), "Fetched agents");
    Reply::serialized(200, &json!({ "agents": agents }))
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    info!("Received request: method={}, path={}", method, path);

    match (method, path) {
        ("OPTIONS", _) => preflight_response(),
        ("GET", "/business-configuration/users") => into_response(list_users(&state).await),
        ("GET", "/list-connect-agents") => into_response(list_agents(&state).await),
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
