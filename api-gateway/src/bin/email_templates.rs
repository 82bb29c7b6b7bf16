//! Email Templates Lambda - Templates available to a routing profile.
//!
//! Endpoints:
//! - GET /email-template-app/{routingProfile+} - Templates whose routing profiles include the given one

use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use serde::Serialize;
use shared::http::{into_response, no_route, non_empty, preflight_response};
use shared::store::{Filter, Item};
use shared::{Config, DynamoStore, KeyValueStore, Reply};
use tracing::info;
use tracing_subscriber::EnvFilter;

const RESOURCE: &str = "/email-template-app";

#[derive(Debug, Serialize)]
struct TemplatesReply<'a> {
    name: &'a str,
    templates: Vec<Item>,
}

/// Application state
struct AppState {
    store: Arc<dyn KeyValueStore>,
    templates_table: String,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let sdk_config = config.load_aws().await;

        Ok(Self {
            store: Arc::new(DynamoStore::new(aws_sdk_dynamodb::Client::new(&sdk_config))),
            templates_table: config.email_templates_table,
        })
    }
}

fn template_name(item: &Item) -> String {
    item.get("template_name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_lowercase()
}

async fn list_templates(state: &AppState, routing_profile: &str) -> shared::Result<Reply> {
    let routing_profile = non_empty(Some(routing_profile)).ok_or_else(|| {
        shared::Error::Validation("Path parameter 'routingProfile' is required.".to_string())
    })?;
    info!(routing_profile, "Get email templates");

    let filter = Filter::contains("routing_profile", routing_profile);
    let mut templates = state.store.scan(&state.templates_table, Some(&filter)).await?;
    templates.sort_by_key(template_name);

    info!(count = templates.len(), "Found templates");
    Reply::serialized(
        200,
        &TemplatesReply {
            name: routing_profile,
            templates,
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
        ("GET", p) if p.starts_with(RESOURCE) => {
            let params = event.path_parameters();
            let routing_profile = params
                .first("routingProfile")
                .or_else(|| p.strip_prefix(RESOURCE).map(|rest| rest.trim_start_matches('/')))
                .unwrap_or_default();
            into_response(list_templates(&state, routing_profile).await)
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
    use shared::testing::MemoryStore;
    use shared::ServiceError;

    fn state() -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(MemoryStore::new().with_table("templates", &["template_id"]));
        for (id, name, profiles) in [
            ("t-1", "welcome", json!(["Billing", "Sales"])),
            ("t-2", "Apology", json!(["Billing"])),
            ("t-3", "Promo", json!(["Sales"])),
            ("t-4", "legacy", json!("Billing-East")),
        ] {
            store.insert(
                "templates",
                json!({"template_id": id, "template_name": name, "routing_profile": profiles}),
            );
        }
        let state = AppState {
            store: store.clone(),
            templates_table: "templates".to_string(),
        };
        (store, state)
    }

    #[tokio::test]
    async fn test_templates_for_profile_sorted() {
        let (_, state) = state();
        let reply = list_templates(&state, "Billing").await.unwrap();
        assert_eq!(reply.body["name"], "Billing");
        let names: Vec<&str> = reply.body["templates"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["template_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Apology", "legacy", "welcome"]);
    }

    #[tokio::test]
    async fn test_blank_profile_rejected() {
        let (_, state) = state();
        let err = list_templates(&state, "").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_code() {
        let (store, state) = state();
        store.fail("templates", ServiceError::new("AccessDeniedException", "no scan"));
        let err = list_templates(&state, "Sales").await.unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.code(), "AccessDeniedException");
    }
}
