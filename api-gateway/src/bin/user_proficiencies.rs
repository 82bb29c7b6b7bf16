//! User Proficiencies Lambda - Direct proficiency edits for one or many users.
//!
//! Endpoints:
//! - POST /business-configuration/user-proficiencies - Edit one user
//! - POST /business-configuration/user-proficiencies-bulk - Edit a batch of users

use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::Serialize;
use serde_json::Value;
use shared::changes::{apply_request, ChangeRequest, PreparedChanges, SectionReports, UserChangeReport};
use shared::http::{from_body, into_response, no_route, preflight_response};
use shared::reconcile::worst_status;
use shared::{parse_body, Config, ConnectDirectory, Directory, Reply};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SingleReply<'a> {
    instance_id: &'a str,
    user_id: String,
    username: Option<String>,
    results: Option<SectionReports>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkReply<'a> {
    instance_id: &'a str,
    count: usize,
    results: Vec<UserChangeReport>,
}

/// Application state
struct AppState {
    directory: Arc<dyn Directory>,
    instance_id: String,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let sdk_config = config.load_aws().await;
        let instance_id = config.instance_id()?.to_string();

        let directory = ConnectDirectory::new(aws_sdk_connect::Client::new(&sdk_config), &instance_id);

        Ok(Self {
            directory: Arc::new(directory),
            instance_id,
        })
    }
}

async fn change_user(state: &AppState, body: &Value) -> shared::Result<Reply> {
    let request: ChangeRequest = from_body(body)?;
    let prepared = PreparedChanges::prepare(&request)
        .ok_or_else(|| shared::Error::Validation("Field 'user_id' is required.".to_string()))?;
    if prepared.is_empty() {
        return Err(shared::Error::Validation(
            "Nothing to do. Provide at least one of associate/update/dissociate.".to_string(),
        ));
    }

    let user_id = prepared.user_id.clone();
    let report = prepared.apply(state.directory.as_ref()).await;
    Reply::serialized(
        report.status,
        &SingleReply {
            instance_id: &state.instance_id,
            user_id,
            username: report.username,
            results: report.results,
        },
    )
}

async fn change_users(state: &AppState, body: &Value) -> shared::Result<Reply> {
    let users = body
        .get("users")
        .and_then(Value::as_array)
        .filter(|users| !users.is_empty())
        .ok_or_else(|| shared::Error::Validation("Field 'users' (non-empty array) is required.".to_string()))?;

    let mut results = Vec::with_capacity(users.len());
    for entry in users {
        // Entries that are not objects are reported as missing a user_id.
        let request: ChangeRequest = serde_json::from_value(entry.clone()).unwrap_or_default();
        results.push(apply_request(state.directory.as_ref(), &request).await);
    }

    let overall_ok = results.iter().all(|r| r.overall_ok);
    let status = if overall_ok {
        200
    } else {
        worst_status(results.iter().map(|r| r.status))
    };
    info!(count = results.len(), overall_ok, status, "Bulk user proficiencies");

    Reply::serialized(
        status,
        &BulkReply {
            instance_id: &state.instance_id,
            count: results.len(),
            results,
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
        ("POST", "/business-configuration/user-proficiencies") => {
            let body: Value = parse_body!(event.body());
            into_response(change_user(&state, &body).await)
        }
        ("POST", "/business-configuration/user-proficiencies-bulk") => {
            let body: Value = parse_body!(event.body());
            into_response(change_users(&state, &body).await)
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
    use shared::proficiency::Proficiency;
    use shared::testing::{Call, FakeDirectory};
    use shared::ServiceError;

    fn state() -> (Arc<FakeDirectory>, AppState) {
        let directory = Arc::new(FakeDirectory::new().with_proficiencies(
            "u-1",
            vec![Proficiency::new("skill_name", "legacy", Some(1))],
        ));
        let state = AppState {
            directory: directory.clone(),
            instance_id: "inst-1".to_string(),
        };
        (directory, state)
    }

    #[tokio::test]
    async fn test_single_user_runs_sections_in_order() {
        let (directory, state) = state();
        let reply = change_user(
            &state,
            &json!({
                "user_id": "u-1",
                "username": "allison",
                "associate": [{"attributeName": "skill_name", "attributeValue": "billing", "level": 3}],
                "update": ["skill_name=billing (L4)"],
                "dissociate": [{"attributeName": "skill_name", "attributeValue": "legacy", "level": 9}]
            }),
        )
        .await
        .unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["instanceId"], "inst-1");
        assert_eq!(reply.body["userId"], "u-1");
        assert_eq!(reply.body["username"], "allison");
        assert_eq!(reply.body["results"]["dissociate"]["attempted"], 1);

        let kinds: Vec<&str> = directory
            .calls()
            .iter()
            .map(|c| match c {
                Call::Associate(..) => "associate",
                Call::Update(..) => "update",
                Call::Disassociate(..) => "dissociate",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["associate", "update", "dissociate"]);
        assert_eq!(
            directory.associated("u-1"),
            vec![Proficiency::new("skill_name", "billing", Some(4))]
        );
    }

    #[tokio::test]
    async fn test_single_user_validation() {
        let (_, state) = state();
        let err = change_user(&state, &json!({"associate": ["a=b"]})).await.unwrap_err();
        assert_eq!(err.to_string(), "Field 'user_id' is required.");

        let err = change_user(&state, &json!({"user_id": "u-1"})).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().starts_with("Nothing to do."));
    }

    #[tokio::test]
    async fn test_only_invalid_items_still_reported() {
        let (directory, state) = state();
        let reply = change_user(&state, &json!({"user_id": "u-1", "associate": ["garbage"]}))
            .await
            .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["results"]["associate"]["result"]["status"], "skipped");
        assert_eq!(
            reply.body["results"]["associate"]["invalid"][0]["reason"],
            "Unrecognized string format"
        );
        assert!(directory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_section_sets_status() {
        let (directory, state) = state();
        directory.fail("update_user_proficiencies", ServiceError::new("ThrottlingException", "slow down"));
        let reply = change_user(
            &state,
            &json!({"user_id": "u-1", "associate": ["a=b"], "update": ["a=b (L2)"]}),
        )
        .await
        .unwrap();
        assert_eq!(reply.status, 429);
        assert_eq!(reply.body["results"]["associate"]["result"]["status"], "succeeded");
        assert_eq!(reply.body["results"]["update"]["result"]["error"]["code"], "ThrottlingException");
    }

    #[tokio::test]
    async fn test_bulk_reports_each_user() {
        let (_, state) = state();
        let reply = change_users(
            &state,
            &json!({"users": [
                {"user_id": "u-1", "username": "a", "associate": ["x=y"]},
                {"username": "missing-id", "associate": ["x=y"]},
                "not an object"
            ]}),
        )
        .await
        .unwrap();

        assert_eq!(reply.status, 400);
        assert_eq!(reply.body["count"], 3);
        let results = reply.body["results"].as_array().unwrap();
        assert_eq!(results[0]["overallOk"], true);
        assert_eq!(results[1]["status"], 400);
        assert_eq!(results[1]["error"]["message"], "Field 'user_id' is required.");
        assert_eq!(results[2]["overallOk"], false);
    }

    #[tokio::test]
    async fn test_bulk_requires_users() {
        let (_, state) = state();
        for body in [json!({}), json!({"users": []}), json!({"users": "u-1"})] {
            let err = change_users(&state, &body).await.unwrap_err();
            assert_eq!(err.to_string(), "Field 'users' (non-empty array) is required.");
        }
    }
}
