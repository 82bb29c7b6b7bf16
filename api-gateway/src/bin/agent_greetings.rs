//! Agent Greetings Lambda - Recorded greetings stored in S3.
//!
//! Endpoints:
//! - GET /agent-greeting?username=&language= - Presigned URL to a greeting
//! - POST /agent-greeting - Upload a base64 WAV greeting

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::greetings::greeting_key;
use shared::http::{from_body, into_response, no_route, non_empty, preflight_response};
use shared::{parse_body, Config, GreetingStore, Reply};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct UploadRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    greeting: String,
}

/// A validated upload: the decoded audio plus where it goes.
#[derive(Debug, PartialEq)]
struct Upload {
    username: String,
    language: String,
    audio: Vec<u8>,
}

impl UploadRequest {
    fn decode(self) -> shared::Result<Upload> {
        if [&self.username, &self.language, &self.greeting]
            .iter()
            .any(|v| v.trim().is_empty())
        {
            return Err(shared::Error::Validation(
                "Missing username, language, or greeting".to_string(),
            ));
        }
        greeting_key(&self.username, &self.language)?;

        let audio = STANDARD
            .decode(self.greeting.trim())
            .map_err(|e| shared::Error::Validation(format!("Field 'greeting' is not valid base64: {}", e)))?;
        Ok(Upload {
            username: self.username,
            language: self.language,
            audio,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignedReply {
    presigned_url: String,
}

/// Application state
struct AppState {
    greetings: GreetingStore,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let sdk_config = config.load_aws().await;

        let greetings = GreetingStore::new(
            aws_sdk_s3::Client::new(&sdk_config),
            config.greeting_bucket()?,
            config.presigned_url_expiry,
        );

        Ok(Self { greetings })
    }
}

/// Object key for the `username` and `language` query parameters.
fn key_for(username: Option<&str>, language: Option<&str>) -> shared::Result<String> {
    match (non_empty(username), non_empty(language)) {
        (Some(username), Some(language)) => greeting_key(username, language),
        _ => Err(shared::Error::Validation(
            "Both 'username' and 'language' query parameters are required.".to_string(),
        )),
    }
}

async fn get_greeting(state: &AppState, key: shared::Result<String>) -> shared::Result<Reply> {
    let key = key?;
    info!(key = %key, "Generating presigned URL");
    let presigned_url = state.greetings.presigned_url(&key).await?;
    Reply::serialized(200, &PresignedReply { presigned_url })
}

async fn upload_greeting(state: &AppState, body: &Value) -> shared::Result<Reply> {
    let upload = from_body::<UploadRequest>(body)?.decode()?;
    let presigned_url = state
        .greetings
        .upload(&upload.username, &upload.language, upload.audio)
        .await?;
    Reply::serialized(200, &PresignedReply { presigned_url })
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    info!("Received request: method={}, path={}", method, path);

    match (method, path) {
        ("OPTIONS", _) => preflight_response(),
        ("GET", "/agent-greeting") => {
            let params = event.query_string_parameters();
            let key = key_for(params.first("username"), params.first("language"));
            into_response(get_greeting(&state, key).await)
        }
        ("POST", "/agent-greeting") => {
            let body: Value = parse_body!(event.body());
            into_response(upload_greeting(&state, &body).await)
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

    #[test]
    fn test_key_from_query() {
        assert_eq!(
            key_for(Some("alice"), Some("en")).unwrap(),
            "agent-greetings/alice/en/agent_greeting.wav"
        );
        let err = key_for(Some("alice"), None).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(key_for(Some(" "), Some("en")).is_err());
        assert!(key_for(Some("../x"), Some("en")).is_err());
    }

    #[test]
    fn test_upload_decodes_audio() {
        let request: UploadRequest =
            from_body(&json!({"username": "alice", "language": "es", "greeting": "UklGRg=="})).unwrap();
        let upload = request.decode().unwrap();
        assert_eq!(upload.audio, b"RIFF".to_vec());
        assert_eq!(upload.language, "es");
    }

    #[test]
    fn test_upload_validation() {
        let missing: UploadRequest = from_body(&json!({"username": "alice", "language": "es"})).unwrap();
        assert_eq!(
            missing.decode().unwrap_err().to_string(),
            "Missing username, language, or greeting"
        );

        let garbled: UploadRequest =
            from_body(&json!({"username": "alice", "language": "es", "greeting": "%%%"})).unwrap();
        let err = garbled.decode().unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().starts_with("Field 'greeting' is not valid base64"));
    }
}
