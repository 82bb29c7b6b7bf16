//! Polly Lambda - Voices and speech previews for the prompt editor.
//!
//! Endpoints:
//! - GET /polly/languages - Available voices
//! - POST /polly/speech - Synthesize text, returned as base64 audio

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::Serialize;
use serde_json::{json, Value};
use shared::http::{from_body, into_response, no_route, preflight_response};
use shared::tts::SpeechRequest;
use shared::{parse_body, Config, Reply, TtsService};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Synthesized audio with the settings used to produce it.
#[derive(Debug, Serialize)]
struct SpeechReply<'a> {
    audio: String,
    voice: &'a str,
    format: &'a str,
    engine: &'a str,
    language_code: &'a str,
}

impl<'a> SpeechReply<'a> {
    fn new(request: &'a SpeechRequest, audio: &[u8]) -> Self {
        Self {
            audio: STANDARD.encode(audio),
            voice: &request.voice,
            format: &request.output_format,
            engine: &request.engine,
            language_code: &request.language_code,
        }
    }
}

/// Application state
struct AppState {
    tts: TtsService,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let sdk_config = config.load_aws().await;

        Ok(Self {
            tts: TtsService::new(aws_sdk_polly::Client::new(&sdk_config)),
        })
    }
}

async fn list_voices(state: &AppState) -> shared::Result<Reply> {
    let voices = state.tts.list_voices().await?;
    info!(count = voices.len(), "Listed voices");
    Reply::serialized(200, &json!({ "voices": voices }))
}

async fn synthesize(state: &AppState, body: &Value) -> shared::Result<Reply> {
    let request: SpeechRequest = from_body(body)?;
    let audio = state.tts.synthesize(&request).await?;
    info!(bytes = audio.len(), "Synthesized audio");
    Reply::serialized(200, &SpeechReply::new(&request, &audio))
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    info!("Received request: method={}, path={}", method, path);

    match (method, path) {
        ("OPTIONS", _) => preflight_response(),
        ("GET", "/polly/languages") => into_response(list_voices(&state).await),
        ("POST", "/polly/speech") => {
            let body: Value = parse_body!(event.body());
            into_response(synthesize(&state, &body).await)
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

    #[test]
    fn test_reply_uses_request_defaults() {
        let request: SpeechRequest = from_body(&json!({"text": "Hello", "voice": "Joanna"})).unwrap();
        let reply = serde_json::to_value(SpeechReply::new(&request, b"ID3")).unwrap();
        assert_eq!(
            reply,
            json!({
                "audio": "SUQz",
                "voice": "Joanna",
                "format": "mp3",
                "engine": "neural",
                "language_code": "en-US"
            })
        );
    }

    #[test]
    fn test_reply_echoes_overrides() {
        let request: SpeechRequest = from_body(&json!({
            "text": "<speak>Hola</speak>",
            "voice": "Lupe",
            "output_format": "ogg_vorbis",
            "engine": "standard",
            "language_code": "es-US",
            "text_type": "ssml"
        }))
        .unwrap();
        let reply = serde_json::to_value(SpeechReply::new(&request, &[])).unwrap();
        assert_eq!(reply["format"], "ogg_vorbis");
        assert_eq!(reply["engine"], "standard");
        assert_eq!(reply["language_code"], "es-US");
        assert_eq!(reply["audio"], "");
    }

    #[test]
    fn test_missing_voice_rejected() {
        let request: SpeechRequest = from_body(&json!({"text": "Hello"})).unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Fields 'text' and 'voice' are required.");
    }
}
