//! Text-to-Speech utilities using Amazon Polly.

use aws_sdk_polly::types::{Engine, LanguageCode, OutputFormat, TextType, VoiceId};
use aws_sdk_polly::Client as PollyClient;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Error, Result, ServiceError};

/// A Polly voice as listed to the prompt editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub gender: String,
    pub language_code: String,
    pub language_name: String,
    pub additional_language_codes: Vec<String>,
    pub supported_engines: Vec<String>,
}

/// Speech synthesis request.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub voice: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default = "default_text_type")]
    pub text_type: String,
}

fn default_output_format() -> String {
    "mp3".to_string()
}

fn default_engine() -> String {
    "neural".to_string()
}

fn default_language_code() -> String {
    "en-US".to_string()
}

fn default_text_type() -> String {
    "text".to_string()
}

impl SpeechRequest {
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() || self.voice.trim().is_empty() {
            return Err(Error::Validation(
                "Fields 'text' and 'voice' are required.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Text-to-Speech service using Amazon Polly.
pub struct TtsService {
    client: PollyClient,
}

impl TtsService {
    pub fn new(client: PollyClient) -> Self {
        Self { client }
    }

    /// Every available voice, following pagination.
    pub async fn list_voices(&self) -> Result<Vec<Voice>> {
        let mut voices = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .describe_voices()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(ServiceError::from_sdk)?;

            voices.extend(output.voices().iter().map(|v| Voice {
                id: v.id().map(|id| id.as_str().to_string()).unwrap_or_default(),
                name: v.name().unwrap_or_default().to_string(),
                gender: v.gender().map(|g| g.as_str().to_string()).unwrap_or_default(),
                language_code: v
                    .language_code()
                    .map(|l| l.as_str().to_string())
                    .unwrap_or_default(),
                language_name: v.language_name().unwrap_or_default().to_string(),
                additional_language_codes: v
                    .additional_language_codes()
                    .iter()
                    .map(|l| l.as_str().to_string())
                    .collect(),
                supported_engines: v
                    .supported_engines()
                    .iter()
                    .map(|e| e.as_str().to_string())
                    .collect(),
            }));

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => return Ok(voices),
            }
        }
    }

    /// Synthesize speech, returning the raw audio bytes.
    pub async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        request.validate()?;
        info!(
            voice = %request.voice,
            engine = %request.engine,
            language_code = %request.language_code,
            "Synthesizing speech"
        );

        let response = self
            .client
            .synthesize_speech()
            .text(&request.text)
            .voice_id(VoiceId::from(request.voice.as_str()))
            .engine(Engine::from(request.engine.as_str()))
            .language_code(LanguageCode::from(request.language_code.as_str()))
            .text_type(TextType::from(request.text_type.as_str()))
            .output_format(OutputFormat::from(request.output_format.as_str()))
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        let audio = response
            .audio_stream
            .collect()
            .await
            .map_err(|e| ServiceError::new("AudioStreamMissing", e.to_string()))?
            .to_vec();
        if audio.is_empty() {
            return Err(ServiceError::new("AudioStreamMissing", "No audio data returned by Polly.").into());
        }

        info!(bytes = audio.len(), "Speech synthesized");
        Ok(audio)
    }
}
