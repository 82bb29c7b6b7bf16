//! Recorded agent greetings in S3.

use std::time::Duration;

use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::info;

use crate::{Error, Result, ServiceError};

/// Object key of an agent's greeting for one language.
pub fn greeting_key(username: &str, language: &str) -> Result<String> {
    for (field, value) in [("username", username), ("language", language)] {
        if value.trim().is_empty() {
            return Err(Error::Validation(format!("'{}' is required", field)));
        }
        if value.contains('/') {
            return Err(Error::Validation(format!("'{}' must not contain '/'", field)));
        }
    }
    Ok(format!("agent-greetings/{}/{}/agent_greeting.wav", username, language))
}

/// Greeting audio stored in one bucket, shared through presigned URLs.
pub struct GreetingStore {
    client: S3Client,
    bucket: String,
    expiry: Duration,
}

impl GreetingStore {
    pub fn new(client: S3Client, bucket: impl Into<String>, expiry: Duration) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            expiry,
        }
    }

    /// Presigned GET URL for a stored object.
    pub async fn presigned_url(&self, key: &str) -> Result<String> {
        let presigning = PresigningConfig::expires_in(self.expiry)
            .map_err(|e| Error::Config(format!("Invalid presigned URL expiry: {}", e)))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(ServiceError::from_sdk)?;
        Ok(request.uri().to_string())
    }

    /// Store WAV audio as the agent's greeting and return a URL to it.
    pub async fn upload(&self, username: &str, language: &str, audio: Vec<u8>) -> Result<String> {
        let key = greeting_key(username, language)?;
        let size = audio.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(audio))
            .content_type("audio/wav")
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        info!(username, language, bytes = size, "Greeting stored");
        self.presigned_url(&key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_key() {
        assert_eq!(
            greeting_key("alice", "en-US").unwrap(),
            "agent-greetings/alice/en-US/agent_greeting.wav"
        );
    }

    #[test]
    fn test_greeting_key_validation() {
        assert_eq!(greeting_key("", "en").unwrap_err().status_code(), 400);
        assert_eq!(greeting_key("alice", " ").unwrap_err().status_code(), 400);
        assert!(greeting_key("../bob", "en").is_err());
    }
}
