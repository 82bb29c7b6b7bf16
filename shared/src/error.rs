//! Error types for the contact center admin Lambda functions.

use std::fmt;

use aws_sdk_connect::config::http::HttpResponse;
use aws_sdk_connect::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_connect::operation::RequestId;
use serde::Serialize;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Result of a single managed-service call.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Errors that can occur while handling an API request.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing request input
    #[error("{0}")]
    Validation(String),

    /// A referenced agent, profile or mapping does not exist
    #[error("{0}")]
    NotFound(String),

    /// A managed-service call failed with a provider error code
    #[error("{0}")]
    Upstream(#[from] ServiceError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::Upstream(err) => err.status(),
            _ => 500,
        }
    }

    /// Error code reported in the response body.
    pub fn code(&self) -> &str {
        match self {
            Error::Validation(_) => "BadRequest",
            Error::NotFound(_) => "NotFound",
            Error::Upstream(err) => &err.code,
            _ => "InternalServerError",
        }
    }

    /// Provider request id, when the failure came from an AWS call.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::Upstream(err) => err.request_id.as_deref(),
            _ => None,
        }
    }

    /// Reduce to a [`ServiceError`] so it can be reported as a step outcome.
    pub fn into_service_error(self) -> ServiceError {
        match self {
            Error::Upstream(err) => err,
            other => ServiceError::new(other.code().to_string(), other.to_string()),
        }
    }
}

/// A failed call to a managed service, reduced to what callers report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ServiceError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// A failure that never reached the service (dispatch, timeout, bad input shape).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("InternalServerError", message)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// HTTP status class for this error's code.
    pub fn status(&self) -> u16 {
        status_for_code(&self.code)
    }

    /// Convert any AWS SDK operation error.
    ///
    /// Service errors keep their code and message; transport failures become
    /// `InternalServerError`.
    pub fn from_sdk<E>(err: SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + RequestId + std::error::Error + 'static,
    {
        let request_id = err.request_id().map(str::to_string);
        let (code, message) = match err.as_service_error() {
            Some(service) => (
                service.code().unwrap_or("ClientError").to_string(),
                service
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| DisplayErrorContext(&err).to_string()),
            ),
            None => (
                "InternalServerError".to_string(),
                DisplayErrorContext(&err).to_string(),
            ),
        };

        Self {
            code,
            message,
            request_id,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " (requestId={})", request_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServiceError {}

/// Map a provider error code to an HTTP status.
///
/// Codes are compared without their `Exception` suffix so Connect, DynamoDB
/// and S3 spellings share one table. Unknown codes are treated as a bad
/// gateway.
pub fn status_for_code(code: &str) -> u16 {
    let name = code.strip_suffix("Exception").unwrap_or(code);
    match name {
        "BadRequest" | "InvalidRequest" | "InvalidParameter" | "Validation" | "TextLengthExceeded"
        | "InvalidSsml" => 400,
        "AccessDenied" => 403,
        "NotFound" | "ResourceNotFound" | "NoSuchKey" | "NoSuchBucket" => 404,
        "ResourceInUse" | "DuplicateResource" | "ConditionalCheckFailed" => 409,
        "Throttling" | "LimitExceeded" | "ProvisionedThroughputExceeded" | "RequestLimitExceeded" => {
            429
        }
        "InternalServerError" => 500,
        "InternalService" => 502,
        _ => 502,
    }
}
