//! HTTP helpers for Lambda functions.

use lambda_http::{Body, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::Error;

/// Headers attached to every response so the browser console can call us.
const CORS_HEADERS: &[(&str, &str)] = &[
    ("content-type", "application/json"),
    ("access-control-allow-origin", "*"),
    ("access-control-allow-methods", "GET,POST,PUT,DELETE,OPTIONS"),
    (
        "access-control-allow-headers",
        "Content-Type,Authorization,X-Amz-Date,X-Api-Key,X-Amz-Security-Token",
    ),
];

/// A handler result before it is turned into an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    /// Reply with any serializable body.
    pub fn serialized<T: Serialize>(status: u16, body: &T) -> crate::Result<Self> {
        Ok(Self::new(status, serde_json::to_value(body)?))
    }

    /// `{"message": ...}` with status 200.
    pub fn message(message: impl Into<String>) -> Self {
        Self::ok(serde_json::json!({ "message": message.into() }))
    }
}

/// Standard error payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody<'a> {
    pub error: &'a str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<&'a str>,
}

/// Create a JSON response with the given status code and data.
pub fn json_response<T: Serialize>(status: u16, data: &T) -> Result<Response<Body>, lambda_http::Error> {
    let mut builder = Response::builder().status(status);
    for (name, value) in CORS_HEADERS {
        builder = builder.header(*name, *value);
    }
    let response = builder
        .body(Body::from(serde_json::to_string(data)?))
        .map_err(Box::new)?;
    Ok(response)
}

/// Create an error response with the given status code, code and message.
pub fn error_response(
    status: u16,
    code: &str,
    message: impl Into<String>,
) -> Result<Response<Body>, lambda_http::Error> {
    json_response(
        status,
        &ErrorBody {
            error: code,
            message: message.into(),
            request_id: None,
        },
    )
}

/// Response to a CORS preflight request.
pub fn preflight_response() -> Result<Response<Body>, lambda_http::Error> {
    let mut builder = Response::builder()
        .status(204)
        .header("access-control-max-age", "600");
    for (name, value) in CORS_HEADERS {
        builder = builder.header(*name, *value);
    }
    let response = builder
        .body(Body::from(r#"{"message":"ok"}"#))
        .map_err(Box::new)?;
    Ok(response)
}

/// Body for an error, as returned to callers.
///
/// Local failures behind a 500 carry a generic message; the detail is only
/// logged.
pub fn error_body(err: &Error) -> Value {
    let message = match err {
        Error::Upstream(_) => err.to_string(),
        _ if err.status_code() >= 500 => "Internal server error".to_string(),
        _ => err.to_string(),
    };
    serde_json::to_value(ErrorBody {
        error: err.code(),
        message,
        request_id: err.request_id(),
    })
    .unwrap_or(Value::Null)
}

/// Turn a handler outcome into a response, logging failures by class.
pub fn into_response(result: crate::Result<Reply>) -> Result<Response<Body>, lambda_http::Error> {
    match result {
        Ok(reply) => json_response(reply.status, &reply.body),
        Err(err) => {
            let status = err.status_code();
            if status >= 500 {
                error!(code = err.code(), request_id = err.request_id(), "Request failed: {}", err);
            } else {
                warn!(code = err.code(), request_id = err.request_id(), "Request rejected: {}", err);
            }
            json_response(status, &error_body(&err))
        }
    }
}

/// 404 for a method/path this function does not serve.
pub fn no_route(method: &str, path: &str) -> Reply {
    Reply::new(
        404,
        serde_json::json!({
            "error": "NotFound",
            "message": format!("No route for {} {}", method, path),
        }),
    )
}

/// Parse request body as JSON, returning a 400 response on failure.
///
/// An empty body parses as `{}`. Returns `Ok(Ok(T))` on successful parse,
/// `Ok(Err(Response))` on parse error (400), or `Err(lambda_http::Error)` on
/// serialization failure.
pub fn parse_json_body<T: DeserializeOwned>(body: &Body) -> Result<Result<T, Response<Body>>, lambda_http::Error> {
    let bytes: &[u8] = body.as_ref();
    let bytes = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        bytes
    };

    match serde_json::from_slice(bytes) {
        Ok(parsed) => Ok(Ok(parsed)),
        Err(e) => {
            let response = error_response(400, "BadRequest", format!("Invalid request body: {}", e))?;
            Ok(Err(response))
        }
    }
}

/// Macro to parse request body, returning early with 400 on parse error.
///
/// Usage:
/// ```ignore
/// let request: MyRequest = parse_body!(event.body());
/// ```
#[macro_export]
macro_rules! parse_body {
    ($body:expr) => {
        match shared::http::parse_json_body($body)? {
            Ok(parsed) => parsed,
            Err(response) => return Ok(response),
        }
    };
}

/// The `action` discriminator of an action-style request body.
pub fn action_of(body: &Value) -> Option<&str> {
    body.get("action").and_then(Value::as_str)
}

/// Error returned for an unrecognized `action`.
pub fn invalid_action() -> Error {
    Error::Validation("Invalid action".to_string())
}

/// Decode a request body into a typed payload, as a validation failure.
pub fn from_body<T: DeserializeOwned>(body: &Value) -> crate::Result<T> {
    T::deserialize(body).map_err(|e| Error::Validation(format!("Invalid request: {}", e)))
}

/// Strip surrounding whitespace and treat empty strings as absent.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Named {
        name: String,
    }

    #[test]
    fn test_empty_body_parses_as_object() {
        let parsed: Value = parse_json_body(&Body::Empty).unwrap().unwrap();
        assert_eq!(parsed, serde_json::json!({}));
    }

    #[test]
    fn test_invalid_body_is_bad_request() {
        let response = parse_json_body::<Value>(&Body::from("{not json")).unwrap().unwrap_err();
        assert_eq!(response.status(), 400);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[test]
    fn test_from_body_reports_missing_field() {
        let err = from_body::<Named>(&serde_json::json!({"action": "create"})).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_error_body_carries_request_id() {
        let err = Error::from(
            crate::ServiceError::new("AccessDeniedException", "denied").with_request_id("r-1"),
        );
        let body = error_body(&err);
        assert_eq!(body["error"], "AccessDeniedException");
        assert_eq!(body["requestId"], "r-1");
    }

    #[test]
    fn test_local_failures_hide_detail() {
        let body = error_body(&Error::Config("CONNECT_INSTANCE_ID not set".into()));
        assert_eq!(body["error"], "InternalServerError");
        assert_eq!(body["message"], "Internal server error");

        let body = error_body(&Error::Internal("record did not serialize".into()));
        assert_eq!(body["message"], "Internal server error");

        let body = error_body(&Error::Validation("Field 'name' is required.".into()));
        assert_eq!(body["message"], "Field 'name' is required.");
    }

    #[test]
    fn test_into_response_keeps_status_for_local_failures() {
        let response = into_response(Err(Error::Config("CONNECT_INSTANCE_ID not set".into()))).unwrap();
        assert_eq!(response.status(), 500);
        let body: Value = serde_json::from_slice(response.body().as_ref()).unwrap();
        assert_eq!(body["message"], "Internal server error");
    }

    #[test]
    fn test_preflight() {
        let response = preflight_response().unwrap();
        assert_eq!(response.status(), 204);
        assert_eq!(response.headers()["access-control-max-age"], "600");
    }
}
