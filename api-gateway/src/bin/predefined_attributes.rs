//! Predefined Attributes Lambda - Manages the instance's routing attributes.
//!
//! Endpoints:
//! - GET /business-configuration/predefined-attributes - Attribute catalog
//! - POST /business-configuration/predefined-attributes - Create an attribute
//! - DELETE /business-configuration/predefined-attributes/{attributeName+} - Delete an attribute

use std::borrow::Cow;
use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use serde::Serialize;
use serde_json::Value;
use shared::cache::{TtlCache, CATALOG_TTL};
use shared::catalog::{describe_all, AttributeCatalog};
use shared::http::{into_response, no_route, non_empty, preflight_response};
use shared::{parse_body, Config, ConnectDirectory, Directory, Reply};
use tracing::info;
use tracing_subscriber::EnvFilter;

const RESOURCE: &str = "/business-configuration/predefined-attributes";

#[derive(Debug, Serialize)]
struct Created {
    created: bool,
    name: String,
    values: Vec<String>,
    message: String,
}

#[derive(Debug, Serialize)]
struct Deleted {
    deleted: bool,
    name: String,
    message: String,
}

/// Application state
struct AppState {
    directory: Arc<dyn Directory>,
    catalog: TtlCache<AttributeCatalog>,
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
            catalog: TtlCache::new(CATALOG_TTL),
        })
    }
}

/// Attribute name from `name` or `attributeName`.
fn attribute_name(body: &Value) -> shared::Result<String> {
    ["name", "attributeName"]
        .iter()
        .find_map(|key| non_empty(body.get(*key).and_then(Value::as_str)))
        .map(str::to_string)
        .ok_or_else(|| shared::Error::Validation("Field 'name' is required.".to_string()))
}

/// Values from `values` or `StringList`: one string or a list, trimmed, blanks dropped.
fn attribute_values(body: &Value) -> shared::Result<Vec<String>> {
    let raw = ["values", "StringList"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find(|v| !v.is_null())
        .ok_or_else(|| {
            shared::Error::Validation("Field 'values' (array of strings) is required.".to_string())
        })?;

    let values: Vec<String> = match raw {
        Value::String(s) => vec![s.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect(),
        _ => {
            return Err(shared::Error::Validation(
                "Field 'values' must be a string or array of strings.".to_string(),
            ))
        }
    };

    let values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
    if values.is_empty() {
        return Err(shared::Error::Validation("Field 'values' cannot be empty.".to_string()));
    }
    Ok(values)
}

async fn get_catalog(state: &AppState) -> shared::Result<Reply> {
    let catalog = state
        .catalog
        .get_or_refresh(|| async {
            let details = describe_all(state.directory.as_ref()).await?;
            Ok::<_, shared::Error>(AttributeCatalog::from_details(&details))
        })
        .await?;
    info!(count = catalog.attribute_options.len(), "Returned predefined attributes");
    Reply::serialized(200, catalog.as_ref())
}

async fn create_attribute(state: &AppState, body: &Value) -> shared::Result<Reply> {
    let name = attribute_name(body)?;
    let values = attribute_values(body)?;

    state.directory.create_predefined_attribute(&name, &values).await?;
    state.catalog.invalidate().await;
    info!(attribute = %name, count = values.len(), "Predefined attribute created");

    let message = format!("Predefined attribute '{}' was created.", name);
    Reply::serialized(
        201,
        &Created {
            created: true,
            name,
            values,
            message,
        },
    )
}

async fn delete_attribute(state: &AppState, name: &str) -> shared::Result<Reply> {
    let name = non_empty(Some(name)).ok_or_else(|| {
        shared::Error::Validation("Path parameter 'attributeName' is required.".to_string())
    })?;

    state.directory.delete_predefined_attribute(name).await?;
    state.catalog.invalidate().await;
    info!(attribute = %name, "Predefined attribute deleted");

    Reply::serialized(
        200,
        &Deleted {
            deleted: true,
            name: name.to_string(),
            message: format!("Predefined attribute '{}' was deleted.", name),
        },
    )
}

/// Attribute name addressed by a DELETE path under the resource.
///
/// The API Gateway path parameter is used when present; otherwise the raw
/// path segment is percent-decoded.
fn path_attribute_name(path: &str, param: Option<&str>) -> Option<String> {
    let rest = path.strip_prefix(RESOURCE)?.strip_prefix('/')?;
    if let Some(name) = param {
        return Some(name.to_string());
    }
    let name = urlencoding::decode(rest)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| rest.to_string());
    Some(name)
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    info!("Received request: method={}, path={}", method, path);

    let result = match (method, path) {
        ("OPTIONS", _) => return preflight_response(),
        ("GET", RESOURCE) => get_catalog(&state).await,
        ("POST", RESOURCE) => {
            let body: Value = parse_body!(event.body());
            create_attribute(&state, &body).await
        }
        ("DELETE", p) => {
            let params = event.path_parameters();
            match path_attribute_name(p, params.first("attributeName")) {
                Some(name) => delete_attribute(&state, &name).await,
                None => Ok(no_route(method, path)),
            }
        }
        _ => Ok(no_route(method, path)),
    };

    into_response(result)
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
