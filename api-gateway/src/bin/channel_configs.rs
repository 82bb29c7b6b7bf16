//! Channel Configuration Lambda - Business-group messages and call-flow prompts.
//!
//! Endpoints:
//! - POST /chaneltypeconfigs - Action-style CRUD on business-group configs
//! - POST /chaneltypeprompts - Action-style CRUD on call-flow prompts
//!
//! Both default to `list` when no action is given.

use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde_json::{json, Value};
use shared::http::{action_of, into_response, invalid_action, no_route, preflight_response};
use shared::records::{first_text, row_from_request, split_key, underscore_names};
use shared::store::{Item, Query};
use shared::{parse_body, Config, DynamoStore, KeyValueStore, Reply};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_SORT_KEY: &str = "config_type#channel_type";
const CONFIG_KEY: &[&str] = &["business_group_id", CONFIG_SORT_KEY];
const PROMPT_KEY: &[&str] = &["callflow_name", "prompt_id"];
const PROMPT_INDEX: &str = "business_group_id-channel-index";

/// Stored attribute names and the names the console uses for them.
const CONFIG_ATTRIBUTE_NAMES: &[(&str, &str)] = &[
    ("config_type#channel_type", "config_type_channel_type"),
    ("broadcast_message#en", "broadcast_message_en"),
    ("broadcast_message#es", "broadcast_message_es"),
    ("first_hold_message#en", "first_hold_message_en"),
    ("first_hold_message#es", "first_hold_message_es"),
    ("initial_queue_message#en", "initial_queue_message_en"),
    ("initial_queue_message#es", "initial_queue_message_es"),
    ("out_of_service_message#en", "out_of_service_message_en"),
    ("out_of_service_message#es", "out_of_service_message_es"),
    ("second_hold_message#en", "second_hold_message_en"),
    ("second_hold_message#es", "second_hold_message_es"),
    ("voicemail_prompt#en", "voicemail_prompt_en"),
];

fn config_ui_name(stored: &str) -> String {
    CONFIG_ATTRIBUTE_NAMES
        .iter()
        .find(|(db, _)| *db == stored)
        .map_or(stored, |(_, ui)| *ui)
        .to_string()
}

fn config_stored_name(ui: &str) -> String {
    CONFIG_ATTRIBUTE_NAMES
        .iter()
        .find(|(_, name)| *name == ui)
        .map_or(ui, |(db, _)| *db)
        .to_string()
}

fn missing_keys(key: &[&str]) -> shared::Error {
    let names: Vec<String> = key.iter().map(|k| format!("'{}'", k)).collect();
    shared::Error::Validation(format!("Missing primary keys: {} are required", names.join(" and ")))
}

fn nothing_to_update() -> shared::Error {
    shared::Error::Validation("No attributes provided for update".to_string())
}

/// Business group and channel selecting a listing.
fn list_scope(body: &Value) -> shared::Result<(&str, &str)> {
    match (
        first_text(body, &["businessGroup", "business_group_id"]),
        first_text(body, &["channelType"]),
    ) {
        (Some(group), Some(channel)) => Ok((group, channel)),
        _ => Err(shared::Error::Validation(
            "Both 'businessGroup' and 'channelType' are required".to_string(),
        )),
    }
}

/// Whether a config sort key belongs to a channel. `generic` covers voice and chat.
fn is_channel_match(sort_key: &str, channel: &str) -> bool {
    if channel == "generic" {
        sort_key.ends_with("#voice") || sort_key.ends_with("#chat")
    } else {
        sort_key.ends_with(&format!("#{}", channel))
    }
}

/// Application state
struct AppState {
    store: Arc<dyn KeyValueStore>,
    configs_table: String,
    prompts_table: String,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let sdk_config = config.load_aws().await;

        Ok(Self {
            store: Arc::new(DynamoStore::new(aws_sdk_dynamodb::Client::new(&sdk_config))),
            configs_table: config.business_group_configs_table,
            prompts_table: config.callflow_prompts_table,
        })
    }
}

async fn configs(state: &AppState, body: &Value) -> shared::Result<Reply> {
    let action = action_of(body).unwrap_or("list");
    info!(action, "Channel type configs");
    let table = state.configs_table.as_str();

    match action {
        "list" => {
            let (group, channel) = list_scope(body)?;
            let items = state
                .store
                .query(table, &Query::partition("business_group_id", group))
                .await?;
            let results: Vec<Item> = items
                .into_iter()
                .filter(|item| {
                    item.get(CONFIG_SORT_KEY)
                        .and_then(Value::as_str)
                        .is_some_and(|sk| is_channel_match(sk, channel))
                })
                .map(|item| item.into_iter().map(|(k, v)| (config_ui_name(&k), v)).collect())
                .collect();
            info!(count = results.len(), business_group = group, channel, "Listed configs");
            Ok(Reply::ok(json!({ "results": results })))
        }

        "create" => {
            let row = row_from_request(body, config_stored_name);
            if split_key(row.clone(), CONFIG_KEY).is_none() {
                return Err(missing_keys(CONFIG_KEY));
            }
            state.store.put(table, row).await?;
            Ok(Reply::message("Configuration created successfully"))
        }

        "update" => {
            let row = row_from_request(body, config_stored_name);
            let (key, changes) = split_key(row, CONFIG_KEY).ok_or_else(|| missing_keys(CONFIG_KEY))?;
            if changes.is_empty() {
                return Err(nothing_to_update());
            }
            state.store.update(table, &key, changes).await?;
            Ok(Reply::message("Configuration updated successfully"))
        }

        "delete" => {
            let group = first_text(body, &["business_group_id"]);
            let sort_key = first_text(body, &[CONFIG_SORT_KEY, "config_type_channel_type"]);
            let (Some(group), Some(sort_key)) = (group, sort_key) else {
                return Err(missing_keys(CONFIG_KEY));
            };
            let key = shared::store::key(&[("business_group_id", group), (CONFIG_SORT_KEY, sort_key)]);
            state.store.delete(table, &key).await?;
            Ok(Reply::message("Configuration deleted successfully"))
        }

        _ => Err(invalid_action()),
    }
}

async fn prompts(state: &AppState, body: &Value) -> shared::Result<Reply> {
    let action = action_of(body).unwrap_or("list");
    info!(action, "Channel type prompts");
    let table = state.prompts_table.as_str();

    match action {
        "list" => {
            let (group, channel) = list_scope(body)?;
            let mut query = Query::partition("business_group_id", group).on_index(PROMPT_INDEX);
            if channel != "generic" {
                query = query.and("channel", channel);
            }
            let results: Vec<Item> = state
                .store
                .query(table, &query)
                .await?
                .into_iter()
                .map(underscore_names)
                .collect();
            info!(count = results.len(), business_group = group, channel, "Listed prompts");
            Ok(Reply::ok(json!({ "results": results })))
        }

        "create" => {
            let row = row_from_request(body, str::to_string);
            if split_key(row.clone(), PROMPT_KEY).is_none() {
                return Err(missing_keys(PROMPT_KEY));
            }
            state.store.put(table, row).await?;
            Ok(Reply::message("Prompt created successfully"))
        }

        "update" => {
            let row = row_from_request(body, str::to_string);
            let (key, changes) = split_key(row, PROMPT_KEY).ok_or_else(|| missing_keys(PROMPT_KEY))?;
            if changes.is_empty() {
                return Err(nothing_to_update());
            }
            state.store.update(table, &key, changes).await?;
            Ok(Reply::message("Prompt updated successfully"))
        }

        "delete" => {
            let row = row_from_request(body, str::to_string);
            let (key, _) = split_key(row, PROMPT_KEY).ok_or_else(|| missing_keys(PROMPT_KEY))?;
            state.store.delete(table, &key).await?;
            Ok(Reply::message("Prompt deleted successfully"))
        }

        _ => Err(invalid_action()),
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    info!("Received request: method={}, path={}", method, path);

    match (method, path) {
        ("OPTIONS", _) => preflight_response(),
        ("POST", "/chaneltypeconfigs") => {
            let body: Value = parse_body!(event.body());
            into_response(configs(&state, &body).await)
        }
        ("POST", "/chaneltypeprompts") => {
            let body: Value = parse_body!(event.body());
            into_response(prompts(&state, &body).await)
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
