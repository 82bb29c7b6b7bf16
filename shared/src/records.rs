//! Raw rows for the configuration tables the console edits directly.
//!
//! Requests carry the row's attributes inline next to routing fields such as
//! `action`. These helpers strip the routing fields and blank values and
//! separate the primary key from the attributes to write.

use serde_json::Value;

use crate::store::Item;

/// Request fields that select the operation and are never stored.
pub const REQUEST_ONLY_KEYS: &[&str] = &["action", "businessGroup", "channelType"];

/// Null, or a string holding only whitespace.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// First of `keys` holding a non-blank string.
pub fn first_text<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| body.get(*key))
        .filter(|value| !is_blank(value))
        .find_map(Value::as_str)
}

/// Copy a request body into a row, renaming attributes with `rename`.
pub fn row_from_request(body: &Value, rename: impl Fn(&str) -> String) -> Item {
    let Some(fields) = body.as_object() else {
        return Item::new();
    };
    fields
        .iter()
        .filter(|(name, value)| !REQUEST_ONLY_KEYS.contains(&name.as_str()) && !is_blank(value))
        .map(|(name, value)| (rename(name), value.clone()))
        .collect()
}

/// Split a row into its key and its remaining attributes.
///
/// `None` when any key attribute is missing or blank.
pub fn split_key(mut row: Item, key_attributes: &[&str]) -> Option<(Item, Item)> {
    let mut key = Item::new();
    for attribute in key_attributes {
        let value = row.remove(*attribute).filter(|v| !is_blank(v))?;
        key.insert(attribute.to_string(), value);
    }
    Some((key, row))
}

/// Replace every `#` in attribute names with `_`.
pub fn underscore_names(row: Item) -> Item {
    row.into_iter()
        .map(|(name, value)| (name.replace('#', "_"), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_drops_routing_fields_and_blanks() {
        let body = json!({
            "action": "create",
            "businessGroup": "bg-1",
            "channelType": "voice",
            "callflow_name": "main",
            "prompt_id": "p-1",
            "text": "  ",
            "voice": null,
            "enabled": false,
        });
        let row = row_from_request(&body, str::to_string);
        assert_eq!(
            Value::Object(row),
            json!({"callflow_name": "main", "prompt_id": "p-1", "enabled": false})
        );
    }

    #[test]
    fn test_split_key() {
        let row = row_from_request(&json!({"a": "1", "b": "2", "c": "3"}), str::to_string);
        let (key, rest) = split_key(row.clone(), &["a", "b"]).unwrap();
        assert_eq!(Value::Object(key), json!({"a": "1", "b": "2"}));
        assert_eq!(Value::Object(rest), json!({"c": "3"}));

        assert!(split_key(row, &["a", "missing"]).is_none());
    }

    #[test]
    fn test_first_text_skips_blank() {
        let body = json!({"businessGroup": "", "business_group_id": "bg-9"});
        assert_eq!(first_text(&body, &["businessGroup", "business_group_id"]), Some("bg-9"));
        assert_eq!(first_text(&body, &["other"]), None);
    }

    #[test]
    fn test_underscore_names() {
        let row = row_from_request(&json!({"broadcast_message#en": "hi"}), str::to_string);
        assert_eq!(Value::Object(underscore_names(row)), json!({"broadcast_message_en": "hi"}));
    }
}
