//! Proficiency normalization and deduplication.
//!
//! Proficiencies reach us as loosely shaped JSON: structured records in either
//! `attributeName` or `AttributeName` casing, or strings such as
//! `skill_name=billing (L3)`. [`normalize`] turns any of these into canonical
//! [`Proficiency`] values and keeps the rejects alongside a reason.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lowest skill level the directory accepts.
pub const MIN_LEVEL: u8 = 1;
/// Highest skill level the directory accepts.
pub const MAX_LEVEL: u8 = 5;

const NAME_KEYS: &[&str] = &["attributeName", "AttributeName"];
const VALUE_KEYS: &[&str] = &["attributeValue", "AttributeValue"];
const LEVEL_KEYS: &[&str] = &["level", "Level"];

/// A canonical attribute/value pair with an optional level.
///
/// Serialized in the directory's PascalCase shape. `level` is absent for
/// removal requests, which only identify the pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Proficiency {
    pub attribute_name: String,
    pub attribute_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
}

impl Proficiency {
    pub fn new(name: impl Into<String>, value: impl Into<String>, level: Option<u8>) -> Self {
        Self {
            attribute_name: name.into(),
            attribute_value: value.into(),
            level,
        }
    }

    /// Identity of this proficiency, ignoring the level.
    pub fn pair(&self) -> AttributePair {
        AttributePair {
            attribute_name: self.attribute_name.clone(),
            attribute_value: self.attribute_value.clone(),
        }
    }

    /// `name=value` display label.
    pub fn label(&self) -> String {
        format!("{}={}", self.attribute_name, self.attribute_value)
    }
}

/// An attribute/value pair without a level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributePair {
    pub attribute_name: String,
    pub attribute_value: String,
}

impl AttributePair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            attribute_value: value.into(),
        }
    }

    fn dedupe_key(&self) -> String {
        format!("{}::{}", self.attribute_name, self.attribute_value)
    }
}

/// An input entry that could not be normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidItem {
    pub item: Value,
    pub reason: String,
}

impl InvalidItem {
    fn new(item: &Value, reason: &str) -> Self {
        Self {
            item: item.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Output of [`normalize`]: both lists keep input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Normalization {
    pub valid: Vec<Proficiency>,
    pub invalid: Vec<InvalidItem>,
}

/// Normalize a JSON list of proficiencies.
///
/// With `require_level`, levels are parsed from numbers or numeric strings,
/// truncated, defaulted to 1 when absent and rejected outside 1..=5. Without
/// it, the level is dropped entirely.
pub fn normalize(items: &Value, require_level: bool) -> Normalization {
    let Some(items) = items.as_array() else {
        return Normalization {
            valid: Vec::new(),
            invalid: vec![InvalidItem::new(items, "Must be a list")],
        };
    };

    let mut result = Normalization::default();
    for item in items {
        match normalize_item(item, require_level) {
            Ok(proficiency) => result.valid.push(proficiency),
            Err(reason) => result.invalid.push(InvalidItem::new(item, reason)),
        }
    }
    result
}

fn normalize_item(item: &Value, require_level: bool) -> Result<Proficiency, &'static str> {
    let parsed;
    let record = match item {
        Value::Object(record) => record,
        Value::String(text) => {
            parsed = parse_labelled(text).ok_or("Unrecognized string format")?;
            &parsed
        }
        _ => return Err("Missing attributeName/value"),
    };

    let name = text_field(record, NAME_KEYS);
    let value = text_field(record, VALUE_KEYS);
    let (Some(name), Some(value)) = (name, value) else {
        return Err("Missing attributeName/value");
    };

    let level = if require_level {
        match first_present(record, LEVEL_KEYS) {
            None => Some(MIN_LEVEL),
            Some(raw) => Some(parse_level(raw).ok_or("level must be 1..5")?),
        }
    } else {
        None
    };

    Ok(Proficiency::new(name, value, level))
}

/// Parse `Name=Value` with an optional ` (L<n>)` suffix into a record.
fn parse_labelled(text: &str) -> Option<Map<String, Value>> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^\s*([^=]+)=([^(]+?)(?:\s*\(L(\d+)\))?\s*$").expect("valid proficiency pattern")
    });

    let captures = pattern.captures(text)?;
    let mut record = Map::new();
    record.insert("attributeName".into(), Value::String(captures[1].trim().to_string()));
    record.insert("attributeValue".into(), Value::String(captures[2].trim().to_string()));
    if let Some(level) = captures.get(3) {
        record.insert("level".into(), Value::String(level.as_str().to_string()));
    }
    Some(record)
}

/// First candidate key holding something other than null or an empty string.
fn first_present<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
}

fn text_field<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    first_present(record, keys)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Parse a level, accepting integer-like floats and numeric strings.
pub fn parse_level(raw: &Value) -> Option<u8> {
    let number = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    let truncated = number.trunc();
    if truncated < f64::from(MIN_LEVEL) || truncated > f64::from(MAX_LEVEL) {
        return None;
    }
    Some(truncated as u8)
}

/// Collapse pairs to a unique set, keeping first-seen order.
pub fn dedupe<I>(pairs: I) -> Vec<AttributePair>
where
    I: IntoIterator<Item = AttributePair>,
{
    let mut seen = HashSet::new();
    pairs
        .into_iter()
        .filter(|pair| seen.insert(pair.dedupe_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_records_keep_order() {
        let items = json!([
            {"attributeName": "skill_name", "attributeValue": "billing", "level": 2},
            {"AttributeName": "language", "AttributeValue": "es", "Level": 4},
            {"attributeName": " region ", "attributeValue": " west "},
        ]);

        let result = normalize(&items, true);
        assert!(result.invalid.is_empty());
        assert_eq!(
            result.valid,
            vec![
                Proficiency::new("skill_name", "billing", Some(2)),
                Proficiency::new("language", "es", Some(4)),
                Proficiency::new("region", "west", Some(1)),
            ]
        );
    }

    #[test]
    fn test_string_format() {
        let result = normalize(&json!(["skill_name=billing (L3)", "language=en"]), true);
        assert_eq!(
            result.valid,
            vec![
                Proficiency::new("skill_name", "billing", Some(3)),
                Proficiency::new("language", "en", Some(1)),
            ]
        );
    }

    #[test]
    fn test_unrecognized_string() {
        let result = normalize(&json!(["no equals sign", "x=y"]), true);
        assert_eq!(result.valid.len(), 1);
        assert_eq!(result.invalid[0].item, json!("no equals sign"));
        assert_eq!(result.invalid[0].reason, "Unrecognized string format");
    }

    #[test]
    fn test_not_a_list() {
        let result = normalize(&json!({"attributeName": "a"}), true);
        assert!(result.valid.is_empty());
        assert_eq!(result.invalid.len(), 1);
        assert_eq!(result.invalid[0].reason, "Must be a list");
    }

    #[test]
    fn test_empty_name_rejected_either_way() {
        let items = json!([{"attributeName": "", "attributeValue": "x"}]);
        for require_level in [true, false] {
            let result = normalize(&items, require_level);
            assert!(result.valid.is_empty());
            assert_eq!(result.invalid[0].reason, "Missing attributeName/value");
        }
    }

    #[test]
    fn test_whitespace_value_rejected() {
        let result = normalize(&json!([{"attributeName": "a", "attributeValue": "   "}]), false);
        assert_eq!(result.invalid[0].reason, "Missing attributeName/value");
    }

    #[test]
    fn test_first_casing_wins() {
        let items = json!([{"attributeName": "lower", "AttributeName": "upper", "attributeValue": "v"}]);
        let result = normalize(&items, false);
        assert_eq!(result.valid[0].attribute_name, "lower");
    }

    #[test]
    fn test_level_bounds() {
        let rejected = normalize(
            &json!([
                {"attributeName": "a", "attributeValue": "b", "level": 0},
                {"attributeName": "a", "attributeValue": "b", "level": 6},
                "a=b (L9)",
            ]),
            true,
        );
        assert!(rejected.valid.is_empty());
        assert!(rejected.invalid.iter().all(|i| i.reason == "level must be 1..5"));

        let accepted = normalize(
            &json!([
                {"attributeName": "a", "attributeValue": "b", "level": 1},
                {"attributeName": "a", "attributeValue": "c", "level": 5},
                {"attributeName": "a", "attributeValue": "d", "level": "2"},
                {"attributeName": "a", "attributeValue": "e", "level": 3.0},
                {"attributeName": "a", "attributeValue": "f", "level": 4.7},
            ]),
            true,
        );
        assert!(accepted.invalid.is_empty());
        let levels: Vec<_> = accepted.valid.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![Some(1), Some(5), Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn test_level_dropped_without_requirement() {
        let result = normalize(
            &json!([{"attributeName": "a", "attributeValue": "b", "level": 42}, "c=d (L0)"]),
            false,
        );
        assert!(result.invalid.is_empty());
        assert!(result.valid.iter().all(|p| p.level.is_none()));
        let wire = serde_json::to_value(&result.valid[0]).unwrap();
        assert_eq!(wire, json!({"AttributeName": "a", "AttributeValue": "b"}));
    }

    #[test]
    fn test_non_numeric_level_rejected() {
        let result = normalize(&json!([{"attributeName": "a", "attributeValue": "b", "level": "high"}]), true);
        assert_eq!(result.invalid[0].reason, "level must be 1..5");
    }

    #[test]
    fn test_dedupe_keeps_first_seen() {
        let pairs = vec![
            AttributePair::new("A", "V"),
            AttributePair::new("A", "V"),
            AttributePair::new("A", "V2"),
        ];
        assert_eq!(
            dedupe(pairs),
            vec![AttributePair::new("A", "V"), AttributePair::new("A", "V2")]
        );
    }
}
