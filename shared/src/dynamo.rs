//! DynamoDB implementation of the key-value store.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::{Number, Value};

use crate::error::ServiceResult;
use crate::store::{Filter, Item, KeyValueStore, Query};
use crate::ServiceError;

type AttributeMap = HashMap<String, AttributeValue>;

/// Key-value store over DynamoDB tables.
pub struct DynamoStore {
    client: DynamoClient,
}

impl DynamoStore {
    pub fn new(client: DynamoClient) -> Self {
        Self { client }
    }
}

/// Placeholder-based expression with its name and value maps.
struct Expression {
    text: String,
    names: HashMap<String, String>,
    values: AttributeMap,
}

impl Expression {
    fn new() -> Self {
        Self {
            text: String::new(),
            names: HashMap::new(),
            values: HashMap::new(),
        }
    }

    /// Register an attribute/value pair, returning its placeholders.
    fn bind(&mut self, prefix: &str, attribute: &str, value: AttributeValue) -> (String, String) {
        let index = self.names.len();
        let name = format!("#{}{}", prefix, index);
        let placeholder = format!(":{}{}", prefix, index);
        self.names.insert(name.clone(), attribute.to_string());
        self.values.insert(placeholder.clone(), value);
        (name, placeholder)
    }
}

fn filter_expression(filter: &Filter) -> Expression {
    let mut expression = Expression::new();
    expression.text = match filter {
        Filter::Equals { attribute, value } => {
            let (name, placeholder) = expression.bind("f", attribute, to_attribute_value(value));
            format!("{} = {}", name, placeholder)
        }
        Filter::Contains { attribute, value } => {
            let (name, placeholder) = expression.bind("f", attribute, AttributeValue::S(value.clone()));
            format!("contains({}, {})", name, placeholder)
        }
    };
    expression
}

fn key_condition_expression(query: &Query) -> Expression {
    let mut expression = Expression::new();
    let clauses: Vec<String> = query
        .conditions
        .iter()
        .map(|(attribute, value)| {
            let (name, placeholder) = expression.bind("k", attribute, to_attribute_value(value));
            format!("{} = {}", name, placeholder)
        })
        .collect();
    expression.text = clauses.join(" AND ");
    expression
}

fn update_expression(changes: &Item) -> Expression {
    let mut expression = Expression::new();
    let assignments: Vec<String> = changes
        .iter()
        .map(|(attribute, value)| {
            let (name, placeholder) = expression.bind("n", attribute, to_attribute_value(value));
            format!("{} = {}", name, placeholder)
        })
        .collect();
    expression.text = format!("SET {}", assignments.join(", "));
    expression
}

/// Convert a JSON value to its DynamoDB representation.
pub fn to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(values) => AttributeValue::L(values.iter().map(to_attribute_value).collect()),
        Value::Object(map) => AttributeValue::M(to_attribute_map(map)),
    }
}

pub fn to_attribute_map(item: &Item) -> AttributeMap {
    item.iter()
        .map(|(name, value)| (name.clone(), to_attribute_value(value)))
        .collect()
}

fn number(text: &str) -> Value {
    if let Ok(integer) = text.parse::<i64>() {
        return Value::from(integer);
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}

/// Convert a DynamoDB value to JSON.
///
/// Sets become sorted arrays; binary values have no JSON form and become null.
pub fn from_attribute_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::L(values) => Value::Array(values.iter().map(from_attribute_value).collect()),
        AttributeValue::M(map) => Value::Object(from_attribute_map(map)),
        AttributeValue::Ss(values) => {
            let mut sorted = values.clone();
            sorted.sort();
            Value::Array(sorted.into_iter().map(Value::String).collect())
        }
        AttributeValue::Ns(values) => Value::Array(values.iter().map(|n| number(n)).collect()),
        _ => Value::Null,
    }
}

pub fn from_attribute_map(map: &AttributeMap) -> Item {
    map.iter()
        .map(|(name, value)| (name.clone(), from_attribute_value(value)))
        .collect()
}

#[async_trait]
impl KeyValueStore for DynamoStore {
    async fn get(&self, table: &str, key: &Item) -> ServiceResult<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(to_attribute_map(key)))
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        Ok(output.item().map(from_attribute_map))
    }

    async fn put(&self, table: &str, item: Item) -> ServiceResult<()> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_attribute_map(&item)))
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;
        Ok(())
    }

    async fn update(&self, table: &str, key: &Item, changes: Item) -> ServiceResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let expression = update_expression(&changes);

        self.client
            .update_item()
            .table_name(table)
            .set_key(Some(to_attribute_map(key)))
            .update_expression(expression.text)
            .set_expression_attribute_names(Some(expression.names))
            .set_expression_attribute_values(Some(expression.values))
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;
        Ok(())
    }

    async fn delete(&self, table: &str, key: &Item) -> ServiceResult<()> {
        self.client
            .delete_item()
            .table_name(table)
            .set_key(Some(to_attribute_map(key)))
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;
        Ok(())
    }

    async fn scan(&self, table: &str, filter: Option<&Filter>) -> ServiceResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key: Option<AttributeMap> = None;
        loop {
            let mut request = self
                .client
                .scan()
                .table_name(table)
                .set_exclusive_start_key(start_key.take());
            if let Some(filter) = filter {
                let expression = filter_expression(filter);
                request = request
                    .filter_expression(expression.text)
                    .set_expression_attribute_names(Some(expression.names))
                    .set_expression_attribute_values(Some(expression.values));
            }

            let output = request.send().await.map_err(ServiceError::from_sdk)?;
            items.extend(output.items().iter().map(from_attribute_map));

            match output.last_evaluated_key() {
                Some(last) if !last.is_empty() => start_key = Some(last.clone()),
                _ => return Ok(items),
            }
        }
    }

    async fn query(&self, table: &str, query: &Query) -> ServiceResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key: Option<AttributeMap> = None;
        loop {
            let expression = key_condition_expression(query);
            let output = self
                .client
                .query()
                .table_name(table)
                .set_index_name(query.index.clone())
                .key_condition_expression(expression.text)
                .set_expression_attribute_names(Some(expression.names))
                .set_expression_attribute_values(Some(expression.values))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(ServiceError::from_sdk)?;
            items.extend(output.items().iter().map(from_attribute_map));

            match output.last_evaluated_key() {
                Some(last) if !last.is_empty() => start_key = Some(last.clone()),
                _ => return Ok(items),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_item_conversion() {
        let item = json!({
            "profile_name": "Tier1",
            "profile_id": "3f1c",
            "proficiencies": [
                {"attributeName": "skill_name", "attributeValue": "billing", "level": 2},
                "language=en (L1)"
            ],
            "active": true,
            "weight": 1.5,
            "note": null
        });
        let map = to_attribute_map(item.as_object().unwrap());
        assert_eq!(map["profile_name"], AttributeValue::S("Tier1".into()));
        assert_eq!(map["active"], AttributeValue::Bool(true));

        let back = Value::Object(from_attribute_map(&map));
        assert_eq!(back, item);
    }

    #[test]
    fn test_string_sets_are_sorted() {
        let set = AttributeValue::Ss(vec!["b".into(), "a".into()]);
        assert_eq!(from_attribute_value(&set), json!(["a", "b"]));
    }

    #[test]
    fn test_update_expression_placeholders() {
        let changes = json!({"proficiencies": []});
        let expression = update_expression(changes.as_object().unwrap());
        assert_eq!(expression.text, "SET #n0 = :n0");
        assert_eq!(expression.names["#n0"], "proficiencies");
    }

    #[test]
    fn test_key_condition_expression() {
        let query = Query::partition("business_group_id", "bg-1")
            .and("channel", "chat")
            .on_index("business_group_id-channel-index");
        let expression = key_condition_expression(&query);
        assert_eq!(expression.text, "#k0 = :k0 AND #k1 = :k1");
        assert_eq!(expression.names["#k1"], "channel");
    }

    #[test]
    fn test_contains_filter_expression() {
        let expression = filter_expression(&Filter::contains("routing_profile", "Billing"));
        assert_eq!(expression.text, "contains(#f0, :f0)");
    }
}
