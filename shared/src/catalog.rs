//! Predefined-attribute catalog.
//!
//! Lists every attribute name, describes each with bounded concurrency and
//! shapes the result for the console's pickers. Both shapes are cached by
//! the Lambda functions with [`crate::cache::TtlCache`].

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::directory::{list_all_attribute_names, AttributeDetail, Directory};
use crate::proficiency::MIN_LEVEL;
use crate::Result;

/// Describe calls in flight at once.
pub const DESCRIBE_CONCURRENCY: usize = 15;

/// Describe every predefined attribute, in listing order.
///
/// An attribute whose describe call fails is logged and left out.
pub async fn describe_all(directory: &dyn Directory) -> Result<Vec<AttributeDetail>> {
    let names = list_all_attribute_names(directory).await?;
    let total = names.len();

    let details: Vec<AttributeDetail> = stream::iter(names)
        .map(|name| async move {
            match directory.describe_predefined_attribute(&name).await {
                Ok(detail) => Some(detail),
                Err(err) => {
                    warn!(attribute = %name, code = %err.code, "Describe failed: {}", err.message);
                    None
                }
            }
        })
        .buffered(DESCRIBE_CONCURRENCY)
        .filter_map(|detail| async move { detail })
        .collect()
        .await;

    info!(total, described = details.len(), "Predefined attributes described");
    Ok(details)
}

fn sort_case_insensitive(names: &mut [String]) {
    names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
}

/// Attribute names and their values, for the predefined-attributes page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeCatalog {
    pub attribute_options: Vec<String>,
    pub value_options_by_attribute: BTreeMap<String, Vec<String>>,
}

impl AttributeCatalog {
    pub fn from_details(details: &[AttributeDetail]) -> Self {
        let mut attribute_options: Vec<String> = details.iter().map(|d| d.name.clone()).collect();
        sort_case_insensitive(&mut attribute_options);
        let value_options_by_attribute = details
            .iter()
            .map(|d| (d.name.clone(), d.values.clone()))
            .collect();

        Self {
            attribute_options,
            value_options_by_attribute,
        }
    }
}

/// Flattened `Attribute=Value (L1)` labels for the profile editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProficiencyOptions {
    pub proficiencies: Vec<String>,
    pub raw_attributes: Vec<AttributeDetail>,
}

impl ProficiencyOptions {
    /// Every attribute/value combination, labelled at the lowest level so
    /// the label parses back as a valid proficiency.
    pub fn from_details(details: Vec<AttributeDetail>) -> Self {
        let mut proficiencies: Vec<String> = details
            .iter()
            .flat_map(|d| {
                d.values
                    .iter()
                    .map(move |v| format!("{}={} (L{})", d.name, v, MIN_LEVEL))
            })
            .collect();
        sort_case_insensitive(&mut proficiencies);

        Self {
            proficiencies,
            raw_attributes: details,
        }
    }
}
