//! Typed access to the agent mapping and proficiency profile tables.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::{key, Filter, Item, KeyValueStore};
use crate::{Config, Result};

/// The profile currently assigned to an agent, keyed by `agent_login`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentProfileMapping {
    pub agent_login: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub profile_id: String,
    #[serde(default)]
    pub profile_name: String,
}

/// A named proficiency template, keyed by `profile_name`.
///
/// `proficiencies` is stored as submitted; it is normalized when applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProficiencyProfile {
    pub profile_name: String,
    #[serde(default)]
    pub profile_id: String,
    #[serde(default = "empty_list")]
    pub proficiencies: Value,
}

fn empty_list() -> Value {
    Value::Array(Vec::new())
}

fn from_item<T: DeserializeOwned>(item: Item) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(item))?)
}

fn to_item<T: Serialize>(record: &T) -> Result<Item> {
    match serde_json::to_value(record)? {
        Value::Object(item) => Ok(item),
        _ => Err(crate::Error::Internal("record did not serialize to an object".to_string())),
    }
}

/// Repository over the mapping and profile tables.
pub struct ProfileRepository {
    store: Arc<dyn KeyValueStore>,
    mapping_table: String,
    profiles_table: String,
}

impl ProfileRepository {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        mapping_table: impl Into<String>,
        profiles_table: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mapping_table: mapping_table.into(),
            profiles_table: profiles_table.into(),
        }
    }

    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self::new(store, &config.mapping_table, &config.profiles_table)
    }

    pub async fn get_mapping(&self, agent_login: &str) -> Result<Option<AgentProfileMapping>> {
        let item = self
            .store
            .get(&self.mapping_table, &key(&[("agent_login", agent_login)]))
            .await?;
        item.map(from_item).transpose()
    }

    /// Insert or replace the mapping for its agent.
    pub async fn put_mapping(&self, mapping: &AgentProfileMapping) -> Result<()> {
        self.store.put(&self.mapping_table, to_item(mapping)?).await?;
        debug!(agent_login = %mapping.agent_login, profile = %mapping.profile_name, "Mapping stored");
        Ok(())
    }

    /// Set name and profile reference on an existing (or new) mapping.
    pub async fn update_mapping(&self, mapping: &AgentProfileMapping) -> Result<()> {
        let mut changes = to_item(mapping)?;
        changes.remove("agent_login");
        self.store
            .update(
                &self.mapping_table,
                &key(&[("agent_login", &mapping.agent_login)]),
                changes,
            )
            .await?;
        Ok(())
    }

    pub async fn delete_mapping(&self, agent_login: &str) -> Result<()> {
        self.store
            .delete(&self.mapping_table, &key(&[("agent_login", agent_login)]))
            .await?;
        Ok(())
    }

    pub async fn list_mappings(&self) -> Result<Vec<AgentProfileMapping>> {
        self.store
            .scan(&self.mapping_table, None)
            .await?
            .into_iter()
            .map(from_item)
            .collect()
    }

    /// Name of the profile currently mapped to an agent, if any.
    ///
    /// Mappings written with only a profile id are resolved through the
    /// profiles table.
    pub async fn mapped_profile_name(&self, agent_login: &str) -> Result<Option<String>> {
        let Some(mapping) = self.get_mapping(agent_login).await? else {
            return Ok(None);
        };
        if !mapping.profile_name.is_empty() {
            return Ok(Some(mapping.profile_name));
        }
        if mapping.profile_id.is_empty() {
            return Ok(None);
        }
        Ok(self
            .find_profile_by_id(&mapping.profile_id)
            .await?
            .map(|p| p.profile_name)
            .filter(|name| !name.is_empty()))
    }

    pub async fn get_profile(&self, profile_name: &str) -> Result<Option<ProficiencyProfile>> {
        let item = self
            .store
            .get(&self.profiles_table, &key(&[("profile_name", profile_name)]))
            .await?;
        item.map(from_item).transpose()
    }

    /// First profile carrying the given id.
    pub async fn find_profile_by_id(&self, profile_id: &str) -> Result<Option<ProficiencyProfile>> {
        let filter = Filter::equals("profile_id", profile_id);
        let items = self.store.scan(&self.profiles_table, Some(&filter)).await?;
        items.into_iter().next().map(from_item).transpose()
    }

    /// Store a new profile under a fresh id.
    pub async fn create_profile(&self, profile_name: &str, proficiencies: Value) -> Result<ProficiencyProfile> {
        let profile = ProficiencyProfile {
            profile_name: profile_name.to_string(),
            profile_id: Uuid::new_v4().to_string(),
            proficiencies,
        };
        self.store.put(&self.profiles_table, to_item(&profile)?).await?;
        info!(profile_name, profile_id = %profile.profile_id, "Profile created");
        Ok(profile)
    }

    pub async fn update_proficiencies(&self, profile_name: &str, proficiencies: Value) -> Result<()> {
        let mut changes = Item::new();
        changes.insert("proficiencies".to_string(), proficiencies);
        self.store
            .update(
                &self.profiles_table,
                &key(&[("profile_name", profile_name)]),
                changes,
            )
            .await?;
        Ok(())
    }

    pub async fn delete_profile(&self, profile_name: &str) -> Result<()> {
        self.store
            .delete(&self.profiles_table, &key(&[("profile_name", profile_name)]))
            .await?;
        Ok(())
    }

    pub async fn list_profiles(&self) -> Result<Vec<ProficiencyProfile>> {
        self.store
            .scan(&self.profiles_table, None)
            .await?
            .into_iter()
            .map(from_item)
            .collect()
    }

    /// Stored proficiencies for a profile reference.
    ///
    /// The name is tried first and the id only when the name finds nothing,
    /// so a name and id pointing at different profiles resolve by name. An
    /// unknown reference yields an empty list.
    pub async fn resolve_proficiencies(&self, profile_id: &str, profile_name: &str) -> Result<Value> {
        if !profile_name.is_empty() {
            if let Some(profile) = self.get_profile(profile_name).await? {
                return Ok(profile.proficiencies);
            }
        }
        if !profile_id.is_empty() {
            if let Some(profile) = self.find_profile_by_id(profile_id).await? {
                return Ok(profile.proficiencies);
            }
        }
        Ok(empty_list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use serde_json::json;

    fn repository() -> ProfileRepository {
        let store = MemoryStore::new()
            .with_table("mapping", &["agent_login"])
            .with_table("profiles", &["profile_name"]);
        ProfileRepository::new(Arc::new(store), "mapping", "profiles")
    }

    #[tokio::test]
    async fn test_create_and_resolve_by_name_or_id() {
        let repo = repository();
        let tier1 = repo
            .create_profile("Tier1", json!([{"attributeName": "skill_name", "attributeValue": "billing", "level": 2}]))
            .await
            .unwrap();
        assert_eq!(tier1.profile_id.len(), 36);

        let by_name = repo.resolve_proficiencies("", "Tier1").await.unwrap();
        assert_eq!(by_name, tier1.proficiencies);

        let by_id = repo.resolve_proficiencies(&tier1.profile_id, "").await.unwrap();
        assert_eq!(by_id, tier1.proficiencies);

        assert_eq!(repo.resolve_proficiencies("nope", "missing").await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_name_wins_over_id() {
        let repo = repository();
        let tier1 = repo.create_profile("Tier1", json!(["a=b"])).await.unwrap();
        repo.create_profile("Tier2", json!(["c=d"])).await.unwrap();

        let resolved = repo.resolve_proficiencies(&tier1.profile_id, "Tier2").await.unwrap();
        assert_eq!(resolved, json!(["c=d"]));
    }

    #[tokio::test]
    async fn test_mapping_lifecycle() {
        let repo = repository();
        let mapping = AgentProfileMapping {
            agent_login: "alice".into(),
            agent_name: "Alice Smith".into(),
            profile_id: "p-1".into(),
            profile_name: "Tier1".into(),
        };
        repo.put_mapping(&mapping).await.unwrap();
        assert_eq!(repo.mapped_profile_name("alice").await.unwrap().as_deref(), Some("Tier1"));

        let moved = AgentProfileMapping {
            profile_name: "Tier2".into(),
            ..mapping.clone()
        };
        repo.update_mapping(&moved).await.unwrap();
        assert_eq!(repo.get_mapping("alice").await.unwrap(), Some(moved));

        repo.delete_mapping("alice").await.unwrap();
        assert!(repo.get_mapping("alice").await.unwrap().is_none());
        assert!(repo.mapped_profile_name("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mapped_profile_name_resolves_id_only_mapping() {
        let repo = repository();
        let tier1 = repo.create_profile("Tier1", json!(["a=b"])).await.unwrap();
        repo.put_mapping(&AgentProfileMapping {
            agent_login: "alice".into(),
            profile_id: tier1.profile_id.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
        repo.put_mapping(&AgentProfileMapping {
            agent_login: "bob".into(),
            profile_id: "unknown".into(),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(repo.mapped_profile_name("alice").await.unwrap().as_deref(), Some("Tier1"));
        assert!(repo.mapped_profile_name("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_without_proficiencies_defaults_to_empty_list() {
        let store = MemoryStore::new().with_table("profiles", &["profile_name"]);
        store.insert("profiles", json!({"profile_name": "Bare", "profile_id": "x"}));
        let repo = ProfileRepository::new(Arc::new(store), "mapping", "profiles");

        let profile = repo.get_profile("Bare").await.unwrap().unwrap();
        assert_eq!(profile.proficiencies, json!([]));
    }
}
