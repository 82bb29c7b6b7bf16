//! In-memory fakes of the directory service and key-value store.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for the
//! Lambda binaries' tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::directory::{AttributeDetail, Directory, HierarchyGroup, Page, UserDetail, UserSummary};
use crate::error::ServiceResult;
use crate::proficiency::{AttributePair, Proficiency};
use crate::store::{Filter, Item, KeyValueStore, Query};
use crate::ServiceError;

/// A directory call, as recorded by [`FakeDirectory`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListUsers,
    DescribeUser(String),
    DescribeHierarchyGroup(String),
    ListUserProficiencies(String),
    Associate(String, Vec<Proficiency>),
    Update(String, Vec<Proficiency>),
    Disassociate(String, Vec<AttributePair>),
    ListAttributes,
    DescribeAttribute(String),
    CreateAttribute(String, Vec<String>),
    DeleteAttribute(String),
}

/// Directory fake with scripted users, attributes and failures.
///
/// Failures are registered per operation name (`"associate_user_proficiencies"`)
/// or per operation and target (`"describe_predefined_attribute:language"`).
pub struct FakeDirectory {
    users: Vec<UserDetail>,
    page_size: usize,
    groups: HashMap<String, HierarchyGroup>,
    attributes: Mutex<Vec<AttributeDetail>>,
    proficiencies: Mutex<HashMap<String, Vec<Proficiency>>>,
    failures: Mutex<HashMap<String, ServiceError>>,
    calls: Mutex<Vec<Call>>,
}

impl Default for FakeDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self {
            users: Vec::new(),
            page_size: 100,
            groups: HashMap::new(),
            attributes: Mutex::new(Vec::new()),
            proficiencies: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Add a user whose id is `id-<login>`.
    pub fn with_agent(self, login: &str, first: &str, last: &str, group: Option<&str>) -> Self {
        let user = UserDetail {
            id: format!("id-{}", login),
            username: login.to_string(),
            first_name: Some(first.to_string()).filter(|s| !s.is_empty()),
            last_name: Some(last.to_string()).filter(|s| !s.is_empty()),
            hierarchy_group_id: group.map(str::to_string),
        };
        self.with_user(user)
    }

    pub fn with_user(mut self, user: UserDetail) -> Self {
        self.users.push(user);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_group(mut self, id: &str, levels: &[&str], name: &str) -> Self {
        self.groups.insert(
            id.to_string(),
            HierarchyGroup {
                name: name.to_string(),
                levels: levels.iter().map(|l| l.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_attribute(self, name: &str, values: &[&str]) -> Self {
        self.lock_attributes().push(AttributeDetail {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            last_modified_time: None,
            last_modified_region: None,
        });
        self
    }

    pub fn with_proficiencies(self, user_id: &str, proficiencies: Vec<Proficiency>) -> Self {
        self.proficiencies
            .lock()
            .unwrap()
            .insert(user_id.to_string(), proficiencies);
        self
    }

    /// Make an operation (or an operation on one target) fail.
    pub fn fail(&self, operation: &str, error: ServiceError) {
        self.failures
            .lock()
            .unwrap()
            .insert(operation.to_string(), error);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Proficiencies currently associated with a user.
    pub fn associated(&self, user_id: &str) -> Vec<Proficiency> {
        self.proficiencies
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    fn lock_attributes(&self) -> std::sync::MutexGuard<'_, Vec<AttributeDetail>> {
        self.attributes.lock().unwrap()
    }

    fn record(&self, operation: &str, target: &str, call: Call) -> ServiceResult<()> {
        self.calls.lock().unwrap().push(call);
        let failures = self.failures.lock().unwrap();
        match failures
            .get(&format!("{}:{}", operation, target))
            .or_else(|| failures.get(operation))
        {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn user(&self, user_id: &str) -> ServiceResult<&UserDetail> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or_else(|| not_found(format!("User {} not found", user_id)))
    }
}

fn not_found(message: String) -> ServiceError {
    ServiceError::new("ResourceNotFoundException", message)
}

fn page<T: Clone>(items: &[T], next_token: Option<String>, page_size: usize) -> Page<T> {
    let start: usize = next_token.and_then(|t| t.parse().ok()).unwrap_or(0);
    let end = (start + page_size).min(items.len());
    Page {
        items: items[start.min(end)..end].to_vec(),
        next_token: (end < items.len()).then(|| end.to_string()),
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn list_users(&self, next_token: Option<String>) -> ServiceResult<Page<UserSummary>> {
        self.record("list_users", "", Call::ListUsers)?;
        let summaries: Vec<UserSummary> = self
            .users
            .iter()
            .map(|u| UserSummary {
                id: u.id.clone(),
                username: u.username.clone(),
            })
            .collect();
        Ok(page(&summaries, next_token, self.page_size))
    }

    async fn describe_user(&self, user_id: &str) -> ServiceResult<UserDetail> {
        self.record("describe_user", user_id, Call::DescribeUser(user_id.to_string()))?;
        self.user(user_id).cloned()
    }

    async fn describe_hierarchy_group(&self, group_id: &str) -> ServiceResult<HierarchyGroup> {
        self.record(
            "describe_hierarchy_group",
            group_id,
            Call::DescribeHierarchyGroup(group_id.to_string()),
        )?;
        self.groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| not_found(format!("Group {} not found", group_id)))
    }

    async fn list_user_proficiencies(&self, user_id: &str) -> ServiceResult<Vec<Proficiency>> {
        self.record(
            "list_user_proficiencies",
            user_id,
            Call::ListUserProficiencies(user_id.to_string()),
        )?;
        Ok(self.associated(user_id))
    }

    async fn associate_user_proficiencies(
        &self,
        user_id: &str,
        proficiencies: &[Proficiency],
    ) -> ServiceResult<()> {
        self.record(
            "associate_user_proficiencies",
            user_id,
            Call::Associate(user_id.to_string(), proficiencies.to_vec()),
        )?;
        let mut all = self.proficiencies.lock().unwrap();
        let current = all.entry(user_id.to_string()).or_default();
        for proficiency in proficiencies {
            current.retain(|p| p.pair() != proficiency.pair());
            current.push(proficiency.clone());
        }
        Ok(())
    }

    async fn update_user_proficiencies(
        &self,
        user_id: &str,
        proficiencies: &[Proficiency],
    ) -> ServiceResult<()> {
        self.record(
            "update_user_proficiencies",
            user_id,
            Call::Update(user_id.to_string(), proficiencies.to_vec()),
        )?;
        let mut all = self.proficiencies.lock().unwrap();
        let current = all.entry(user_id.to_string()).or_default();
        for proficiency in proficiencies {
            if let Some(existing) = current.iter_mut().find(|p| p.pair() == proficiency.pair()) {
                existing.level = proficiency.level;
            }
        }
        Ok(())
    }

    async fn disassociate_user_proficiencies(
        &self,
        user_id: &str,
        pairs: &[AttributePair],
    ) -> ServiceResult<()> {
        self.record(
            "disassociate_user_proficiencies",
            user_id,
            Call::Disassociate(user_id.to_string(), pairs.to_vec()),
        )?;
        let mut all = self.proficiencies.lock().unwrap();
        if let Some(current) = all.get_mut(user_id) {
            current.retain(|p| !pairs.contains(&p.pair()));
        }
        Ok(())
    }

    async fn list_predefined_attributes(&self, next_token: Option<String>) -> ServiceResult<Page<String>> {
        self.record("list_predefined_attributes", "", Call::ListAttributes)?;
        let names: Vec<String> = self.lock_attributes().iter().map(|a| a.name.clone()).collect();
        Ok(page(&names, next_token, self.page_size))
    }

    async fn describe_predefined_attribute(&self, name: &str) -> ServiceResult<AttributeDetail> {
        self.record(
            "describe_predefined_attribute",
            name,
            Call::DescribeAttribute(name.to_string()),
        )?;
        self.lock_attributes()
            .iter()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| not_found(format!("Attribute {} not found", name)))
    }

    async fn create_predefined_attribute(&self, name: &str, values: &[String]) -> ServiceResult<()> {
        self.record(
            "create_predefined_attribute",
            name,
            Call::CreateAttribute(name.to_string(), values.to_vec()),
        )?;
        let mut attributes = self.lock_attributes();
        if attributes.iter().any(|a| a.name == name) {
            return Err(ServiceError::new(
                "DuplicateResourceException",
                format!("Attribute {} already exists", name),
            ));
        }
        attributes.push(AttributeDetail {
            name: name.to_string(),
            values: values.to_vec(),
            last_modified_time: None,
            last_modified_region: None,
        });
        Ok(())
    }

    async fn delete_predefined_attribute(&self, name: &str) -> ServiceResult<()> {
        self.record(
            "delete_predefined_attribute",
            name,
            Call::DeleteAttribute(name.to_string()),
        )?;
        let mut attributes = self.lock_attributes();
        let before = attributes.len();
        attributes.retain(|a| a.name != name);
        if attributes.len() == before {
            return Err(not_found(format!("Attribute {} not found", name)));
        }
        Ok(())
    }
}

struct Table {
    key_schema: Vec<String>,
    rows: Vec<Item>,
}

impl Table {
    fn position(&self, key: &Item) -> Option<usize> {
        self.rows.iter().position(|row| {
            self.key_schema
                .iter()
                .all(|attribute| row.get(attribute) == key.get(attribute))
        })
    }
}

/// Key-value store fake with per-table key schemas.
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
    failures: Mutex<HashMap<String, ServiceError>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Declare a table and the attributes forming its primary key.
    pub fn with_table(self, name: &str, key_schema: &[&str]) -> Self {
        self.tables.lock().unwrap().insert(
            name.to_string(),
            Table {
                key_schema: key_schema.iter().map(|k| k.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    /// Seed a row. Panics when the table is unknown or the row is not an object.
    pub fn insert(&self, table: &str, row: Value) {
        let Value::Object(row) = row else {
            panic!("rows must be JSON objects");
        };
        let mut tables = self.tables.lock().unwrap();
        let table = tables.get_mut(table).expect("table declared");
        match table.position(&row) {
            Some(index) => table.rows[index] = row,
            None => table.rows.push(row),
        }
    }

    /// Current rows of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Item> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Make every call on a table fail.
    pub fn fail(&self, table: &str, error: ServiceError) {
        self.failures
            .lock()
            .unwrap()
            .insert(table.to_string(), error);
    }

    fn with<R>(&self, table: &str, f: impl FnOnce(&mut Table) -> R) -> ServiceResult<R> {
        if let Some(err) = self.failures.lock().unwrap().get(table) {
            return Err(err.clone());
        }
        let mut tables = self.tables.lock().unwrap();
        let table = tables.get_mut(table).ok_or_else(|| {
            ServiceError::new("ResourceNotFoundException", "Requested resource not found")
        })?;
        Ok(f(table))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, table: &str, key: &Item) -> ServiceResult<Option<Item>> {
        self.with(table, |t| t.position(key).map(|i| t.rows[i].clone()))
    }

    async fn put(&self, table: &str, item: Item) -> ServiceResult<()> {
        self.with(table, |t| match t.position(&item) {
            Some(index) => t.rows[index] = item,
            None => t.rows.push(item),
        })
    }

    async fn update(&self, table: &str, key: &Item, changes: Item) -> ServiceResult<()> {
        self.with(table, |t| {
            let index = match t.position(key) {
                Some(index) => index,
                None => {
                    t.rows.push(key.clone());
                    t.rows.len() - 1
                }
            };
            t.rows[index].extend(changes);
        })
    }

    async fn delete(&self, table: &str, key: &Item) -> ServiceResult<()> {
        self.with(table, |t| {
            if let Some(index) = t.position(key) {
                t.rows.remove(index);
            }
        })
    }

    async fn scan(&self, table: &str, filter: Option<&Filter>) -> ServiceResult<Vec<Item>> {
        self.with(table, |t| {
            t.rows
                .iter()
                .filter(|row| filter.map_or(true, |f| f.matches(row)))
                .cloned()
                .collect()
        })
    }

    async fn query(&self, table: &str, query: &Query) -> ServiceResult<Vec<Item>> {
        self.with(table, |t| {
            t.rows.iter().filter(|row| query.matches(row)).cloned().collect()
        })
    }
}
