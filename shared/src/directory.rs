//! Directory service seam: agent identities, hierarchy groups, proficiency
//! associations and predefined attributes.
//!
//! [`Directory`] is implemented over Amazon Connect by
//! [`crate::connect::ConnectDirectory`]; tests use the in-memory fake in
//! `shared::testing`.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ServiceResult;
use crate::proficiency::{AttributePair, Proficiency};
use crate::{Error, Result};

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// Entry of the user listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
}

/// Full user record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserDetail {
    pub id: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub hierarchy_group_id: Option<String>,
}

impl UserDetail {
    /// `First Last`, trimmed, or the login when no name is on record.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        let full = format!("{} {}", first, last).trim().to_string();
        if full.is_empty() {
            self.username.clone()
        } else {
            full
        }
    }

    /// `Last, First` as shown in the users grid, or `-`.
    pub fn sortable_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("");
        let last = self.last_name.as_deref().unwrap_or("");
        if first.is_empty() && last.is_empty() {
            return "-".to_string();
        }
        format!("{}, {}", last, first)
            .trim_matches(|c| c == ',' || c == ' ')
            .to_string()
    }
}

/// Hierarchy group with the names of its ancestor levels, top first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HierarchyGroup {
    pub name: String,
    pub levels: Vec<String>,
}

impl HierarchyGroup {
    /// `LevelOne / LevelTwo / ... / leaf`, or `-` when nothing is named.
    pub fn path(&self) -> String {
        let mut parts: Vec<&str> = self
            .levels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        let leaf = self.name.trim();
        if !leaf.is_empty() && parts.last() != Some(&leaf) {
            parts.push(leaf);
        }
        if parts.is_empty() {
            "-".to_string()
        } else {
            parts.join(" / ")
        }
    }
}

/// A predefined attribute and its allowed values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDetail {
    pub name: String,
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_region: Option<String>,
}

/// Operations the handlers need from the directory service.
///
/// Every call is one network round trip; listings return a single page so
/// callers control how far they scan.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn list_users(&self, next_token: Option<String>) -> ServiceResult<Page<UserSummary>>;

    async fn describe_user(&self, user_id: &str) -> ServiceResult<UserDetail>;

    async fn describe_hierarchy_group(&self, group_id: &str) -> ServiceResult<HierarchyGroup>;

    /// All proficiencies currently associated with a user.
    async fn list_user_proficiencies(&self, user_id: &str) -> ServiceResult<Vec<Proficiency>>;

    async fn associate_user_proficiencies(
        &self,
        user_id: &str,
        proficiencies: &[Proficiency],
    ) -> ServiceResult<()>;

    async fn update_user_proficiencies(
        &self,
        user_id: &str,
        proficiencies: &[Proficiency],
    ) -> ServiceResult<()>;

    async fn disassociate_user_proficiencies(
        &self,
        user_id: &str,
        pairs: &[AttributePair],
    ) -> ServiceResult<()>;

    /// Names of predefined attributes, one page at a time.
    async fn list_predefined_attributes(&self, next_token: Option<String>) -> ServiceResult<Page<String>>;

    async fn describe_predefined_attribute(&self, name: &str) -> ServiceResult<AttributeDetail>;

    async fn create_predefined_attribute(&self, name: &str, values: &[String]) -> ServiceResult<()>;

    async fn delete_predefined_attribute(&self, name: &str) -> ServiceResult<()>;
}

/// Resolve a login to its user id by scanning the listing page by page.
///
/// Stops at the first match; fails with `NotFound` once pages run out.
pub async fn find_user_id(directory: &dyn Directory, login: &str) -> Result<String> {
    let mut next_token = None;
    loop {
        let page = directory.list_users(next_token).await?;
        if let Some(user) = page.items.into_iter().find(|u| u.username == login) {
            return Ok(user.id);
        }
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => return Err(Error::NotFound(format!("User '{}' not found in Connect", login))),
        }
    }
}

/// Every user in the directory, in listing order.
pub async fn list_all_users(directory: &dyn Directory) -> Result<Vec<UserSummary>> {
    let mut users = Vec::new();
    let mut next_token = None;
    loop {
        let page = directory.list_users(next_token).await?;
        users.extend(page.items);
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => return Ok(users),
        }
    }
}

/// Every predefined attribute name, in listing order.
pub async fn list_all_attribute_names(directory: &dyn Directory) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut next_token = None;
    loop {
        let page = directory.list_predefined_attributes(next_token).await?;
        names.extend(page.items.into_iter().filter(|n| !n.is_empty()));
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => return Ok(names),
        }
    }
}

/// Hierarchy path for a group, or `-` when it cannot be described.
pub async fn hierarchy_path(directory: &dyn Directory, group_id: &str) -> String {
    match directory.describe_hierarchy_group(group_id).await {
        Ok(group) => group.path(),
        Err(err) => {
            tracing::warn!(group_id, "Could not build hierarchy: {}", err);
            "-".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_login() {
        let user = UserDetail {
            username: "alice".into(),
            first_name: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(user.display_name(), "alice");

        let named = UserDetail {
            username: "bob".into(),
            first_name: Some("Bob".into()),
            last_name: Some("Stone".into()),
            ..Default::default()
        };
        assert_eq!(named.display_name(), "Bob Stone");
        assert_eq!(named.sortable_name(), "Stone, Bob");
    }

    #[test]
    fn test_sortable_name_partial() {
        let first_only = UserDetail {
            first_name: Some("Ann".into()),
            ..Default::default()
        };
        assert_eq!(first_only.sortable_name(), "Ann");
        assert_eq!(UserDetail::default().sortable_name(), "-");
    }

    #[test]
    fn test_hierarchy_path() {
        let group = HierarchyGroup {
            name: "Billing".into(),
            levels: vec!["North America".into(), "Care".into(), "Billing".into()],
        };
        assert_eq!(group.path(), "North America / Care / Billing");

        let leaf_only = HierarchyGroup {
            name: "Outage".into(),
            levels: vec![],
        };
        assert_eq!(leaf_only.path(), "Outage");
        assert_eq!(HierarchyGroup::default().path(), "-");
    }
}
