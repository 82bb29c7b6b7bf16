//! Amazon Connect implementation of the directory service.

use async_trait::async_trait;
use aws_sdk_connect::primitives::DateTimeFormat;
use aws_sdk_connect::types::{PredefinedAttributeValues, UserProficiency, UserProficiencyDisassociate};
use aws_sdk_connect::Client as ConnectClient;

use crate::directory::{AttributeDetail, Directory, HierarchyGroup, Page, UserDetail, UserSummary};
use crate::error::ServiceResult;
use crate::proficiency::{AttributePair, Proficiency, MIN_LEVEL};
use crate::ServiceError;

/// Page size requested from list operations.
const PAGE_SIZE: i32 = 100;

/// Directory backed by one Amazon Connect instance.
pub struct ConnectDirectory {
    client: ConnectClient,
    instance_id: String,
}

impl ConnectDirectory {
    pub fn new(client: ConnectClient, instance_id: impl Into<String>) -> Self {
        Self {
            client,
            instance_id: instance_id.into(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

fn to_user_proficiency(proficiency: &Proficiency) -> ServiceResult<UserProficiency> {
    UserProficiency::builder()
        .attribute_name(&proficiency.attribute_name)
        .attribute_value(&proficiency.attribute_value)
        .level(f32::from(proficiency.level.unwrap_or(MIN_LEVEL)))
        .build()
        .map_err(|e| ServiceError::internal(e.to_string()))
}

fn to_disassociation(pair: &AttributePair) -> ServiceResult<UserProficiencyDisassociate> {
    UserProficiencyDisassociate::builder()
        .attribute_name(&pair.attribute_name)
        .attribute_value(&pair.attribute_value)
        .build()
        .map_err(|e| ServiceError::internal(e.to_string()))
}

#[async_trait]
impl Directory for ConnectDirectory {
    async fn list_users(&self, next_token: Option<String>) -> ServiceResult<Page<UserSummary>> {
        let output = self
            .client
            .list_users()
            .instance_id(&self.instance_id)
            .max_results(PAGE_SIZE)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        let items = output
            .user_summary_list()
            .iter()
            .filter_map(|summary| {
                Some(UserSummary {
                    id: summary.id()?.to_string(),
                    username: summary.username().unwrap_or_default().to_string(),
                })
            })
            .collect();

        Ok(Page {
            items,
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn describe_user(&self, user_id: &str) -> ServiceResult<UserDetail> {
        let output = self
            .client
            .describe_user()
            .instance_id(&self.instance_id)
            .user_id(user_id)
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        let user = output.user().ok_or_else(|| {
            ServiceError::new("ResourceNotFoundException", format!("User {} not described", user_id))
        })?;
        let identity = user.identity_info();

        Ok(UserDetail {
            id: user.id().unwrap_or(user_id).to_string(),
            username: user.username().unwrap_or_default().to_string(),
            first_name: identity.and_then(|i| i.first_name()).map(str::to_string),
            last_name: identity.and_then(|i| i.last_name()).map(str::to_string),
            hierarchy_group_id: user.hierarchy_group_id().map(str::to_string),
        })
    }

    async fn describe_hierarchy_group(&self, group_id: &str) -> ServiceResult<HierarchyGroup> {
        let output = self
            .client
            .describe_user_hierarchy_group()
            .instance_id(&self.instance_id)
            .hierarchy_group_id(group_id)
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        let Some(group) = output.hierarchy_group() else {
            return Ok(HierarchyGroup::default());
        };

        let levels = group
            .hierarchy_path()
            .map(|path| {
                [
                    path.level_one(),
                    path.level_two(),
                    path.level_three(),
                    path.level_four(),
                    path.level_five(),
                ]
                .into_iter()
                .flatten()
                .filter_map(|level| level.name())
                .map(str::to_string)
                .collect()
            })
            .unwrap_or_default();

        Ok(HierarchyGroup {
            name: group.name().unwrap_or_default().to_string(),
            levels,
        })
    }

    async fn list_user_proficiencies(&self, user_id: &str) -> ServiceResult<Vec<Proficiency>> {
        let mut proficiencies = Vec::new();
        let mut next_token = None;
        loop {
            let output = self
                .client
                .list_user_proficiencies()
                .instance_id(&self.instance_id)
                .user_id(user_id)
                .max_results(PAGE_SIZE)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(ServiceError::from_sdk)?;

            proficiencies.extend(output.user_proficiency_list().iter().map(|p| {
                Proficiency::new(p.attribute_name(), p.attribute_value(), Some(p.level().round() as u8))
            }));

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(proficiencies),
            }
        }
    }

    async fn associate_user_proficiencies(
        &self,
        user_id: &str,
        proficiencies: &[Proficiency],
    ) -> ServiceResult<()> {
        let items = proficiencies
            .iter()
            .map(to_user_proficiency)
            .collect::<ServiceResult<Vec<_>>>()?;

        self.client
            .associate_user_proficiencies()
            .instance_id(&self.instance_id)
            .user_id(user_id)
            .set_user_proficiencies(Some(items))
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;
        Ok(())
    }

    async fn update_user_proficiencies(
        &self,
        user_id: &str,
        proficiencies: &[Proficiency],
    ) -> ServiceResult<()> {
        let items = proficiencies
            .iter()
            .map(to_user_proficiency)
            .collect::<ServiceResult<Vec<_>>>()?;

        self.client
            .update_user_proficiencies()
            .instance_id(&self.instance_id)
            .user_id(user_id)
            .set_user_proficiencies(Some(items))
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;
        Ok(())
    }

    async fn disassociate_user_proficiencies(
        &self,
        user_id: &str,
        pairs: &[AttributePair],
    ) -> ServiceResult<()> {
        let items = pairs
            .iter()
            .map(to_disassociation)
            .collect::<ServiceResult<Vec<_>>>()?;

        self.client
            .disassociate_user_proficiencies()
            .instance_id(&self.instance_id)
            .user_id(user_id)
            .set_user_proficiencies(Some(items))
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;
        Ok(())
    }

    async fn list_predefined_attributes(&self, next_token: Option<String>) -> ServiceResult<Page<String>> {
        let output = self
            .client
            .list_predefined_attributes()
            .instance_id(&self.instance_id)
            .max_results(PAGE_SIZE)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        Ok(Page {
            items: output
                .predefined_attribute_summary_list()
                .iter()
                .filter_map(|summary| summary.name())
                .map(str::to_string)
                .collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn describe_predefined_attribute(&self, name: &str) -> ServiceResult<AttributeDetail> {
        let output = self
            .client
            .describe_predefined_attribute()
            .instance_id(&self.instance_id)
            .name(name)
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        let Some(attribute) = output.predefined_attribute() else {
            return Ok(AttributeDetail {
                name: name.to_string(),
                values: Vec::new(),
                last_modified_time: None,
                last_modified_region: None,
            });
        };

        let values = match attribute.values() {
            Some(PredefinedAttributeValues::StringList(values)) => values.clone(),
            _ => Vec::new(),
        };

        Ok(AttributeDetail {
            name: attribute.name().unwrap_or(name).to_string(),
            values,
            last_modified_time: attribute
                .last_modified_time()
                .and_then(|t| t.fmt(DateTimeFormat::DateTime).ok()),
            last_modified_region: attribute.last_modified_region().map(str::to_string),
        })
    }

    async fn create_predefined_attribute(&self, name: &str, values: &[String]) -> ServiceResult<()> {
        self.client
            .create_predefined_attribute()
            .instance_id(&self.instance_id)
            .name(name)
            .values(PredefinedAttributeValues::StringList(values.to_vec()))
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;
        Ok(())
    }

    async fn delete_predefined_attribute(&self, name: &str) -> ServiceResult<()> {
        self.client
            .delete_predefined_attribute()
            .instance_id(&self.instance_id)
            .name(name)
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;
        Ok(())
    }
}
