//! Configuration management for Lambda functions.

use std::env;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region, SdkConfig};

use crate::{Error, Result};

/// Application configuration loaded from environment variables.
///
/// Table names fall back to defaults; the Connect instance and greeting
/// bucket are only demanded by the functions that use them.
#[derive(Debug, Clone)]
pub struct Config {
    /// AWS region
    pub aws_region: String,
    /// Amazon Connect instance id
    pub connect_instance_id: Option<String>,
    /// agent_login -> profile mapping table
    pub mapping_table: String,
    /// profile_name -> proficiencies table
    pub profiles_table: String,
    pub user_permission_table: String,
    pub profile_permissions_table: String,
    pub business_group_configs_table: String,
    pub callflow_prompts_table: String,
    pub email_templates_table: String,
    /// Bucket holding recorded agent greetings
    pub greeting_bucket: Option<String>,
    /// Lifetime of presigned greeting URLs
    pub presigned_url_expiry: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            connect_instance_id: env::var("CONNECT_INSTANCE_ID").ok().filter(|v| !v.is_empty()),
            mapping_table: var_or("DDB_TABLE_MAPPING", "proficiency-profile-agent-mapping"),
            profiles_table: var_or("DDB_TABLE_PROFILES", "proficiency-profile"),
            user_permission_table: var_or("DDB_TABLE_USER_PERMISSION", "user-permission"),
            profile_permissions_table: var_or("DDB_TABLE_PROFILE_PERMISSIONS", "profile-permissions"),
            business_group_configs_table: var_or(
                "DDB_TABLE_BUSINESS_GROUP_CONFIGS",
                "business-group-configs",
            ),
            callflow_prompts_table: var_or("DDB_TABLE_CALLFLOW_PROMPTS", "callflow-prompts"),
            email_templates_table: var_or("DDB_TABLE_EMAIL_TEMPLATES", "email-templates"),
            greeting_bucket: env::var("AGENT_GREETING_BUCKET").ok().filter(|v| !v.is_empty()),
            presigned_url_expiry: Duration::from_secs(
                env::var("PRESIGNED_URL_EXPIRY_TIME")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3600),
            ),
        }
    }

    /// Shared AWS SDK configuration for the configured region.
    pub async fn load_aws(&self) -> SdkConfig {
        aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.aws_region.clone()))
            .load()
            .await
    }

    /// Connect instance id, required by every directory-backed function.
    pub fn instance_id(&self) -> Result<&str> {
        self.connect_instance_id
            .as_deref()
            .ok_or_else(|| Error::Config("CONNECT_INSTANCE_ID not set".to_string()))
    }

    /// Greeting bucket, required by the greetings function.
    pub fn greeting_bucket(&self) -> Result<&str> {
        self.greeting_bucket
            .as_deref()
            .ok_or_else(|| Error::Config("AGENT_GREETING_BUCKET not set".to_string()))
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
