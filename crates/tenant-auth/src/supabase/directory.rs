//! PostgREST-backed tenant directory.

use super::auth::SupabaseAuth;
use super::{endpoint, summarize_response_body};
use crate::error::DirectoryError;
use crate::profile_resolver::TenantDirectory;
use crate::types::{Organization, Profile, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const PROFILE_COLUMNS: &str = "id,user_id,organization_id,first_name,last_name,avatar_url,timezone";
const ORGANIZATION_COLUMNS: &str = "id,name,plan,status,contact_email,domain";

#[derive(Debug, Deserialize)]
struct RoleRow {
    role: String,
}

/// Keep known roles in row order, dropping duplicates.
fn parse_role_rows(user_id: &str, rows: Vec<RoleRow>) -> Vec<Role> {
    let mut roles = Vec::with_capacity(rows.len());
    for row in rows {
        match row.role.parse::<Role>() {
            Ok(role) if !roles.contains(&role) => roles.push(role),
            Ok(_) => {}
            Err(_) => debug!(user_id = %user_id, role = %row.role, "Skipping unknown role"),
        }
    }
    roles
}

/// Reads `profiles`, `organizations` and `user_roles` through the Supabase
/// REST API.
///
/// Requests carry the signed-in user's access token when an auth handle is
/// attached, so row-level security applies; otherwise the publishable key.
#[derive(Clone)]
pub struct SupabaseTenantDirectory {
    http_client: Client,
    supabase_url: String,
    publishable_key: String,
    auth: Option<Arc<SupabaseAuth>>,
}

impl SupabaseTenantDirectory {
    pub fn new(supabase_url: &str, publishable_key: &str) -> Self {
        Self {
            http_client: Client::new(),
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            publishable_key: publishable_key.to_string(),
            auth: None,
        }
    }

    pub fn with_auth(mut self, auth: Arc<SupabaseAuth>) -> Self {
        self.auth = Some(auth);
        self
    }

    fn rest_url(&self, table: &str) -> String {
        endpoint(&self.supabase_url, &format!("rest/v1/{table}"))
    }

    fn bearer_token(&self) -> String {
        self.auth
            .as_ref()
            .and_then(|auth| auth.access_token())
            .unwrap_or_else(|| self.publishable_key.clone())
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, DirectoryError> {
        let url = self.rest_url(table);
        debug!(table = %table, "Querying tenant directory");

        let response = self
            .http_client
            .get(&url)
            .query(query)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", self.bearer_token()))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            warn!(
                status = %status,
                table = %table,
                body_summary = %body_summary,
                "Tenant directory query failed"
            );
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body_summary,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl TenantDirectory for SupabaseTenantDirectory {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, DirectoryError> {
        let rows: Vec<Profile> = self
            .select(
                "profiles",
                &[
                    ("user_id", format!("eq.{user_id}")),
                    ("select", PROFILE_COLUMNS.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_organization(
        &self,
        organization_id: &str,
    ) -> Result<Option<Organization>, DirectoryError> {
        let rows: Vec<Organization> = self
            .select(
                "organizations",
                &[
                    ("id", format!("eq.{organization_id}")),
                    ("select", ORGANIZATION_COLUMNS.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_roles(&self, user_id: &str) -> Result<Vec<Role>, DirectoryError> {
        let rows: Vec<RoleRow> = self
            .select(
                "user_roles",
                &[
                    ("user_id", format!("eq.{user_id}")),
                    ("select", "role".to_string()),
                ],
            )
            .await?;
        Ok(parse_role_rows(user_id, rows))
    }
}
