//! Profile resolution: user id to profile, organization and roles.

use crate::error::{DirectoryError, ResolveError};
use crate::types::{Organization, Profile, Role, TenantContext};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Read access to the tenant data store.
///
/// "Not found" is a valid outcome for the profile and organization reads.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, DirectoryError>;

    async fn fetch_organization(
        &self,
        organization_id: &str,
    ) -> Result<Option<Organization>, DirectoryError>;

    async fn fetch_roles(&self, user_id: &str) -> Result<Vec<Role>, DirectoryError>;
}

/// Stateless resolver over a [`TenantDirectory`].
#[derive(Clone)]
pub struct ProfileResolver {
    directory: Arc<dyn TenantDirectory>,
}

impl ProfileResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve the tenant context for a user.
    ///
    /// The profile and role reads run concurrently; the organization read
    /// waits for the profile. A missing profile yields an empty context. No
    /// read is retried.
    pub async fn resolve(&self, user_id: &str) -> Result<TenantContext, ResolveError> {
        let (profile, roles) = tokio::join!(
            self.directory.fetch_profile(user_id),
            self.directory.fetch_roles(user_id)
        );

        let Some(profile) = profile.map_err(ResolveError::Profile)? else {
            debug!(user_id = %user_id, "No profile row, user is not provisioned");
            return Ok(TenantContext::unprovisioned());
        };
        let roles = roles.map_err(ResolveError::Roles)?;

        let organization = match profile.organization_id.as_deref() {
            Some(organization_id) => {
                let organization = self
                    .directory
                    .fetch_organization(organization_id)
                    .await
                    .map_err(ResolveError::Organization)?;
                if organization.is_none() {
                    warn!(
                        user_id = %user_id,
                        organization_id = %organization_id,
                        "Profile references a missing organization"
                    );
                }
                organization
            }
            None => None,
        };

        debug!(
            user_id = %user_id,
            has_profile = true,
            has_organization = organization.is_some(),
            role_count = roles.len(),
            "Resolved tenant context"
        );

        Ok(TenantContext {
            profile: Some(profile),
            organization,
            roles,
        })
    }
}
