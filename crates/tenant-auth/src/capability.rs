//! Capability flags derived from a role set.

use crate::types::Role;
use serde::Serialize;

/// Boolean capabilities consumed by route guards and views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub is_admin: bool,
    pub is_org_member: bool,
}

impl Capabilities {
    pub fn from_roles(roles: &[Role]) -> Self {
        Self {
            is_admin: roles.contains(&Role::PlatformAdmin),
            is_org_member: roles.iter().any(Role::is_tenant_role),
        }
    }
}
