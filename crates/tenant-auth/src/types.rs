//! Data model shared by the session store, resolver and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Provider-issued proof of authentication for a user.
///
/// Token values are opaque to this crate and never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

impl Session {
    /// The subject (user id) this session authenticates.
    pub fn subject(&self) -> &str {
        &self.user.id
    }

    /// Whether the provider-reported expiry has passed.
    ///
    /// Sessions without an expiry are treated as valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Tenant-scoped user record linking a user to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Profile {
    /// First and last name joined, skipping missing parts.
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// The tenant that owns profiles, campaigns and data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Named permission grant drawn from a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    PlatformAdmin,
    TenantOwner,
    TenantAdmin,
    TenantMember,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::PlatformAdmin,
        Role::TenantOwner,
        Role::TenantAdmin,
        Role::TenantMember,
    ];

    /// Wire name used by the tenant data store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::PlatformAdmin => "platform_admin",
            Role::TenantOwner => "tenant_owner",
            Role::TenantAdmin => "tenant_admin",
            Role::TenantMember => "tenant_member",
        }
    }

    /// True for roles that grant membership of an organization.
    pub fn is_tenant_role(&self) -> bool {
        matches!(
            self,
            Role::TenantOwner | Role::TenantAdmin | Role::TenantMember
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| format!("unknown role: {raw}"))
    }
}

/// Result of resolving a user id against the tenant data store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantContext {
    pub profile: Option<Profile>,
    pub organization: Option<Organization>,
    pub roles: Vec<Role>,
}

impl TenantContext {
    /// Context for a user whose tenant records do not exist (yet).
    pub fn unprovisioned() -> Self {
        Self::default()
    }

    pub fn is_provisioned(&self) -> bool {
        self.profile.is_some()
    }
}

/// Tenant details collected at sign-up and forwarded to the identity provider
/// as user metadata for provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_at: Option<DateTime<Utc>>) -> Session {
        Session {
            access_token: "secret-access".to_string(),
            refresh_token: Some("secret-refresh".to_string()),
            expires_at,
            user: User {
                id: "u1".to_string(),
                email: Some("u1@example.com".to_string()),
            },
        }
    }

    #[test]
    fn session_debug_redacts_tokens() {
        let rendered = format!("{:?}", session(None));
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("u1@example.com"));
    }

    #[test]
    fn session_expiry() {
        let now = Utc::now();
        assert!(session(Some(now - Duration::seconds(1))).is_expired_at(now));
        assert!(!session(Some(now + Duration::minutes(5))).is_expired_at(now));
        assert!(!session(None).is_expired_at(now));
    }

    #[test]
    fn role_parses_wire_names_and_dashes() {
        assert_eq!("platform_admin".parse::<Role>(), Ok(Role::PlatformAdmin));
        assert_eq!("Tenant-Owner".parse::<Role>(), Ok(Role::TenantOwner));
        assert!("billing_viewer".parse::<Role>().is_err());
    }

    #[test]
    fn role_serde_uses_wire_names() {
        let json = serde_json::to_string(&Role::TenantMember).unwrap();
        assert_eq!(json, "\"tenant_member\"");
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>(), Ok(role));
        }
    }

    #[test]
    fn profile_display_name_skips_blank_parts() {
        let mut profile = Profile {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            organization_id: None,
            first_name: Some("Ada".to_string()),
            last_name: Some("  ".to_string()),
            avatar_url: None,
            timezone: None,
        };
        assert_eq!(profile.display_name().as_deref(), Some("Ada"));

        profile.first_name = None;
        assert_eq!(profile.display_name(), None);
    }

    #[test]
    fn profile_deserializes_with_missing_optional_columns() {
        let profile: Profile =
            serde_json::from_str(r#"{ "id": "p1", "user_id": "u1", "organization_id": null }"#)
                .unwrap();
        assert_eq!(profile.organization_id, None);
        assert_eq!(profile.timezone, None);
    }

    #[test]
    fn sign_up_metadata_omits_missing_fields() {
        let metadata = SignUpMetadata {
            organization_name: Some("Acme".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json, serde_json::json!({ "organization_name": "Acme" }));
    }
}
