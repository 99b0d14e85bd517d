//! Route guard decisions over a published snapshot.

use crate::state_machine::AuthSnapshot;
use serde::Serialize;

/// What a protected view needs before it renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Authenticated,
    OrgMember,
    Admin,
}

/// Outcome of a guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// State is still settling; render a loading placeholder.
    Pending,
    Granted,
    /// Redirect to sign-in.
    SignInRequired,
    /// Signed in but lacking the capability.
    Forbidden,
}

pub fn authorize(snapshot: &AuthSnapshot, requirement: Requirement) -> Access {
    if snapshot.is_loading {
        return Access::Pending;
    }
    if snapshot.user.is_none() {
        return Access::SignInRequired;
    }

    let capabilities = snapshot.capabilities();
    let allowed = match requirement {
        Requirement::Authenticated => true,
        Requirement::OrgMember => capabilities.is_org_member,
        Requirement::Admin => capabilities.is_admin,
    };

    if allowed {
        Access::Granted
    } else {
        Access::Forbidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_fsm::AuthPhase;
    use crate::types::{Role, User};

    fn ready(roles: Vec<Role>) -> AuthSnapshot {
        AuthSnapshot {
            phase: AuthPhase::Ready,
            user: Some(User {
                id: "u1".to_string(),
                email: None,
            }),
            roles,
            is_loading: false,
            ..AuthSnapshot::initial()
        }
    }

    #[test]
    fn loading_is_pending_for_every_requirement() {
        let snapshot = AuthSnapshot::initial();
        for requirement in [
            Requirement::Authenticated,
            Requirement::OrgMember,
            Requirement::Admin,
        ] {
            assert_eq!(authorize(&snapshot, requirement), Access::Pending);
        }
    }

    #[test]
    fn signed_out_requires_sign_in() {
        assert_eq!(
            authorize(&AuthSnapshot::signed_out(), Requirement::Authenticated),
            Access::SignInRequired
        );
    }

    #[test]
    fn capabilities_gate_access() {
        let member = ready(vec![Role::TenantMember]);
        assert_eq!(authorize(&member, Requirement::OrgMember), Access::Granted);
        assert_eq!(authorize(&member, Requirement::Admin), Access::Forbidden);

        let admin = ready(vec![Role::PlatformAdmin]);
        assert_eq!(authorize(&admin, Requirement::Admin), Access::Granted);
        assert_eq!(authorize(&admin, Requirement::OrgMember), Access::Forbidden);
    }

    #[test]
    fn untenanted_user_is_authenticated_only() {
        let snapshot = ready(Vec::new());
        assert_eq!(
            authorize(&snapshot, Requirement::Authenticated),
            Access::Granted
        );
        assert_eq!(
            authorize(&snapshot, Requirement::OrgMember),
            Access::Forbidden
        );
    }
}
