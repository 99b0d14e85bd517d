//! ProfileResolver against the mock directory.

use super::harness::{settle, Fixture, MockTenantDirectory};
use crate::error::ResolveError;
use crate::profile_resolver::ProfileResolver;
use crate::types::{Role, TenantContext};
use std::sync::Arc;

fn resolver(directory: &Arc<MockTenantDirectory>) -> ProfileResolver {
    ProfileResolver::new(directory.clone())
}

#[tokio::test]
async fn resolves_profile_organization_and_roles() {
    let directory = Arc::new(MockTenantDirectory::new());
    directory.insert(
        "u1",
        Fixture::tenant("u1", "org-1", &[Role::TenantOwner, Role::PlatformAdmin]),
    );

    let context = resolver(&directory).resolve("u1").await.unwrap();

    assert_eq!(context.profile.unwrap().user_id, "u1");
    assert_eq!(context.organization.unwrap().id, "org-1");
    assert_eq!(context.roles, vec![Role::TenantOwner, Role::PlatformAdmin]);
}

#[tokio::test]
async fn roles_are_read_while_profile_is_in_flight() {
    let directory = Arc::new(MockTenantDirectory::new());
    directory.insert("u1", Fixture::tenant("u1", "org-1", &[Role::TenantMember]));
    let gate = directory.hold_profile("u1");

    let task = tokio::spawn({
        let resolver = resolver(&directory);
        async move { resolver.resolve("u1").await }
    });
    settle().await;

    assert_eq!(directory.profile_calls("u1"), 1);
    assert_eq!(directory.role_calls(), 1);
    assert_eq!(directory.organization_calls(), 0);

    gate.release();
    let context = task.await.unwrap().unwrap();
    assert!(context.is_provisioned());
    assert_eq!(directory.organization_calls(), 1);
}

#[tokio::test]
async fn unknown_user_is_unprovisioned() {
    let directory = Arc::new(MockTenantDirectory::new());

    let context = resolver(&directory).resolve("nobody").await.unwrap();

    assert_eq!(context, TenantContext::unprovisioned());
    assert_eq!(directory.organization_calls(), 0);
}

#[tokio::test]
async fn profile_without_organization_skips_organization_read() {
    let directory = Arc::new(MockTenantDirectory::new());
    let mut fixture = Fixture::tenant("u1", "org-1", &[]);
    if let Some(profile) = fixture.profile.as_mut() {
        profile.organization_id = None;
    }
    directory.insert("u1", fixture);

    let context = resolver(&directory).resolve("u1").await.unwrap();

    assert!(context.profile.is_some());
    assert!(context.organization.is_none());
    assert_eq!(directory.organization_calls(), 0);
}

#[tokio::test]
async fn failures_name_the_failed_read() {
    let directory = Arc::new(MockTenantDirectory::new());
    directory.insert("u1", Fixture::tenant("u1", "org-1", &[Role::TenantMember]));

    directory.fail_profile("u1");
    let error = resolver(&directory).resolve("u1").await.unwrap_err();
    assert!(matches!(error, ResolveError::Profile(_)));

    directory.clear_failures();
    directory.fail_roles("u1");
    let error = resolver(&directory).resolve("u1").await.unwrap_err();
    assert!(matches!(error, ResolveError::Roles(_)));
    assert!(error.to_string().starts_with("role lookup failed"));
}

#[tokio::test]
async fn role_failure_without_profile_is_still_unprovisioned() {
    let directory = Arc::new(MockTenantDirectory::new());
    directory.fail_roles("u1");

    let context = resolver(&directory).resolve("u1").await.unwrap();

    assert_eq!(context, TenantContext::unprovisioned());
}
