//! Authorization scenarios through the operation facade.

use la_core::Error;
use la_directory::testing::Recorded;
use la_model::{AuditAction, BaseRole, FeatureKey, FeatureOverride, Operator};
use la_operations::{NewEntry, SearchQuery, SearchTarget};

use crate::common::TestEnv;

/// A read-only admin may export but not delete.
#[tokio::test]
async fn test_read_only_admin_exports_but_cannot_delete() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let facade = env.facade();
    let viewer = env.admin("viewer", BaseRole::ReadOnly);

    let exported = facade
        .export_users(
            &viewer,
            SearchTarget::Realm(env.realm.id),
            &SearchQuery::new().with_filter("(uid=*)"),
        )
        .await?;
    assert_eq!(exported.len(), 1, "realm user base holds one user");

    let err = facade
        .delete_user(&viewer, env.realm.id, "uid=ann,ou=people,dc=co")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied(_)), "unexpected: {err}");
    assert!(env.ldap.entry("uid=ann,ou=people,dc=co").is_some());

    assert!(env.finish().await.is_empty());
    Ok(())
}

/// A disabled override wins over a full role.
#[tokio::test]
async fn test_override_disables_feature_for_full_admin() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let facade = env.facade();
    let admin = env.admin("editor", BaseRole::Full);
    env.store.set_feature_override(FeatureOverride {
        admin_id: admin.id,
        feature: FeatureKey::UserDelete,
        enabled: false,
    });

    let err = facade
        .delete_user(&admin, env.realm.id, "uid=ann,ou=people,dc=co")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied(_)));

    facade
        .set_user_enabled(&admin, env.realm.id, "uid=ann,ou=people,dc=co", false)
        .await?;
    let ann = env.ldap.entry("uid=ann,ou=people,dc=co").expect("entry");
    assert_eq!(ann.attrs.get("nsAccountLock"), Some(&vec!["true".to_string()]));
    Ok(())
}

/// Branch `ou=Sales,dc=co` allows Sales entries and denies Marketing ones
/// before any request reaches the directory.
#[tokio::test]
async fn test_branch_restriction_sales_vs_marketing() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let facade = env.facade();
    let admin = env.admin("sales-admin", BaseRole::Full);
    env.restrict(&admin, "ou=Sales,dc=co");

    let entry = facade
        .get_entry(&admin, env.realm.id, "cn=x,ou=Sales,dc=co", &[])
        .await?;
    assert_eq!(entry.get_attr("uid"), Some("sx"));

    let err = facade
        .delete_user(&admin, env.realm.id, "cn=x,ou=Marketing,dc=co")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied(_)));
    assert!(!env
        .ldap
        .journal()
        .iter()
        .any(|r| matches!(r, Recorded::Delete { .. })));

    facade
        .delete_user(&admin, env.realm.id, "cn=x,ou=Sales,dc=co")
        .await?;

    let events = env.finish().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::UserDelete);
    assert_eq!(events[0].target_dn.as_deref(), Some("cn=x,ou=Sales,dc=co"));
    Ok(())
}

/// Superadmins bypass every check without reading permission rows.
#[tokio::test]
async fn test_superadmin_never_reads_permissions() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let facade = env.facade();
    let root = Operator::superadmin("root");

    facade
        .create_user(
            &root,
            env.realm.id,
            NewEntry::new("uid=bo,ou=people,dc=co").attr("uid", ["bo"]),
        )
        .await?;
    let moved = facade
        .move_user(&root, env.realm.id, "uid=bo,ou=people,dc=co", "ou=Sales,dc=co")
        .await?;
    assert_eq!(moved, "uid=bo,ou=Sales,dc=co");
    let users = facade
        .search_users(&root, SearchTarget::Directory(env.directory.id), &SearchQuery::new().with_filter("(uid=bo)"))
        .await?;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].dn, "uid=bo,ou=Sales,dc=co");

    assert_eq!(env.store.permission_reads(), 0);

    let actions: Vec<_> = env.finish().await.into_iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::UserCreate, AuditAction::UserMove]);
    Ok(())
}

/// Admins of another tenant see the directory as missing.
#[tokio::test]
async fn test_foreign_tenant_sees_not_found() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let facade = env.facade();
    let outsider = Operator::admin(uuid::Uuid::now_v7(), "outsider");
    env.store.grant_realm_role(la_model::AdminRealmRole {
        admin_id: outsider.id,
        realm_id: env.realm.id,
        base_role: BaseRole::Full,
    });

    let err = facade
        .get_entry(&outsider, env.realm.id, "uid=ann,ou=people,dc=co", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(env.ldap.connects(), 0);
    Ok(())
}
