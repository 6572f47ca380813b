//! Changelog ingestion through the wired server.

use la_model::{AuditOrigin, AuditSourceConfig, BaseRole};

use crate::common::{encrypt, TestEnv, BIND_PASSWORD};

fn seed_changes(env: &TestEnv) {
    env.ldap.insert("cn=changelog", &[("objectClass", &["top"])]);
    for (number, target) in [
        ("101", "uid=ann,ou=people,dc=co"),
        ("102", "cn=x,ou=Sales,dc=co"),
        ("103", "uid=ext,dc=partner"),
    ] {
        env.ldap.insert(
            &format!("changeNumber={number},cn=changelog"),
            &[
                ("objectClass", &["changeLogEntry"]),
                ("changeNumber", &[number]),
                ("changeType", &["modify"]),
                ("targetDN", &[target]),
                ("changeTime", &["20240301120000Z"]),
            ],
        );
    }
}

fn link_source(env: &TestEnv) -> anyhow::Result<AuditSourceConfig> {
    let source = AuditSourceConfig::new(
        env.tenant,
        "corp changelog",
        "ldap.corp.test",
        "cn=svc,dc=co",
        encrypt(BIND_PASSWORD)?,
    );
    env.store.put_audit_source(source.clone());
    env.store
        .put_directory(env.directory.clone().with_audit_source(source.id));
    Ok(source)
}

/// Re-processing the same changelog records nothing new.
#[tokio::test]
async fn test_changelog_reprocessing_is_noop() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    seed_changes(&env);
    let source = link_source(&env)?;
    let poller = env.server.poller();

    let first = poller.poll_all().await;
    assert_eq!(first.recorded, 3);
    let second = poller.poll_all().await;
    assert_eq!(second.recorded, 0);
    assert_eq!(second.skipped, 3);

    let events = env.finish().await;
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.origin == AuditOrigin::ExternalChangelog));

    let partner = events
        .iter()
        .find(|e| e.target_dn.as_deref() == Some("uid=ext,dc=partner"))
        .expect("unmatched change recorded");
    assert_eq!(partner.directory_id, None);
    assert_eq!(partner.changelog.as_ref().map(|c| c.scope_id), Some(source.id));
    Ok(())
}

/// Internal writes and changelog entries share the audit trail.
#[tokio::test]
async fn test_internal_and_changelog_events_coexist() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    seed_changes(&env);
    link_source(&env)?;
    let admin = env.admin("editor", BaseRole::Full);

    env.facade()
        .set_user_enabled(&admin, env.realm.id, "uid=ann,ou=people,dc=co", true)
        .await?;
    env.server.poller().poll_all().await;

    let events = env.finish().await;
    let internal = events
        .iter()
        .filter(|e| e.origin == AuditOrigin::InternalWrite)
        .count();
    assert_eq!(internal, 1);
    assert_eq!(events.len(), 4);
    Ok(())
}

/// A source with a bad credential fails alone.
#[tokio::test]
async fn test_source_failure_is_isolated() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    seed_changes(&env);
    link_source(&env)?;
    let broken = AuditSourceConfig::new(
        env.tenant,
        "broken",
        "ldap.corp.test",
        "cn=svc,dc=co",
        encrypt("wrong")?,
    );
    env.store.put_audit_source(broken.clone());

    let summary = env.server.poller().poll_all().await;
    assert_eq!(summary.sources_failed, 1);
    assert_eq!(summary.failures[0].source_id, broken.id);
    assert_eq!(summary.recorded, 3);
    Ok(())
}
