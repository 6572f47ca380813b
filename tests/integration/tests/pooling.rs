//! Connection pool lifecycle through the wired server.

use la_core::Error;
use la_directory::testing::{Fault, Recorded};
use la_model::{Operator, TlsMode};
use la_operations::{SearchQuery, SearchTarget};

use crate::common::{encrypt, TestEnv};

/// Upgrade-TLS performs STARTTLS on the transport before the bind.
#[tokio::test]
async fn test_start_tls_precedes_bind() -> anyhow::Result<()> {
    let env = TestEnv::with_tls(TlsMode::StartTls)?;
    let root = Operator::superadmin("root");

    env.facade()
        .search_users(&root, SearchTarget::Directory(env.directory.id), &SearchQuery::new())
        .await?;

    let journal = env.ldap.journal();
    let start_tls = journal
        .iter()
        .position(|r| matches!(r, Recorded::StartTls))
        .expect("StartTLS issued");
    let bind = journal
        .iter()
        .position(|r| matches!(r, Recorded::Bind { .. }))
        .expect("bind issued");
    assert!(start_tls < bind);
    assert!(matches!(
        journal.first(),
        Some(Recorded::Connect { tls_mode: TlsMode::StartTls, .. })
    ));
    Ok(())
}

/// Sequential calls reuse one pool; eviction rebuilds it.
#[tokio::test]
async fn test_pool_reuse_and_eviction() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let facade = env.facade();
    let root = Operator::superadmin("root");
    let target = SearchTarget::Directory(env.directory.id);

    facade.search_users(&root, target, &SearchQuery::new()).await?;
    facade.search_users(&root, target, &SearchQuery::new()).await?;
    assert_eq!(env.ldap.connects(), 1, "one connection reused");

    env.server.registry().evict(env.directory.id).await;
    assert!(!env.server.registry().contains(env.directory.id));
    facade.search_users(&root, target, &SearchQuery::new()).await?;
    assert_eq!(env.ldap.connects(), 2);
    Ok(())
}

/// A transport failure discards the connection and the next call
/// reconnects; a server rejection keeps it.
#[tokio::test]
async fn test_transport_failure_discards_connection() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let facade = env.facade();
    let root = Operator::superadmin("root");
    let target = SearchTarget::Directory(env.directory.id);

    facade.search_users(&root, target, &SearchQuery::new()).await?;
    env.ldap.fail_next(Fault::Result {
        code: 50,
        message: "insufficient access".to_string(),
    });
    let err = facade
        .search_users(&root, target, &SearchQuery::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rejected { code: 50, .. }));
    assert_eq!(env.ldap.connects(), 1);

    env.ldap.fail_next(Fault::Transport("connection reset".to_string()));
    let err = facade
        .search_users(&root, target, &SearchQuery::new())
        .await
        .unwrap_err();
    assert!(err.is_connection_error());

    facade.search_users(&root, target, &SearchQuery::new()).await?;
    assert_eq!(env.ldap.connects(), 2);
    Ok(())
}

/// A wrong service password never yields a pool.
#[tokio::test]
async fn test_wrong_bind_password_is_connection_error() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let mut broken = env.directory.clone();
    broken.bind_credential_encrypted = encrypt("wrong")?;
    env.store.put_directory(broken);

    let err = env
        .facade()
        .search_users(
            &Operator::superadmin("root"),
            SearchTarget::Directory(env.directory.id),
            &SearchQuery::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_connection_error(), "unexpected: {err}");
    assert!(!env.server.registry().contains(env.directory.id));
    Ok(())
}
