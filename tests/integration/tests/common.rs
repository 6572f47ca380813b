//! Common test utilities and fixtures.

use std::sync::Arc;

use la_crypto::{AesGcmSecretCodec, SecretCodec};
use la_directory::testing::FakeDirectory;
use la_model::{
    AccountToggle, AdminRealmRole, BaseRole, BranchRestriction, DirectoryConfig, Operator, Realm,
    TlsMode,
};
use la_operations::DirectoryOperationFacade;
use la_server::{Server, ServerConfig};
use la_storage::InMemoryStore;
use uuid::Uuid;

/// 32 zero bytes, Base64-encoded.
pub const TEST_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

/// Service account password accepted by the scripted directory.
pub const BIND_PASSWORD: &str = "s3cret";

/// Test environment: a wired server over an in-memory store and a scripted
/// directory seeded with two departments.
pub struct TestEnv {
    /// Scripted directory.
    pub ldap: FakeDirectory,
    /// Backing store.
    pub store: Arc<InMemoryStore>,
    /// Wired server.
    pub server: Server,
    /// Tenant owning the directory.
    pub tenant: Uuid,
    /// The directory config.
    pub directory: DirectoryConfig,
    /// The single realm of the directory.
    pub realm: Realm,
}

impl TestEnv {
    /// Creates an environment using plain LDAP.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_tls(TlsMode::Plain)
    }

    /// Creates an environment using the given transport mode.
    pub fn with_tls(tls_mode: TlsMode) -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("la_directory=debug,la_audit=debug")
            .with_test_writer()
            .try_init();

        let tenant = Uuid::now_v7();
        let token = encrypt(BIND_PASSWORD)?;
        let directory = DirectoryConfig::new(tenant, "Corp", "ldap.corp.test", "cn=svc,dc=co", token, "dc=co")
            .with_tls(tls_mode)
            .with_pool_size(1, 4)
            .with_account_toggle(AccountToggle::literal("nsAccountLock", "false", "true"));
        let realm = Realm::new(directory.id, "staff", "ou=people,dc=co", "ou=groups,dc=co");

        let store = Arc::new(InMemoryStore::new());
        store.put_directory(directory.clone());
        store.put_realm(realm.clone());

        let ldap = FakeDirectory::new()
            .require_password(BIND_PASSWORD)
            .with_entry("dc=co", &[("objectClass", &["domain"])])
            .with_entry("ou=people,dc=co", &[("objectClass", &["organizationalUnit"])])
            .with_entry("ou=Sales,dc=co", &[("objectClass", &["organizationalUnit"])])
            .with_entry("ou=Marketing,dc=co", &[("objectClass", &["organizationalUnit"])])
            .with_entry(
                "cn=x,ou=Sales,dc=co",
                &[("objectClass", &["inetOrgPerson"]), ("cn", &["x"]), ("uid", &["sx"])],
            )
            .with_entry(
                "cn=x,ou=Marketing,dc=co",
                &[("objectClass", &["inetOrgPerson"]), ("cn", &["x"]), ("uid", &["mx"])],
            )
            .with_entry(
                "uid=ann,ou=people,dc=co",
                &[("objectClass", &["inetOrgPerson"]), ("uid", &["ann"])],
            );

        let config = ServerConfig::for_testing(TEST_KEY);
        let server = Server::with_connector(&config, store.clone(), Arc::new(ldap.clone()))?;

        Ok(Self {
            ldap,
            store,
            server,
            tenant,
            directory,
            realm,
        })
    }

    /// Returns the operation facade.
    pub fn facade(&self) -> Arc<DirectoryOperationFacade> {
        self.server.facade()
    }

    /// Creates a tenant admin holding `role` in the realm.
    pub fn admin(&self, username: &str, role: BaseRole) -> Operator {
        let admin = Operator::admin(self.tenant, username);
        self.store.grant_realm_role(AdminRealmRole {
            admin_id: admin.id,
            realm_id: self.realm.id,
            base_role: role,
        });
        admin
    }

    /// Restricts an admin to a subtree of the realm.
    pub fn restrict(&self, admin: &Operator, branch_dn: &str) {
        self.store.add_branch_restriction(BranchRestriction {
            admin_id: admin.id,
            realm_id: self.realm.id,
            branch_dn: branch_dn.to_string(),
        });
    }

    /// Shuts the server down and returns every recorded audit event.
    pub async fn finish(self) -> Vec<la_model::AuditEvent> {
        let store = self.store.clone();
        self.server.shutdown().await;
        store.events()
    }
}

/// Encrypts a secret with the test key.
pub fn encrypt(secret: &str) -> anyhow::Result<String> {
    Ok(AesGcmSecretCodec::from_base64_key(TEST_KEY)?.encrypt(secret)?)
}
