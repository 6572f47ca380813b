//! Changelog ingestion.
//!
//! One pass reads the change log of every enabled audit source over a
//! short-lived unpooled connection and records each change as an
//! external-changelog audit event. Changes are keyed by
//! (directory, change number): a change that was already recorded is
//! skipped, so passes can be repeated or interrupted safely.
//!
//! Each source is polled inside its own error boundary; a failing source is
//! logged, counted in the [`PollSummary`], and retried on the next pass.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use la_core::AuditConfig;
use la_crypto::SecretCodec;
use la_directory::{
    ldap_escape, result_code, ConnectionPoolRegistry, ConnectionSettings, DirectoryEntry,
    DirectoryError, DirectorySession, SearchRequest, SearchScope,
};
use la_model::{dn, AuditEvent, AuditSourceConfig, DirectoryConfig};
use la_storage::{AuditEventRepository, AuditSourceRepository, DirectoryConfigRepository};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AuditResult;

/// Attributes requested from every changelog entry.
pub const CHANGELOG_ATTRIBUTES: [&str; 9] = [
    "changeNumber",
    "changeType",
    "targetDN",
    "changes",
    "newRDN",
    "deleteOldRDN",
    "newSuperior",
    "changeTime",
    "creatorsName",
];

const CHANGELOG_FILTER: &str = "(objectClass=changeLogEntry)";

// ============================================================================
// Poll Summary
// ============================================================================

/// Result of one pass over every enabled source.
#[derive(Debug, Clone, Serialize)]
pub struct PollSummary {
    /// Sources read successfully.
    pub sources_polled: usize,
    /// Sources that failed.
    pub sources_failed: usize,
    /// Events recorded.
    pub recorded: usize,
    /// Entries skipped (no change number, or already recorded).
    pub skipped: usize,
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// When the pass completed.
    pub completed_at: DateTime<Utc>,
    /// Per-source failures.
    pub failures: Vec<SourceFailure>,
}

impl PollSummary {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            sources_polled: 0,
            sources_failed: 0,
            recorded: 0,
            skipped: 0,
            started_at: now,
            completed_at: now,
            failures: Vec::new(),
        }
    }

    fn record_source(&mut self, stats: SourceStats) {
        self.sources_polled += 1;
        self.recorded += stats.recorded;
        self.skipped += stats.skipped;
    }

    fn record_failure(&mut self, failure: SourceFailure) {
        self.sources_failed += 1;
        self.failures.push(failure);
    }

    fn complete(mut self) -> Self {
        self.completed_at = Utc::now();
        self
    }

    /// Returns true if any source failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// A source that could not be polled.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    /// Audit source id.
    pub source_id: Uuid,
    /// Audit source display name.
    pub source_name: String,
    /// Error message.
    pub message: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct SourceStats {
    recorded: usize,
    skipped: usize,
}

enum Ingested {
    Recorded,
    Skipped,
}

// ============================================================================
// Poller
// ============================================================================

/// Reads external change logs into the audit trail.
pub struct ChangelogAuditPoller {
    sources: Arc<dyn AuditSourceRepository>,
    directories: Arc<dyn DirectoryConfigRepository>,
    events: Arc<dyn AuditEventRepository>,
    registry: Arc<ConnectionPoolRegistry>,
    codec: Arc<dyn SecretCodec>,
    config: AuditConfig,
}

impl ChangelogAuditPoller {
    /// Creates a poller.
    #[must_use]
    pub fn new(
        sources: Arc<dyn AuditSourceRepository>,
        directories: Arc<dyn DirectoryConfigRepository>,
        events: Arc<dyn AuditEventRepository>,
        registry: Arc<ConnectionPoolRegistry>,
        codec: Arc<dyn SecretCodec>,
        config: AuditConfig,
    ) -> Self {
        Self {
            sources,
            directories,
            events,
            registry,
            codec,
            config,
        }
    }

    /// Polls every enabled source once.
    ///
    /// Never fails: listing errors and per-source errors are logged and
    /// reported in the summary.
    pub async fn poll_all(&self) -> PollSummary {
        let mut summary = PollSummary::new();

        let sources = match self.sources.list_enabled().await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list audit sources");
                return summary.complete();
            }
        };

        for source in sources {
            match self.poll_source(&source).await {
                Ok(stats) => summary.record_source(stats),
                Err(e) => {
                    tracing::warn!(source = %source.display_name, error = %e, "changelog poll failed");
                    summary.record_failure(SourceFailure {
                        source_id: source.id,
                        source_name: source.display_name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let summary = summary.complete();
        tracing::debug!(
            polled = summary.sources_polled,
            failed = summary.sources_failed,
            recorded = summary.recorded,
            skipped = summary.skipped,
            "changelog pass complete"
        );
        summary
    }

    async fn poll_source(&self, source: &AuditSourceConfig) -> AuditResult<SourceStats> {
        tracing::debug!(source = %source.display_name, "polling changelog");

        let linked = self.directories.list_by_audit_source(source.id).await?;
        let password = self.codec.decrypt(&source.bind_credential_encrypted)?;
        let settings = ConnectionSettings::for_audit_source(
            source,
            password,
            self.config.connect_timeout(),
            self.config.response_timeout(),
        );

        let mut session = self.registry.open_unpooled(&settings).await?;
        let result = self.read_changes(session.as_mut(), source, &linked).await;
        if let Err(e) = session.unbind().await {
            tracing::debug!(source = %source.display_name, error = %e, "changelog unbind failed");
        }
        result
    }

    async fn read_changes(
        &self,
        session: &mut dyn DirectorySession,
        source: &AuditSourceConfig,
        linked: &[DirectoryConfig],
    ) -> AuditResult<SourceStats> {
        let request = SearchRequest::new(
            source.changelog_base_dn.as_str(),
            SearchScope::Subtree,
            changelog_filter(source.target_dn_prefix.as_deref()),
        )
        .with_attributes(CHANGELOG_ATTRIBUTES)
        .with_size_limit(self.config.changelog_max_entries);

        let page = session.search(&request).await?;

        match page.outcome.code {
            result_code::SUCCESS => {}
            result_code::SIZE_LIMIT_EXCEEDED => {
                tracing::warn!(
                    source = %source.display_name,
                    limit = self.config.changelog_max_entries,
                    "changelog size limit reached, changes beyond the limit are not read"
                );
            }
            code => {
                return Err(DirectoryError::rejected(
                    "search",
                    source.changelog_base_dn.clone(),
                    code,
                    page.outcome.diagnostic,
                )
                .into())
            }
        }

        let mut stats = SourceStats::default();
        for raw in page.entries {
            let entry = DirectoryEntry::from_raw(raw);
            match self.ingest(source, linked, &entry).await? {
                Ingested::Recorded => stats.recorded += 1,
                Ingested::Skipped => stats.skipped += 1,
            }
        }

        tracing::debug!(
            source = %source.display_name,
            recorded = stats.recorded,
            skipped = stats.skipped,
            "changelog entries processed"
        );
        Ok(stats)
    }

    async fn ingest(
        &self,
        source: &AuditSourceConfig,
        linked: &[DirectoryConfig],
        entry: &DirectoryEntry,
    ) -> AuditResult<Ingested> {
        let Some(change_number) = entry.get_attr("changeNumber") else {
            tracing::debug!(dn = %entry.dn, "changelog entry without change number");
            return Ok(Ingested::Skipped);
        };

        let target = entry.get_attr("targetDN");
        let directory = target.and_then(|target| match_directory(target, linked));
        let scope_id = directory.map_or(source.id, |d| d.id);

        if self.events.exists_changelog(scope_id, change_number).await? {
            return Ok(Ingested::Skipped);
        }

        let occurred_at = entry
            .get_attr("changeTime")
            .and_then(parse_generalized_time)
            .unwrap_or_else(Utc::now);

        let mut builder = AuditEvent::changelog(scope_id, change_number)
            .tenant(source.tenant_id)
            .occurred_at(occurred_at)
            .detail("changeType", entry.get_attr("changeType"))
            .detail("changes", entry.get_attr("changes"))
            .detail("creatorsName", entry.get_attr("creatorsName"));
        if let Some(new_rdn) = entry.get_attr("newRDN") {
            builder = builder
                .detail("newRDN", new_rdn)
                .detail("deleteOldRDN", entry.get_attr("deleteOldRDN"))
                .detail("newSuperior", entry.get_attr("newSuperior"));
        }
        if let Some(directory) = directory {
            builder = builder.directory(directory.id, directory.display_name.clone());
        }
        if let Some(target) = target {
            builder = builder.target(target);
        }

        match self.events.append(&builder.build()).await {
            Ok(()) => Ok(Ingested::Recorded),
            // Another pass recorded it between the check and the append.
            Err(e) if e.is_duplicate() => Ok(Ingested::Skipped),
            Err(e) => Err(e.into()),
        }
    }
}

fn changelog_filter(prefix: Option<&str>) -> String {
    match prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => format!(
            "(&{CHANGELOG_FILTER}(targetDN={}*))",
            ldap_escape(prefix)
        ),
        None => CHANGELOG_FILTER.to_string(),
    }
}

/// Picks the linked directory whose base DN contains `target`, preferring
/// the deepest base.
fn match_directory<'d>(target: &str, linked: &'d [DirectoryConfig]) -> Option<&'d DirectoryConfig> {
    linked
        .iter()
        .filter(|d| dn::is_within(target, &d.base_dn))
        .max_by_key(|d| d.base_dn.len())
}

/// Parses an LDAP GeneralizedTime value (`20240115103000Z`,
/// `20240115103000.123Z`, `20240115103000+0100`).
fn parse_generalized_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Some(naive) = value.strip_suffix('Z') {
        return ["%Y%m%d%H%M%S%.f", "%Y%m%d%H%M%S"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
            .map(|dt| dt.and_utc());
    }
    DateTime::parse_from_str(value, "%Y%m%d%H%M%S%.f%z")
        .or_else(|_| DateTime::parse_from_str(value, "%Y%m%d%H%M%S%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use la_crypto::CryptoResult;
    use la_directory::testing::{FakeDirectory, Recorded};
    use la_model::AuditOrigin;
    use la_storage::InMemoryStore;

    use super::*;

    struct PlainCodec;

    impl SecretCodec for PlainCodec {
        fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
            Ok(plaintext.to_string())
        }

        fn decrypt(&self, token: &str) -> CryptoResult<String> {
            Ok(token.to_string())
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        ldap: FakeDirectory,
        poller: ChangelogAuditPoller,
        source: AuditSourceConfig,
        directory: DirectoryConfig,
    }

    fn fixture() -> Fixture {
        let tenant = Uuid::now_v7();
        let store = Arc::new(InMemoryStore::new());
        let source = AuditSourceConfig::new(tenant, "corp changelog", "fake", "cn=reader", "pw");
        let directory = DirectoryConfig::new(tenant, "Corp", "fake", "cn=svc,dc=corp", "pw", "dc=corp")
            .with_audit_source(source.id);
        store.put_audit_source(source.clone());
        store.put_directory(directory.clone());

        let ldap = FakeDirectory::new().with_entry("cn=changelog", &[("objectClass", &["top"])]);
        let codec: Arc<dyn SecretCodec> = Arc::new(PlainCodec);
        let registry = Arc::new(ConnectionPoolRegistry::new(Arc::new(ldap.clone()), codec.clone()));
        let poller = ChangelogAuditPoller::new(
            store.clone(),
            store.clone(),
            store.clone(),
            registry,
            codec,
            AuditConfig::default(),
        );
        Fixture {
            store,
            ldap,
            poller,
            source,
            directory,
        }
    }

    fn change(ldap: &FakeDirectory, number: &str, target: &str) {
        ldap.insert(
            &format!("changeNumber={number},cn=changelog"),
            &[
                ("objectClass", &["changeLogEntry"]),
                ("changeNumber", &[number]),
                ("changeType", &["modify"]),
                ("targetDN", &[target]),
                ("changes", &["replace: mail\nmail: a@corp\n-"]),
                ("changeTime", &["20240115103000Z"]),
            ],
        );
    }

    #[tokio::test]
    async fn records_each_change_once() {
        let f = fixture();
        change(&f.ldap, "1", "uid=a,ou=people,dc=corp");
        change(&f.ldap, "2", "uid=b,ou=people,dc=corp");

        let first = f.poller.poll_all().await;
        assert_eq!(first.recorded, 2);
        assert_eq!(first.sources_polled, 1);

        let second = f.poller.poll_all().await;
        assert_eq!(second.recorded, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(f.store.events().len(), 2);
    }

    #[tokio::test]
    async fn event_carries_directory_and_timestamp() {
        let f = fixture();
        change(&f.ldap, "7", "uid=a,ou=people,dc=corp");
        f.poller.poll_all().await;

        let event = f.store.events().pop().unwrap();
        assert_eq!(event.origin, AuditOrigin::ExternalChangelog);
        assert_eq!(event.directory_id, Some(f.directory.id));
        assert_eq!(event.directory_name.as_deref(), Some("Corp"));
        assert_eq!(event.tenant_id, Some(f.source.tenant_id));
        assert_eq!(event.target_dn.as_deref(), Some("uid=a,ou=people,dc=corp"));
        assert_eq!(
            event.changelog.as_ref().map(|c| (c.scope_id, c.change_number.as_str())),
            Some((f.directory.id, "7"))
        );
        assert_eq!(event.occurred_at, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
        assert_eq!(event.detail["changeType"], "modify");
    }

    #[tokio::test]
    async fn unmatched_target_is_keyed_by_source() {
        let f = fixture();
        change(&f.ldap, "3", "uid=x,dc=elsewhere");
        f.poller.poll_all().await;
        f.poller.poll_all().await;

        let events = f.store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].directory_id, None);
        assert_eq!(events[0].changelog.as_ref().unwrap().scope_id, f.source.id);
    }

    #[tokio::test]
    async fn entries_without_change_number_are_skipped() {
        let f = fixture();
        f.ldap.insert(
            "cn=odd,cn=changelog",
            &[("objectClass", &["changeLogEntry"]), ("targetDN", &["uid=a,dc=corp"])],
        );
        let summary = f.poller.poll_all().await;
        assert_eq!(summary.skipped, 1);
        assert!(f.store.events().is_empty());
    }

    #[tokio::test]
    async fn search_uses_prefix_filter_and_size_limit() {
        let f = fixture();
        f.store
            .put_audit_source(f.source.clone().with_target_prefix("ou=people"));
        f.poller.poll_all().await;

        let search = f
            .ldap
            .journal()
            .into_iter()
            .find(|r| matches!(r, Recorded::Search { .. }))
            .unwrap();
        assert_eq!(
            search,
            Recorded::Search {
                base: "cn=changelog".to_string(),
                filter: "(&(objectClass=changeLogEntry)(targetDN=ou=people*))".to_string(),
                scope: SearchScope::Subtree,
                page_size: None,
                size_limit: 500,
            }
        );
        assert_eq!(f.ldap.journal().last(), Some(&Recorded::Unbind));
    }

    #[tokio::test]
    async fn size_limit_still_delivers_entries() {
        let mut f = fixture();
        f.poller.config.changelog_max_entries = 2;
        for n in 1..=5 {
            change(&f.ldap, &n.to_string(), "uid=a,dc=corp");
        }

        let first = f.poller.poll_all().await;
        assert_eq!(first.recorded, 2);
        assert!(!first.has_failures());
    }

    #[tokio::test]
    async fn failing_source_is_isolated() {
        let f = fixture();
        f.ldap.refuse_connections("connection refused");
        let summary = f.poller.poll_all().await;
        assert_eq!(summary.sources_failed, 1);
        assert_eq!(summary.failures[0].source_id, f.source.id);

        f.ldap.accept_connections();
        change(&f.ldap, "1", "uid=a,dc=corp");
        let summary = f.poller.poll_all().await;
        assert_eq!(summary.recorded, 1);
    }

    #[tokio::test]
    async fn disabled_sources_are_not_polled() {
        let f = fixture();
        f.store.put_audit_source(f.source.clone().with_enabled(false));
        let summary = f.poller.poll_all().await;
        assert_eq!(summary.sources_polled, 0);
        assert_eq!(f.ldap.connects(), 0);
    }

    #[test]
    fn generalized_time_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(parse_generalized_time("20240115103000Z"), Some(expected));
        assert_eq!(
            parse_generalized_time("20240115113000+0100"),
            Some(expected)
        );
        assert!(parse_generalized_time("20240115103000.250Z").is_some());
        assert_eq!(parse_generalized_time("yesterday"), None);
    }

    #[test]
    fn deepest_base_wins() {
        let tenant = Uuid::now_v7();
        let outer = DirectoryConfig::new(tenant, "outer", "h", "cn=a", "p", "dc=corp");
        let inner = DirectoryConfig::new(tenant, "inner", "h", "cn=a", "p", "ou=eu,dc=corp");
        let linked = vec![outer, inner.clone()];
        assert_eq!(match_directory("uid=x,ou=eu,dc=corp", &linked).map(|d| d.id), Some(inner.id));
        assert!(match_directory("uid=x,dc=corporate", &linked).is_none());
    }
}
