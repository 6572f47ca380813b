//! `ldap3` implementation of the connector/session seam.

use std::collections::HashSet;

use async_trait::async_trait;
use la_model::TlsMode;
use ldap3::controls::{Control, ControlType, PagedResults, RawControl};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Mod, SearchEntry, SearchOptions, SearchResult};

use crate::error::{DirectoryError, DirectoryResult};
use crate::session::{
    AttributeChange, ChangeOp, DirectoryConnector, DirectorySession, ProtocolOutcome, RawEntry,
    SearchPage, SearchRequest,
};
use crate::settings::Endpoint;
use crate::tls;

/// Opens `ldap3` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Connector;

impl Ldap3Connector {
    /// Creates a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn conn_settings(endpoint: &Endpoint) -> DirectoryResult<LdapConnSettings> {
        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(endpoint.connect_timeout)
            .set_starttls(endpoint.tls_mode == TlsMode::StartTls);
        if endpoint.tls_mode.is_encrypted() {
            settings = settings.set_connector(tls::build_connector(&endpoint.trust)?);
        }
        Ok(settings)
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn connect(&self, endpoint: &Endpoint) -> DirectoryResult<Box<dyn DirectorySession>> {
        let settings = Self::conn_settings(endpoint)?;
        let url = endpoint.url();

        // StartTLS, when requested, completes inside with_settings.
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| DirectoryError::connection(format!("{url}: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!("LDAP connection driver error: {}", e);
            }
        });

        tracing::debug!(url = %url, tls = ?endpoint.tls_mode, "directory transport opened");
        Ok(Box::new(Ldap3Session { ldap }))
    }
}

/// One `ldap3` connection.
pub struct Ldap3Session {
    ldap: Ldap,
}

fn transport(err: ldap3::LdapError) -> DirectoryError {
    match err {
        ldap3::LdapError::Timeout { .. } => DirectoryError::Timeout,
        other => DirectoryError::connection(other.to_string()),
    }
}

fn outcome(result: ldap3::LdapResult) -> ProtocolOutcome {
    ProtocolOutcome::new(result.rc, result.text)
}

fn value_set(values: &[String]) -> HashSet<String> {
    values.iter().cloned().collect()
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> DirectoryResult<ProtocolOutcome> {
        self.ldap
            .simple_bind(dn, password)
            .await
            .map(outcome)
            .map_err(transport)
    }

    async fn search(&mut self, request: &SearchRequest) -> DirectoryResult<SearchPage> {
        if request.size_limit > 0 {
            self.ldap
                .with_search_options(SearchOptions::new().sizelimit(request.size_limit));
        }
        if let Some(page) = &request.page {
            let control: RawControl = PagedResults {
                size: page.size,
                cookie: page.cookie.clone(),
            }
            .into();
            self.ldap.with_controls(vec![control]);
        }

        let SearchResult(entries, result) = self
            .ldap
            .search(
                &request.base,
                request.scope.to_ldap3(),
                &request.filter,
                request.attributes.clone(),
            )
            .await
            .map_err(transport)?;

        let cookie = result
            .ctrls
            .iter()
            .find_map(|Control(kind, raw)| match kind {
                Some(ControlType::PagedResults) => Some(raw.parse::<PagedResults>().cookie),
                _ => None,
            })
            .unwrap_or_default();

        let entries = entries
            .into_iter()
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                RawEntry {
                    dn: entry.dn,
                    attrs: entry.attrs,
                }
            })
            .collect();

        Ok(SearchPage {
            entries,
            cookie,
            outcome: outcome(result),
        })
    }

    async fn add(
        &mut self,
        dn: &str,
        attributes: &[(String, Vec<String>)],
    ) -> DirectoryResult<ProtocolOutcome> {
        let attrs: Vec<(String, HashSet<String>)> = attributes
            .iter()
            .map(|(name, values)| (name.clone(), value_set(values)))
            .collect();
        self.ldap.add(dn, attrs).await.map(outcome).map_err(transport)
    }

    async fn modify(
        &mut self,
        dn: &str,
        changes: &[AttributeChange],
    ) -> DirectoryResult<ProtocolOutcome> {
        let mods: Vec<Mod<String>> = changes
            .iter()
            .map(|change| {
                let values = value_set(&change.values);
                match change.op {
                    ChangeOp::Add => Mod::Add(change.attribute.clone(), values),
                    ChangeOp::Replace => Mod::Replace(change.attribute.clone(), values),
                    ChangeOp::Delete => Mod::Delete(change.attribute.clone(), values),
                }
            })
            .collect();
        self.ldap.modify(dn, mods).await.map(outcome).map_err(transport)
    }

    async fn delete(&mut self, dn: &str) -> DirectoryResult<ProtocolOutcome> {
        self.ldap.delete(dn).await.map(outcome).map_err(transport)
    }

    async fn modify_dn(
        &mut self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
    ) -> DirectoryResult<ProtocolOutcome> {
        self.ldap
            .modifydn(dn, new_rdn, delete_old_rdn, new_superior)
            .await
            .map(outcome)
            .map_err(transport)
    }

    async fn unbind(&mut self) -> DirectoryResult<()> {
        self.ldap.unbind().await.map_err(transport)
    }
}
