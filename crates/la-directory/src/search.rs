//! Paged search support.
//!
//! Implements the RFC 2696 simple paged-results loop: the same subtree search
//! is re-issued with the cookie of the previous page until the server
//! returns an empty cookie. Entries are accumulated in server order and
//! normalized so attribute names are looked up case-insensitively.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{DirectoryError, DirectoryResult};
use crate::session::{result_code, DirectorySession, RawEntry, SearchRequest};
use crate::settings::SearchScope;

/// Page size used when the directory config carries none.
pub const DEFAULT_PAGE_SIZE: i32 = 500;

/// A search result entry with lower-cased attribute names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    /// Entry DN as returned by the server.
    pub dn: String,
    attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Normalizes a raw entry. Attribute names differing only in case are
    /// merged.
    #[must_use]
    pub fn from_raw(raw: RawEntry) -> Self {
        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, values) in raw.attrs {
            attributes
                .entry(name.to_lowercase())
                .or_default()
                .extend(values);
        }
        Self {
            dn: raw.dn,
            attributes,
        }
    }

    /// Gets the first value of an attribute.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.get_attrs(name).first().map(String::as_str)
    }

    /// Gets all values of an attribute.
    #[must_use]
    pub fn get_attrs(&self, name: &str) -> &[String] {
        self.attributes
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Checks if the entry carries an attribute.
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        !self.get_attrs(name).is_empty()
    }

    /// Returns every attribute keyed by its lower-cased name.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.attributes
    }
}

/// Runs paged subtree searches on a bound session.
#[derive(Debug, Clone, Copy)]
pub struct PagedSearchExecutor {
    page_size: i32,
}

impl PagedSearchExecutor {
    /// Creates an executor. A non-positive page size falls back to
    /// [`DEFAULT_PAGE_SIZE`].
    #[must_use]
    pub const fn new(page_size: i32) -> Self {
        let page_size = if page_size > 0 {
            page_size
        } else {
            DEFAULT_PAGE_SIZE
        };
        Self { page_size }
    }

    /// Returns the page size sent with every request.
    #[must_use]
    pub const fn page_size(&self) -> i32 {
        self.page_size
    }

    /// Searches the subtree under `base`, following the paging cookie until
    /// the result set is exhausted.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the base does not exist, `Rejected` for any
    /// other non-success result, or the transport error.
    pub async fn execute(
        &self,
        session: &mut dyn DirectorySession,
        base: &str,
        filter: &str,
        attributes: &[String],
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        let mut entries = Vec::new();
        let mut cookie = Vec::new();
        let mut pages = 0usize;

        loop {
            let request = SearchRequest::new(base, SearchScope::Subtree, filter)
                .with_attributes(attributes.iter().cloned())
                .with_page(self.page_size, cookie);
            let page = session.search(&request).await?;
            pages += 1;

            match page.outcome.code {
                result_code::SUCCESS => {}
                result_code::NO_SUCH_OBJECT => return Err(DirectoryError::not_found(base)),
                code => {
                    return Err(DirectoryError::rejected(
                        "search",
                        base,
                        code,
                        page.outcome.diagnostic,
                    ))
                }
            }

            entries.extend(page.entries.into_iter().map(DirectoryEntry::from_raw));
            if page.cookie.is_empty() {
                break;
            }
            cookie = page.cookie;
        }

        tracing::debug!(base = %base, filter = %filter, pages, entries = entries.len(), "paged search complete");
        Ok(entries)
    }
}

/// Reads one entry with a base-scope search.
///
/// ## Errors
///
/// Returns `NotFound` if the entry does not exist.
pub async fn find_entry(
    session: &mut dyn DirectorySession,
    dn: &str,
    attributes: &[String],
) -> DirectoryResult<DirectoryEntry> {
    let request = SearchRequest::new(dn, SearchScope::Base, "(objectClass=*)")
        .with_attributes(attributes.iter().cloned());
    let page = session.search(&request).await?;

    match page.outcome.code {
        result_code::SUCCESS => page
            .entries
            .into_iter()
            .next()
            .map(DirectoryEntry::from_raw)
            .ok_or_else(|| DirectoryError::not_found(dn)),
        result_code::NO_SUCH_OBJECT => Err(DirectoryError::not_found(dn)),
        code => Err(DirectoryError::rejected("search", dn, code, page.outcome.diagnostic)),
    }
}
