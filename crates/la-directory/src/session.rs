//! Protocol seam between the pool and the wire.
//!
//! [`DirectoryConnector`] opens transports (including TLS negotiation) and
//! [`DirectorySession`] performs LDAPv3 operations on one of them. The pool,
//! the paged search loop and the protocol operations are written against
//! these traits only.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::DirectoryResult;
use crate::settings::{Endpoint, SearchScope};

/// LDAP result codes the crate reacts to.
pub mod result_code {
    /// Operation completed.
    pub const SUCCESS: u32 = 0;
    /// Size limit reached; returned entries are still valid.
    pub const SIZE_LIMIT_EXCEEDED: u32 = 4;
    /// Target entry does not exist.
    pub const NO_SUCH_OBJECT: u32 = 32;
    /// Wrong bind DN or password.
    pub const INVALID_CREDENTIALS: u32 = 49;
    /// Insufficient access rights.
    pub const INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
    /// Entry already exists.
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
}

/// Result code and diagnostic of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolOutcome {
    /// Native result code.
    pub code: u32,
    /// Server diagnostic text.
    pub diagnostic: String,
}

impl ProtocolOutcome {
    /// Creates an outcome.
    #[must_use]
    pub fn new(code: u32, diagnostic: impl Into<String>) -> Self {
        Self {
            code,
            diagnostic: diagnostic.into(),
        }
    }

    /// Creates a success outcome.
    #[must_use]
    pub fn success() -> Self {
        Self::new(result_code::SUCCESS, "")
    }

    /// Returns true for result code 0.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == result_code::SUCCESS
    }
}

/// Entry as returned by the server, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Entry DN.
    pub dn: String,
    /// Attribute values keyed by the server's attribute names.
    pub attrs: HashMap<String, Vec<String>>,
}

/// RFC 2696 simple paged-results control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageControl {
    /// Requested page size.
    pub size: i32,
    /// Cookie from the previous page; empty on the first request.
    pub cookie: Vec<u8>,
}

/// One search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base.
    pub base: String,
    /// Search scope.
    pub scope: SearchScope,
    /// Filter string.
    pub filter: String,
    /// Requested attributes; empty means all user attributes.
    pub attributes: Vec<String>,
    /// Server-side size limit; 0 means none.
    pub size_limit: i32,
    /// Paged-results control.
    pub page: Option<PageControl>,
}

impl SearchRequest {
    /// Creates a request with no size limit and no paging.
    #[must_use]
    pub fn new(base: impl Into<String>, scope: SearchScope, filter: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            scope,
            filter: filter.into(),
            attributes: Vec::new(),
            size_limit: 0,
            page: None,
        }
    }

    /// Sets the requested attributes.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the size limit.
    #[must_use]
    pub const fn with_size_limit(mut self, size_limit: i32) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Sets the paged-results control.
    #[must_use]
    pub fn with_page(mut self, size: i32, cookie: Vec<u8>) -> Self {
        self.page = Some(PageControl { size, cookie });
        self
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    /// Entries in server order.
    pub entries: Vec<RawEntry>,
    /// Cookie for the next page; empty when the result set is exhausted.
    pub cookie: Vec<u8>,
    /// Final result of the search request.
    pub outcome: ProtocolOutcome,
}

/// Kind of attribute modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    /// Add values.
    Add,
    /// Replace all values.
    Replace,
    /// Delete the given values, or the attribute when none are given.
    Delete,
}

/// One attribute modification.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AttributeChange {
    /// Modification kind.
    pub op: ChangeOp,
    /// Attribute name.
    pub attribute: String,
    /// Values.
    pub values: Vec<String>,
}

impl AttributeChange {
    /// Adds values to an attribute.
    #[must_use]
    pub fn add(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            op: ChangeOp::Add,
            attribute: attribute.into(),
            values,
        }
    }

    /// Replaces an attribute's values.
    #[must_use]
    pub fn replace(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            op: ChangeOp::Replace,
            attribute: attribute.into(),
            values,
        }
    }

    /// Deletes values, or the whole attribute when `values` is empty.
    #[must_use]
    pub fn delete(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            op: ChangeOp::Delete,
            attribute: attribute.into(),
            values,
        }
    }
}

/// Opens transports to a directory.
///
/// `connect` must leave the session encrypted when the endpoint asks for
/// TLS: implicit TLS from the first byte, or StartTLS completed before the
/// session is returned (and therefore before any bind).
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Opens an unbound session.
    async fn connect(&self, endpoint: &Endpoint) -> DirectoryResult<Box<dyn DirectorySession>>;
}

/// LDAPv3 operations on one open transport.
///
/// Transport failures are returned as connection-class errors; completed
/// requests return their [`ProtocolOutcome`] even when the server refused
/// them.
#[async_trait]
pub trait DirectorySession: Send {
    /// Simple bind.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> DirectoryResult<ProtocolOutcome>;

    /// Search, returning one page.
    async fn search(&mut self, request: &SearchRequest) -> DirectoryResult<SearchPage>;

    /// Add an entry.
    async fn add(
        &mut self,
        dn: &str,
        attributes: &[(String, Vec<String>)],
    ) -> DirectoryResult<ProtocolOutcome>;

    /// Modify an entry.
    async fn modify(
        &mut self,
        dn: &str,
        changes: &[AttributeChange],
    ) -> DirectoryResult<ProtocolOutcome>;

    /// Delete an entry.
    async fn delete(&mut self, dn: &str) -> DirectoryResult<ProtocolOutcome>;

    /// Rename or move an entry.
    async fn modify_dn(
        &mut self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
    ) -> DirectoryResult<ProtocolOutcome>;

    /// Unbind and close the transport.
    async fn unbind(&mut self) -> DirectoryResult<()>;
}
