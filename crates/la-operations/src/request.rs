//! Request types accepted by the operation facade.

use la_access::AccessScope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filter applied when a query carries none.
pub const MATCH_ALL_FILTER: &str = "(objectClass=*)";

/// Where a search runs.
///
/// Searching a directory covers every realm under it and starts at the
/// directory base DN; searching a realm starts at the realm's user or group
/// base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum SearchTarget {
    /// Whole directory.
    Directory(Uuid),
    /// One realm.
    Realm(Uuid),
}

impl SearchTarget {
    /// Returns the access scope checked for this target.
    #[must_use]
    pub const fn scope(&self) -> AccessScope {
        match *self {
            Self::Directory(id) => AccessScope::Directory(id),
            Self::Realm(id) => AccessScope::Realm(id),
        }
    }
}

/// Filter and attribute projection for a search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// LDAP filter; [`MATCH_ALL_FILTER`] when absent.
    #[serde(default)]
    pub filter: Option<String>,
    /// Requested attributes; empty requests all user attributes.
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl SearchQuery {
    /// Creates a match-all query returning every attribute.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Sets the attribute projection.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the effective filter.
    #[must_use]
    pub fn filter(&self) -> &str {
        self.filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(MATCH_ALL_FILTER)
    }
}

/// An entry to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    /// Full DN of the new entry.
    pub dn: String,
    /// Attribute values, objectClass included or not.
    pub attributes: Vec<(String, Vec<String>)>,
}

impl NewEntry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// Appends an attribute.
    #[must_use]
    pub fn attr<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Checks if the caller supplied object classes.
    #[must_use]
    pub fn has_object_classes(&self) -> bool {
        self.attributes
            .iter()
            .any(|(name, values)| name.eq_ignore_ascii_case("objectClass") && !values.is_empty())
    }

    /// Names of the supplied attributes, in order.
    #[must_use]
    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.iter().map(|(name, _)| name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_filter_matches_all() {
        assert_eq!(SearchQuery::new().filter(), MATCH_ALL_FILTER);
        assert_eq!(SearchQuery::new().with_filter("  ").filter(), MATCH_ALL_FILTER);
        assert_eq!(SearchQuery::new().with_filter("(uid=a)").filter(), "(uid=a)");
    }

    #[test]
    fn object_class_detection_ignores_case() {
        let entry = NewEntry::new("uid=a,dc=co").attr("OBJECTCLASS", ["person"]);
        assert!(entry.has_object_classes());
        assert!(!NewEntry::new("uid=a,dc=co").attr("uid", ["a"]).has_object_classes());
    }
}
