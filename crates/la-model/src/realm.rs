//! Realm domain model.
//!
//! A realm is an administrative slice of one directory: a user subtree, a
//! group subtree, and the object classes used when creating users there.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Administrative slice of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Realm {
    /// Unique identifier.
    pub id: Uuid,

    /// Directory this realm belongs to.
    pub directory_id: Uuid,

    /// Realm name.
    pub name: String,

    /// Search base for users.
    pub user_base_dn: String,

    /// Search base for groups.
    pub group_base_dn: String,

    /// Structural object class of created users.
    pub primary_user_object_class: String,

    /// Auxiliary object classes added to created users.
    #[serde(default)]
    pub auxiliary_object_classes: Vec<String>,
}

impl Realm {
    /// Creates a realm with `inetOrgPerson` users.
    #[must_use]
    pub fn new(
        directory_id: Uuid,
        name: impl Into<String>,
        user_base_dn: impl Into<String>,
        group_base_dn: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            directory_id,
            name: name.into(),
            user_base_dn: user_base_dn.into(),
            group_base_dn: group_base_dn.into(),
            primary_user_object_class: "inetOrgPerson".to_string(),
            auxiliary_object_classes: Vec::new(),
        }
    }

    /// Returns every object class a new user in this realm receives.
    #[must_use]
    pub fn user_object_classes(&self) -> Vec<String> {
        let mut classes = vec![self.primary_user_object_class.clone()];
        classes.extend(
            self.auxiliary_object_classes
                .iter()
                .filter(|c| !c.eq_ignore_ascii_case(&self.primary_user_object_class))
                .cloned(),
        );
        classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_object_classes_lead_with_primary() {
        let mut realm = Realm::new(Uuid::now_v7(), "staff", "ou=people,dc=co", "ou=groups,dc=co");
        realm.auxiliary_object_classes = vec!["posixAccount".into(), "InetOrgPerson".into()];
        assert_eq!(
            realm.user_object_classes(),
            vec!["inetOrgPerson".to_string(), "posixAccount".to_string()]
        );
    }
}
