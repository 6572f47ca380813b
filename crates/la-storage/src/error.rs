//! Repository errors.

use la_model::ChangelogPosition;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by repositories.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A record references another record that does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind, e.g. "directory" or "audit source".
        kind: &'static str,
        /// Missing id.
        id: Uuid,
    },

    /// The changelog change is already recorded for its scope.
    #[error("change {change_number} already recorded for scope {scope_id}")]
    Duplicate {
        /// Directory or audit source the change number belongs to.
        scope_id: Uuid,
        /// Changelog `changeNumber`.
        change_number: String,
    },

    /// A seed document could not be parsed.
    #[error("invalid seed document: {0}")]
    Serialization(String),

    /// The backing store is unavailable.
    #[error("storage unavailable: {0}")]
    Connection(String),
}

impl StorageError {
    /// Creates a not-found error.
    #[must_use]
    pub const fn not_found(kind: &'static str, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    /// Creates a duplicate error for a changelog position.
    #[must_use]
    pub fn duplicate(position: &ChangelogPosition) -> Self {
        Self::Duplicate {
            scope_id: position.scope_id,
            change_number: position.change_number.clone(),
        }
    }

    /// Checks if this is a not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Checks if the change was already recorded.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Result type for repository calls.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for la_core::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, id } => Self::NotFound(format!("{kind} {id}")),
            other => Self::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_reference_maps_to_not_found() {
        let id = Uuid::now_v7();
        let err = StorageError::not_found("directory", id);

        assert!(err.is_not_found());
        assert!(!err.is_duplicate());
        match la_core::Error::from(err) {
            la_core::Error::NotFound(what) => assert_eq!(what, format!("directory {id}")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn duplicate_change_names_its_position() {
        let scope_id = Uuid::now_v7();
        let err = StorageError::duplicate(&ChangelogPosition {
            scope_id,
            change_number: "42".to_string(),
        });

        assert!(err.is_duplicate());
        assert!(err.to_string().contains("change 42"));
        assert!(err.to_string().contains(&scope_id.to_string()));
        assert!(matches!(la_core::Error::from(err), la_core::Error::Storage(_)));
    }
}
