//! Write operations with result-code checking.
//!
//! Every function here takes an already bound session, issues exactly one
//! protocol request (plus a read-back where noted), and turns a non-success
//! result into `NotFound` (code 32) or `Rejected` carrying the verb, DN,
//! native code and server diagnostic.

use la_model::{dn, DirectoryConfig};

use crate::error::{DirectoryError, DirectoryResult};
use crate::search::find_entry;
use crate::session::{result_code, AttributeChange, DirectorySession, ProtocolOutcome};

/// Checked LDAP write operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryProtocolOps;

impl DirectoryProtocolOps {
    /// Adds an entry.
    ///
    /// ## Errors
    ///
    /// Returns `Rejected` if the server refuses the add (for example code 68
    /// when the entry exists).
    pub async fn add_entry(
        session: &mut dyn DirectorySession,
        dn: &str,
        attributes: &[(String, Vec<String>)],
    ) -> DirectoryResult<()> {
        let outcome = session.add(dn, attributes).await?;
        check("add", dn, outcome)?;
        tracing::info!(dn = %dn, "directory entry added");
        Ok(())
    }

    /// Applies attribute modifications.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the entry does not exist or `Rejected` for any
    /// other refusal.
    pub async fn modify_entry(
        session: &mut dyn DirectorySession,
        dn: &str,
        changes: &[AttributeChange],
    ) -> DirectoryResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let outcome = session.modify(dn, changes).await?;
        check("modify", dn, outcome)?;
        tracing::debug!(dn = %dn, changes = changes.len(), "directory entry modified");
        Ok(())
    }

    /// Deletes an entry.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the entry does not exist or `Rejected` for any
    /// other refusal (for example code 66 on a non-leaf entry).
    pub async fn delete_entry(session: &mut dyn DirectorySession, dn: &str) -> DirectoryResult<()> {
        let outcome = session.delete(dn).await?;
        check("delete", dn, outcome)?;
        tracing::info!(dn = %dn, "directory entry deleted");
        Ok(())
    }

    /// Moves an entry under `new_parent`, keeping its RDN and deleting the
    /// old RDN value. Returns the new DN.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` or `Rejected` as reported by the server.
    pub async fn move_entry(
        session: &mut dyn DirectorySession,
        entry_dn: &str,
        new_parent: &str,
    ) -> DirectoryResult<String> {
        let rdn = dn::leading_rdn(entry_dn);
        let outcome = session
            .modify_dn(entry_dn, rdn, true, Some(new_parent))
            .await?;
        check("modify DN", entry_dn, outcome)?;

        let moved = format!("{rdn},{}", new_parent.trim());
        tracing::info!(from = %entry_dn, to = %moved, "directory entry moved");
        Ok(moved)
    }

    /// Builds the modification that enables or disables an account using
    /// the directory's toggle mapping.
    ///
    /// ## Errors
    ///
    /// Returns `Configuration` if the directory has no toggle mapping.
    pub fn account_toggle_change(
        config: &DirectoryConfig,
        enabled: bool,
    ) -> DirectoryResult<AttributeChange> {
        let toggle = config.account_toggle.as_ref().ok_or_else(|| {
            DirectoryError::config(format!(
                "no enable/disable attribute configured for directory [{}]",
                config.display_name
            ))
        })?;
        Ok(AttributeChange::replace(
            toggle.attribute.clone(),
            vec![toggle.value_for(enabled)],
        ))
    }

    /// Enables or disables an account.
    ///
    /// ## Errors
    ///
    /// See [`DirectoryProtocolOps::account_toggle_change`] and
    /// [`DirectoryProtocolOps::modify_entry`].
    pub async fn set_account_enabled(
        session: &mut dyn DirectorySession,
        config: &DirectoryConfig,
        entry_dn: &str,
        enabled: bool,
    ) -> DirectoryResult<()> {
        let change = Self::account_toggle_change(config, enabled)?;
        Self::modify_entry(session, entry_dn, &[change]).await?;
        tracing::info!(dn = %entry_dn, enabled, "account state changed");
        Ok(())
    }

    /// Adds a value to a group's membership attribute (`member`,
    /// `uniqueMember`, `memberUid`, ...).
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` or `Rejected` as reported by the server.
    pub async fn add_member(
        session: &mut dyn DirectorySession,
        group_dn: &str,
        member_attribute: &str,
        member_value: &str,
    ) -> DirectoryResult<()> {
        let change = AttributeChange::add(member_attribute, vec![member_value.to_string()]);
        Self::modify_entry(session, group_dn, &[change]).await
    }

    /// Removes a value from a group's membership attribute.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` or `Rejected` as reported by the server.
    pub async fn remove_member(
        session: &mut dyn DirectorySession,
        group_dn: &str,
        member_attribute: &str,
        member_value: &str,
    ) -> DirectoryResult<()> {
        let change = AttributeChange::delete(member_attribute, vec![member_value.to_string()]);
        Self::modify_entry(session, group_dn, &[change]).await
    }

    /// Returns every value of a group's membership attribute.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the group does not exist.
    pub async fn members(
        session: &mut dyn DirectorySession,
        group_dn: &str,
        member_attribute: &str,
    ) -> DirectoryResult<Vec<String>> {
        let entry = find_entry(session, group_dn, &[member_attribute.to_string()]).await?;
        Ok(entry.get_attrs(member_attribute).to_vec())
    }
}

/// Maps a protocol outcome to the error taxonomy.
fn check(verb: &'static str, dn: &str, outcome: ProtocolOutcome) -> DirectoryResult<()> {
    match outcome.code {
        result_code::SUCCESS => Ok(()),
        result_code::NO_SUCH_OBJECT => Err(DirectoryError::not_found(dn)),
        code => Err(DirectoryError::rejected(verb, dn, code, outcome.diagnostic)),
    }
}
