//! Distinguished-name helpers.
//!
//! DNs are compared case-insensitively after trimming. Containment is only
//! ever decided on a comma boundary so that `cn=x,ou=usersExtra,dc=co` is
//! never treated as part of `ou=users,dc=co`.

/// Normalizes a DN for comparison.
#[must_use]
pub fn normalize(dn: &str) -> String {
    dn.trim().to_lowercase()
}

/// Returns true if `entry_dn` equals `branch_dn` or lies beneath it.
#[must_use]
pub fn is_within(entry_dn: &str, branch_dn: &str) -> bool {
    let entry = normalize(entry_dn);
    let branch = normalize(branch_dn);
    if branch.is_empty() {
        return false;
    }
    entry == branch || entry.ends_with(&format!(",{branch}"))
}

/// Splits a DN into its leading RDN and the parent DN.
///
/// Escaped commas (`\,`) inside the RDN value are honoured. Returns `None`
/// when the DN has no parent.
#[must_use]
pub fn split_rdn(dn: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (idx, ch) in dn.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => {
                let rdn = dn[..idx].trim();
                let parent = dn[idx + 1..].trim();
                if rdn.is_empty() || parent.is_empty() {
                    return None;
                }
                return Some((rdn, parent));
            }
            _ => escaped = false,
        }
    }
    None
}

/// Returns the leading RDN, or the whole DN when it has no parent.
#[must_use]
pub fn leading_rdn(dn: &str) -> &str {
    split_rdn(dn).map_or_else(|| dn.trim(), |(rdn, _)| rdn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_match_requires_comma_boundary() {
        assert!(is_within("cn=x,ou=users,dc=co", "ou=users,dc=co"));
        assert!(is_within("ou=users,dc=co", "ou=users,dc=co"));
        assert!(!is_within("cn=x,ou=usersExtra,dc=co", "ou=users,dc=co"));
        assert!(!is_within("cn=x,ou=xusers,dc=co", "ou=users,dc=co"));
    }

    #[test]
    fn branch_match_ignores_case() {
        assert!(is_within("CN=X,OU=Sales,DC=co", "ou=sales,dc=CO"));
        assert!(!is_within("cn=x,ou=Marketing,dc=co", "ou=Sales,dc=co"));
    }

    #[test]
    fn empty_branch_matches_nothing() {
        assert!(!is_within("cn=x,dc=co", ""));
    }

    #[test]
    fn split_rdn_honours_escaped_commas() {
        assert_eq!(
            split_rdn("cn=Smith\\, John,ou=people,dc=co"),
            Some(("cn=Smith\\, John", "ou=people,dc=co"))
        );
        assert_eq!(split_rdn("dc=co"), None);
        assert_eq!(leading_rdn("uid=jdoe,ou=people,dc=co"), "uid=jdoe");
        assert_eq!(leading_rdn("dc=co"), "dc=co");
    }
}
