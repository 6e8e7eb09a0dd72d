//! Typed directory entries and DN structure analysis.
//!
//! All "attribute might be absent" handling lives in one mapping function:
//! a raw `ldap3::SearchEntry` is converted into a [`DirectoryEntry`] with
//! total, default-valued field extraction immediately after a search.
//! Org-unit codes are derived from DN string structure, not from a literal
//! attribute.

use ldap3::SearchEntry;

/// Attributes projected for the target user and for neighbor searches.
pub const USER_ATTRIBUTES: &[&str] = &[
    "sAMAccountName",
    "cn",
    "mail",
    "distinguishedName",
    "displayName",
    "givenName",
    "sn",
];

/// A resolved directory entry with every field defaulted to empty when the
/// underlying attribute is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub sam_account_name: String,
    pub common_name: String,
    pub mail: String,
    pub distinguished_name: String,
    pub display_name: String,
    pub given_name: String,
    pub surname: String,
}

impl DirectoryEntry {
    /// Map a raw search entry into a typed one. The entry DN is used when
    /// the `distinguishedName` attribute is not returned.
    #[must_use]
    pub fn from_search_entry(entry: &SearchEntry) -> Self {
        let attr = |name: &str| -> String {
            entry
                .attrs
                .get(name)
                .and_then(|values| values.first())
                .cloned()
                .unwrap_or_default()
        };

        let mut dn = attr("distinguishedName");
        if dn.is_empty() {
            dn = entry.dn.clone();
        }

        Self {
            sam_account_name: attr("sAMAccountName"),
            common_name: attr("cn"),
            mail: attr("mail"),
            distinguished_name: dn,
            display_name: attr("displayName"),
            given_name: attr("givenName"),
            surname: attr("sn"),
        }
    }

    /// Best available display name: `displayName`, else `cn`, else the
    /// account name.
    #[must_use]
    pub fn best_display_name(&self) -> &str {
        if !self.display_name.is_empty() {
            &self.display_name
        } else if !self.common_name.is_empty() {
            &self.common_name
        } else {
            &self.sam_account_name
        }
    }
}

/// Extract the org-unit codes from a DN.
///
/// For `CN=Alice,OU=Dept1,OU=Div,DC=example,DC=com` the nearest enclosing
/// OU component is `Dept1` and the next-enclosing one is `Div`. The parent
/// code is only taken when a second `OU=` component directly follows the
/// first; a `CN=`/`DC=` in between ends the OU run. Missing components
/// yield empty strings.
#[must_use]
pub fn extract_ou_levels(dn: &str) -> (String, String) {
    let parts: Vec<&str> = dn.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();

    let Some(first_ou) = parts.iter().position(|p| is_ou_component(p)) else {
        return (String::new(), String::new());
    };

    let ou = ou_value(parts[first_ou]);
    let parent = parts
        .get(first_ou + 1)
        .filter(|p| is_ou_component(p))
        .map(|p| ou_value(p))
        .unwrap_or_default();

    (ou, parent)
}

/// Derive the neighbor search bases from a DN.
///
/// Returns the same-OU base (`OU=Dept1,OU=Div,DC=…`, searched subtree) and
/// the parent-OU base (`OU=Div,DC=…`, searched one level), each `None`
/// when the corresponding OU component is absent.
#[must_use]
pub fn ou_search_bases(dn: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = dn.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();

    let Some(first_ou) = parts.iter().position(|p| is_ou_component(p)) else {
        return (None, None);
    };

    let same = Some(parts[first_ou..].join(","));
    let parent = parts
        .get(first_ou + 1)
        .filter(|p| is_ou_component(p))
        .map(|_| parts[first_ou + 1..].join(","));

    (same, parent)
}

fn is_ou_component(part: &str) -> bool {
    part.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("ou="))
}

fn ou_value(part: &str) -> String {
    part[3..].to_string()
}
