//! Identity provisioning from resolved directory entries.
//!
//! Maps a [`DirectoryEntry`] onto the local identity record: creates the
//! record on first sight, re-derives provenance and org-unit fields on
//! every successful authentication, and persists only when something
//! actually changed. Neighbor provisioning fans out exactly one OU level
//! to seed approver candidates.

use chrono::Utc;
use tracing::{debug, info};

use crate::config::DirectoryConfig;
use crate::entry::{extract_ou_levels, ou_search_bases, DirectoryEntry};
use crate::error::DirectoryAuthResult;
use crate::store::{Identity, IdentitySource};
use crate::traits::{DirectorySession, IdentityStore};

/// Ensure a local identity exists for `username` and is synced to `entry`.
///
/// Creation uses minimal fields: directory mail (falling back to
/// `username@{upn_suffix|domain}`), display name split on the first space,
/// `Directory` provenance, and no usable local password. Existing records
/// are never re-created, only synced.
pub async fn ensure_identity(
    store: &dyn IdentityStore,
    username: &str,
    entry: &DirectoryEntry,
    config: &DirectoryConfig,
) -> DirectoryAuthResult<Identity> {
    let existing = store.get_by_username(username).await?;

    let identity = match existing {
        Some(identity) => identity,
        None => {
            let display = entry.best_display_name();
            let display = if display.is_empty() { username } else { display };
            let (given, surname) = match display.split_once(' ') {
                Some((first, rest)) => (first.to_string(), rest.to_string()),
                None => (display.to_string(), String::new()),
            };

            let email = if entry.mail.is_empty() {
                let suffix = config
                    .upn_suffix
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .unwrap_or(if config.domain.is_empty() {
                        "local"
                    } else {
                        config.domain.as_str()
                    });
                format!("{username}@{suffix}")
            } else {
                entry.mail.clone()
            };

            let mut identity = Identity::new_directory(username);
            identity.email = email;
            identity.given_name = given;
            identity.surname = surname;
            let created = store.create(identity).await?;
            debug!(username, "local identity created from directory entry");
            created
        }
    };

    sync_identity(store, identity, entry).await
}

/// Sync provenance, DN, and org-unit fields from `entry`.
///
/// The org-unit codes are re-derived from the DN on every call and
/// overwrite stale values. The record is persisted only when a field
/// changed; a second sync against an unchanged entry performs zero writes.
pub async fn sync_identity(
    store: &dyn IdentityStore,
    mut identity: Identity,
    entry: &DirectoryEntry,
) -> DirectoryAuthResult<Identity> {
    let mut changed: Vec<&'static str> = Vec::new();

    if identity.source != IdentitySource::Directory {
        identity.source = IdentitySource::Directory;
        changed.push("source");
    }

    let dn = &entry.distinguished_name;
    if !dn.is_empty() && identity.directory_dn != *dn {
        identity.directory_dn = dn.clone();
        changed.push("directory_dn");
    }

    let (ou, parent_ou) = extract_ou_levels(dn);
    if !ou.is_empty() && identity.org_unit_code != ou {
        identity.org_unit_code = ou;
        changed.push("org_unit_code");
    }
    if !parent_ou.is_empty() && identity.parent_org_unit_code != parent_ou {
        identity.parent_org_unit_code = parent_ou;
        changed.push("parent_org_unit_code");
    }

    if !changed.is_empty() {
        identity.last_synced_at = Some(Utc::now());
        changed.push("last_synced_at");
        store.update(&identity, &changed).await?;
        info!(
            username = %identity.username,
            changed = ?changed,
            "identity fields synced from directory"
        );
    }

    Ok(identity)
}

/// Provision identities for the authenticated user's neighbors.
///
/// One subtree search over the same OU and one level search over the
/// parent OU, then an idempotent ensure+sync per neighbor. Fan-out is a
/// single OU level; neighbors of neighbors are never discovered. All
/// failures are logged and swallowed — this never blocks authentication.
///
/// Returns the number of neighbor identities ensured.
pub async fn provision_neighbors(
    store: &dyn IdentityStore,
    session: &mut dyn DirectorySession,
    entry: &DirectoryEntry,
    config: &DirectoryConfig,
    authenticated_username: &str,
) -> usize {
    let (same_ou_base, parent_ou_base) = ou_search_bases(&entry.distinguished_name);
    let Some(same_ou_base) = same_ou_base else {
        return 0;
    };

    let neighbors = session
        .find_neighbors(
            &same_ou_base,
            parent_ou_base.as_deref(),
            authenticated_username,
            config.neighbor_size_limit,
        )
        .await;

    let mut ensured = 0usize;
    for neighbor in &neighbors {
        match ensure_identity(store, &neighbor.sam_account_name, neighbor, config).await {
            Ok(_) => ensured += 1,
            Err(e) => {
                debug!(
                    neighbor = %neighbor.sam_account_name,
                    error = %e,
                    "neighbor provisioning skipped"
                );
            }
        }
    }

    if ensured > 0 {
        info!(
            username = authenticated_username,
            ensured,
            base = %same_ou_base,
            "neighbor identities provisioned"
        );
    }

    ensured
}
