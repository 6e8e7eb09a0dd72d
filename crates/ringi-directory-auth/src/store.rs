//! Local identity records and an in-memory store.
//!
//! The production store is a relational database owned by the approval
//! workflow; it implements [`IdentityStore`](crate::traits::IdentityStore)
//! outside this crate. [`MemoryIdentityStore`] provides the same contract
//! for tests and embedded use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DirectoryAuthResult;
use crate::traits::IdentityStore;

/// Provenance of a local identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Created locally; authenticates against the stored password hash.
    Local,
    /// Provisioned from the directory; always re-authenticated against the
    /// directory, never against a stored hash.
    Directory,
}

/// A local identity record.
///
/// Created on first successful directory authentication (or when
/// provisioned as a neighbor), updated on every subsequent one, never
/// deleted by this crate.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique key.
    pub username: String,
    /// Provenance; once `Directory`, local password fallback is forbidden.
    pub source: IdentitySource,
    pub email: String,
    pub given_name: String,
    pub surname: String,
    /// Distinguished name from the directory, empty for local identities.
    pub directory_dn: String,
    /// Nearest enclosing OU component of `directory_dn`.
    pub org_unit_code: String,
    /// Next-enclosing OU component, one level up.
    pub parent_org_unit_code: String,
    /// Last successful directory sync.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Argon2id PHC hash; `None` means no usable local password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("source", &self.source)
            .field("email", &self.email)
            .field("directory_dn", &self.directory_dn)
            .field("org_unit_code", &self.org_unit_code)
            .field("parent_org_unit_code", &self.parent_org_unit_code)
            .field("last_synced_at", &self.last_synced_at)
            .field(
                "password_hash",
                &self.password_hash.as_ref().map(|_| "***REDACTED***"),
            )
            .finish()
    }
}

impl Identity {
    /// Create a local-sourced identity with a usable password hash.
    pub fn new_local(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            source: IdentitySource::Local,
            email: String::new(),
            given_name: String::new(),
            surname: String::new(),
            directory_dn: String::new(),
            org_unit_code: String::new(),
            parent_org_unit_code: String::new(),
            last_synced_at: None,
            password_hash: Some(password_hash.into()),
        }
    }

    /// Create a directory-sourced identity shell with an unusable local
    /// password.
    pub fn new_directory(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            source: IdentitySource::Directory,
            email: String::new(),
            given_name: String::new(),
            surname: String::new(),
            directory_dn: String::new(),
            org_unit_code: String::new(),
            parent_org_unit_code: String::new(),
            last_synced_at: None,
            password_hash: None,
        }
    }

    /// Whether the record carries a usable local password hash.
    #[must_use]
    pub fn has_usable_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// In-memory identity store keyed by username.
///
/// Get-or-create is atomic under the single write lock, satisfying the
/// contract required of production stores.
#[derive(Debug, Default, Clone)]
pub struct MemoryIdentityStore {
    identities: Arc<RwLock<HashMap<String, Identity>>>,
}

impl MemoryIdentityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an identity directly (test/bootstrap helper).
    pub async fn insert(&self, identity: Identity) {
        self.identities
            .write()
            .await
            .insert(identity.username.clone(), identity);
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get_by_username(&self, username: &str) -> DirectoryAuthResult<Option<Identity>> {
        Ok(self.identities.read().await.get(username).cloned())
    }

    async fn create(&self, identity: Identity) -> DirectoryAuthResult<Identity> {
        let mut guard = self.identities.write().await;
        let stored = guard
            .entry(identity.username.clone())
            .or_insert(identity)
            .clone();
        Ok(stored)
    }

    async fn update(
        &self,
        identity: &Identity,
        _changed_fields: &[&'static str],
    ) -> DirectoryAuthResult<()> {
        self.identities
            .write()
            .await
            .insert(identity.username.clone(), identity.clone());
        Ok(())
    }

    async fn list_by_org_unit(&self, org_unit_code: &str) -> DirectoryAuthResult<Vec<Identity>> {
        if org_unit_code.is_empty() {
            return Ok(Vec::new());
        }
        let guard = self.identities.read().await;
        let mut matches: Vec<Identity> = guard
            .values()
            .filter(|i| i.org_unit_code == org_unit_code)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_returns_existing() {
        let store = MemoryIdentityStore::new();
        let first = store.create(Identity::new_directory("alice")).await.unwrap();

        let mut second = Identity::new_directory("alice");
        second.email = "other@example.com".to_string();
        let stored = store.create(second).await.unwrap();

        // First writer wins; the concurrent create converges on one record.
        assert_eq!(stored, first);
        assert_eq!(stored.email, "");
    }

    #[tokio::test]
    async fn test_update_overwrites() {
        let store = MemoryIdentityStore::new();
        let mut identity = store.create(Identity::new_directory("alice")).await.unwrap();

        identity.org_unit_code = "Dept1".to_string();
        store.update(&identity, &["org_unit_code"]).await.unwrap();

        let fetched = store.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(fetched.org_unit_code, "Dept1");
    }

    #[tokio::test]
    async fn test_list_by_org_unit() {
        let store = MemoryIdentityStore::new();
        for (name, ou) in [("carol", "Dept1"), ("alice", "Dept1"), ("bob", "Div")] {
            let mut identity = Identity::new_directory(name);
            identity.org_unit_code = ou.to_string();
            store.insert(identity).await;
        }

        let dept1 = store.list_by_org_unit("Dept1").await.unwrap();
        let names: Vec<&str> = dept1.iter().map(|i| i.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "carol"]);

        assert!(store.list_by_org_unit("").await.unwrap().is_empty());
        assert!(store.list_by_org_unit("Nowhere").await.unwrap().is_empty());
    }

    #[test]
    fn test_debug_redacts_password_hash() {
        let identity = Identity::new_local("svc-admin", "$argon2id$v=19$secret");
        let debug = format!("{identity:?}");
        assert!(debug.contains("***REDACTED***"));
        assert!(!debug.contains("argon2id"));
    }

    #[test]
    fn test_identity_source_serde_names() {
        assert_eq!(
            serde_json::to_string(&IdentitySource::Directory).unwrap(),
            "\"directory\""
        );
        assert_eq!(
            serde_json::from_str::<IdentitySource>("\"local\"").unwrap(),
            IdentitySource::Local
        );
    }
}
