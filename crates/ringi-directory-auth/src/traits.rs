//! Trait seams between the orchestrator and its collaborators.
//!
//! The directory itself and the local identity store sit behind traits so
//! the authentication state machine can be exercised against spies and
//! in-memory fakes, and so the relational store implementation can live
//! with the (out of scope) web layer.

use async_trait::async_trait;

use crate::candidates::BindCandidate;
use crate::config::DirectoryConfig;
use crate::entry::DirectoryEntry;
use crate::error::{BindAttempt, DirectoryAuthResult};
use crate::store::Identity;

/// One physical connection attempt against the directory.
///
/// A failure at any stage (transport, StartTLS, bind) is returned as a
/// structured [`BindAttempt`], never as a fault: the orchestrator records
/// it and moves to the next candidate.
#[async_trait]
pub trait DirectoryBind: Send + Sync {
    /// Establish transport, negotiate security, and bind with the
    /// candidate's identity and the user's password.
    async fn connect(
        &self,
        config: &DirectoryConfig,
        candidate: &BindCandidate,
        password: &str,
    ) -> Result<Box<dyn DirectorySession>, BindAttempt>;
}

/// A bound directory session. Must be released via [`close`] on every exit
/// path.
///
/// [`close`]: DirectorySession::close
#[async_trait]
pub trait DirectorySession: Send {
    /// Resolve the directory entry for the target account name.
    ///
    /// `Ok(None)` is a distinct terminal condition: the bind succeeded but
    /// the account does not exist in the directory.
    async fn find_user(
        &mut self,
        username: &str,
        search_base: &str,
    ) -> Result<Option<DirectoryEntry>, BindAttempt>;

    /// Enumerate entries in the same OU (subtree) and the parent OU (one
    /// level), excluding the authenticating user, each search capped at
    /// `size_limit`. Failures are logged and swallowed; this feeds
    /// best-effort approver-candidate provisioning only.
    async fn find_neighbors(
        &mut self,
        same_ou_base: &str,
        parent_ou_base: Option<&str>,
        exclude_username: &str,
        size_limit: i32,
    ) -> Vec<DirectoryEntry>;

    /// Release the session (unbind). Idempotent.
    async fn close(&mut self);
}

/// Local identity store contract.
///
/// Implementations must provide atomic get-or-create semantics per
/// username; concurrent first-time logins for the same user must converge
/// on a single record.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up an identity by its unique username.
    async fn get_by_username(&self, username: &str) -> DirectoryAuthResult<Option<Identity>>;

    /// Create an identity, or return the existing record when one was
    /// created concurrently for the same username.
    async fn create(&self, identity: Identity) -> DirectoryAuthResult<Identity>;

    /// Persist an updated identity. `changed_fields` names the fields that
    /// actually changed, for stores that issue targeted updates.
    async fn update(
        &self,
        identity: &Identity,
        changed_fields: &[&'static str],
    ) -> DirectoryAuthResult<()>;

    /// List identities whose org-unit code equals `org_unit_code`.
    async fn list_by_org_unit(&self, org_unit_code: &str) -> DirectoryAuthResult<Vec<Identity>>;
}
