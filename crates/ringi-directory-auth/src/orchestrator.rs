//! Authentication flow orchestration.
//!
//! [`DirectoryAuthenticator`] drives the full negotiation: local-first
//! short-circuit for locally-sourced accounts, candidate generation, the
//! per-candidate bind loop with structured attempt capture, identity
//! provisioning on success, and end-of-flow diagnostic classification on
//! failure. One `authenticate` call serves one sign-in; all directory
//! connections opened for it are released before it returns.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::candidates::generate_candidates;
use crate::config::DirectoryConfig;
use crate::entry::DirectoryEntry;
use crate::error::{BindAttempt, DiagnosticCategory, DirectoryAuthResult};
use crate::provision::{ensure_identity, provision_neighbors};
use crate::store::{Identity, IdentitySource};
use crate::traits::{DirectoryBind, DirectorySession, IdentityStore};

/// A potential approver for a requester, resolved from provisioned
/// identities without touching the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApproverCandidate {
    pub username: String,
    pub display_name: String,
    pub email: String,
    /// Org unit the candidate was matched in.
    pub org_unit: String,
}

/// Drives authentication against the directory and the local store.
pub struct DirectoryAuthenticator {
    directory: Arc<dyn DirectoryBind>,
    store: Arc<dyn IdentityStore>,
}

impl DirectoryAuthenticator {
    /// Create an orchestrator over a directory connector and an identity
    /// store.
    pub fn new(directory: Arc<dyn DirectoryBind>, store: Arc<dyn IdentityStore>) -> Self {
        Self { directory, store }
    }

    /// Authenticate `username` with `password`.
    ///
    /// Returns the provisioned identity on success, or the single
    /// user-facing [`DiagnosticCategory`] describing why sign-in failed.
    /// Locally-sourced accounts are verified against their stored hash and
    /// never fall back to the directory; everyone else goes through the
    /// bind-candidate loop.
    #[instrument(skip(self, config, password))]
    pub async fn authenticate(
        &self,
        config: &DirectoryConfig,
        username: &str,
        password: &str,
    ) -> Result<Identity, DiagnosticCategory> {
        if username.is_empty() || password.is_empty() {
            debug!("empty username or password rejected before any attempt");
            return Err(DiagnosticCategory::InvalidCredentials);
        }

        let existing = match self.store.get_by_username(username).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(error = %e, "identity store lookup failed");
                return Err(DiagnosticCategory::Unclassified);
            }
        };

        if let Some(identity) = existing {
            if identity.source == IdentitySource::Local {
                return self.authenticate_local(config, identity, password);
            }
        }

        self.authenticate_directory(config, username, password).await
    }

    /// Verify a locally-sourced account against its stored hash. The
    /// outcome is final either way: a local account never falls back to a
    /// directory bind.
    fn authenticate_local(
        &self,
        config: &DirectoryConfig,
        identity: Identity,
        password: &str,
    ) -> Result<Identity, DiagnosticCategory> {
        let prefixes = &config.local_first_prefixes;
        if !prefixes.is_empty()
            && !prefixes.iter().any(|p| identity.username.starts_with(p.as_str()))
        {
            debug!(
                username = %identity.username,
                "local account outside the allow-list denied"
            );
            return Err(DiagnosticCategory::InvalidCredentials);
        }

        let Some(hash) = identity.password_hash.as_deref() else {
            debug!(username = %identity.username, "local account has no usable password");
            return Err(DiagnosticCategory::InvalidCredentials);
        };

        match ringi_auth::verify_password(password, hash) {
            Ok(true) => {
                info!(username = %identity.username, "local password verified");
                Ok(identity)
            }
            Ok(false) => {
                debug!(username = %identity.username, "local password mismatch");
                Err(DiagnosticCategory::InvalidCredentials)
            }
            Err(e) => {
                warn!(username = %identity.username, error = %e, "stored hash unusable");
                Err(DiagnosticCategory::Unclassified)
            }
        }
    }

    /// Run the bind-candidate loop and provision the identity on success.
    async fn authenticate_directory(
        &self,
        config: &DirectoryConfig,
        username: &str,
        password: &str,
    ) -> Result<Identity, DiagnosticCategory> {
        let candidates = generate_candidates(username, config);
        if candidates.is_empty() {
            warn!(
                username,
                "no bind candidates; set a domain or UPN suffix, or sign in \
                 as DOMAIN\\user or user@suffix"
            );
            return Err(DiagnosticCategory::ConfigurationIncomplete);
        }

        let mut attempts: Vec<BindAttempt> = Vec::new();

        for candidate in &candidates {
            let mut session = match self.directory.connect(config, candidate, password).await {
                Ok(session) => session,
                Err(attempt) => {
                    attempts.push(attempt);
                    continue;
                }
            };

            match session.find_user(username, &config.search_base).await {
                Ok(Some(entry)) => {
                    let result = self
                        .provision_and_finish(config, username, &entry, session.as_mut())
                        .await;
                    session.close().await;
                    return result;
                }
                Ok(None) => {
                    // The bind was accepted, so the credentials are good;
                    // trying further candidates cannot make the account
                    // appear.
                    session.close().await;
                    info!(
                        username,
                        candidate = candidate.label,
                        "bind accepted but account absent from directory"
                    );
                    return Err(DiagnosticCategory::AccountNotProvisioned);
                }
                Err(attempt) => {
                    session.close().await;
                    attempts.push(attempt);
                }
            }
        }

        for attempt in &attempts {
            warn!(
                username,
                candidate = %attempt.candidate_label,
                stage = attempt.stage.as_str(),
                result_code = attempt.result_code,
                error = %attempt.error,
                "bind candidate failed"
            );
        }

        let category = DiagnosticCategory::classify(&attempts);
        info!(
            username,
            attempts = attempts.len(),
            category = category.as_str(),
            "authentication failed after exhausting candidates"
        );
        Err(category)
    }

    async fn provision_and_finish(
        &self,
        config: &DirectoryConfig,
        username: &str,
        entry: &DirectoryEntry,
        session: &mut dyn DirectorySession,
    ) -> Result<Identity, DiagnosticCategory> {
        let identity = match ensure_identity(self.store.as_ref(), username, entry, config).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(username, error = %e, "identity provisioning failed");
                return Err(DiagnosticCategory::Unclassified);
            }
        };

        // Best effort; a neighbor failure never fails the sign-in.
        provision_neighbors(self.store.as_ref(), session, entry, config, username).await;

        info!(
            username,
            org_unit = %identity.org_unit_code,
            "directory authentication succeeded"
        );
        Ok(identity)
    }

    /// Resolve approver candidates for `requester` from already-provisioned
    /// identities: members of the requester's own org unit first, then the
    /// parent org unit, deduplicated, with the requester excluded. Never
    /// touches the directory.
    pub async fn find_approver_candidates(
        &self,
        requester: &Identity,
    ) -> DirectoryAuthResult<Vec<ApproverCandidate>> {
        let mut seen: Vec<String> = vec![requester.username.clone()];
        let mut candidates: Vec<ApproverCandidate> = Vec::new();

        for code in [&requester.org_unit_code, &requester.parent_org_unit_code] {
            if code.is_empty() {
                continue;
            }
            for identity in self.store.list_by_org_unit(code).await? {
                if seen.iter().any(|u| u.eq_ignore_ascii_case(&identity.username)) {
                    continue;
                }
                seen.push(identity.username.clone());
                candidates.push(ApproverCandidate {
                    display_name: display_name_for(&identity),
                    email: identity.email,
                    org_unit: identity.org_unit_code,
                    username: identity.username,
                });
            }
        }

        Ok(candidates)
    }
}

fn display_name_for(identity: &Identity) -> String {
    let full = format!("{} {}", identity.given_name, identity.surname);
    let full = full.trim();
    if full.is_empty() {
        identity.username.clone()
    } else {
        full.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::BindCandidate;
    use crate::error::AttemptStage;
    use crate::store::MemoryIdentityStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted stand-in for the LDAP connector; every `connect` consumes
    /// the next outcome and counts invocations.
    enum ConnectOutcome {
        Fail(BindAttempt),
        Session {
            user: Option<DirectoryEntry>,
            neighbors: Vec<DirectoryEntry>,
        },
    }

    #[derive(Default)]
    struct SpyDirectory {
        connects: AtomicUsize,
        closes: Arc<AtomicUsize>,
        script: Mutex<VecDeque<ConnectOutcome>>,
    }

    impl SpyDirectory {
        fn scripted(outcomes: Vec<ConnectOutcome>) -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                closes: Arc::new(AtomicUsize::new(0)),
                script: Mutex::new(outcomes.into()),
            })
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DirectoryBind for SpyDirectory {
        async fn connect(
            &self,
            _config: &DirectoryConfig,
            candidate: &BindCandidate,
            _password: &str,
        ) -> Result<Box<dyn DirectorySession>, BindAttempt> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ConnectOutcome::Fail(BindAttempt::new(
                    candidate.label,
                    AttemptStage::Connect,
                    "script exhausted",
                )));
            match outcome {
                ConnectOutcome::Fail(mut attempt) => {
                    attempt.candidate_label = candidate.label.to_string();
                    Err(attempt)
                }
                ConnectOutcome::Session { user, neighbors } => Ok(Box::new(SpySession {
                    user,
                    neighbors,
                    closes: Arc::clone(&self.closes),
                })),
            }
        }
    }

    struct SpySession {
        user: Option<DirectoryEntry>,
        neighbors: Vec<DirectoryEntry>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DirectorySession for SpySession {
        async fn find_user(
            &mut self,
            _username: &str,
            _search_base: &str,
        ) -> Result<Option<DirectoryEntry>, BindAttempt> {
            Ok(self.user.clone())
        }

        async fn find_neighbors(
            &mut self,
            _same_ou_base: &str,
            _parent_ou_base: Option<&str>,
            exclude_username: &str,
            _size_limit: i32,
        ) -> Vec<DirectoryEntry> {
            self.neighbors
                .iter()
                .filter(|n| !n.sam_account_name.eq_ignore_ascii_case(exclude_username))
                .cloned()
                .collect()
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn entry(username: &str, dn: &str) -> DirectoryEntry {
        DirectoryEntry {
            sam_account_name: username.to_string(),
            distinguished_name: dn.to_string(),
            mail: format!("{username}@example.com"),
            ..Default::default()
        }
    }

    fn config() -> DirectoryConfig {
        DirectoryConfig::new("ldap://dc01.example.com", "DC=example,DC=com")
            .with_domain("EXAMPLE")
    }

    fn rejected(rc: u32) -> ConnectOutcome {
        ConnectOutcome::Fail(
            BindAttempt::new("", AttemptStage::Bind, "bind rejected")
                .with_result(rc, "bind rejected"),
        )
    }

    #[tokio::test]
    async fn test_empty_credentials_rejected_without_any_attempt() {
        let directory = SpyDirectory::scripted(vec![]);
        let auth = DirectoryAuthenticator::new(
            Arc::clone(&directory) as Arc<dyn DirectoryBind>,
            Arc::new(MemoryIdentityStore::new()),
        );

        let err = auth.authenticate(&config(), "", "pw").await.unwrap_err();
        assert_eq!(err, DiagnosticCategory::InvalidCredentials);
        let err = auth.authenticate(&config(), "alice", "").await.unwrap_err();
        assert_eq!(err, DiagnosticCategory::InvalidCredentials);
        assert_eq!(directory.connects(), 0);
    }

    #[tokio::test]
    async fn test_no_candidates_is_configuration_incomplete_with_zero_network() {
        let directory = SpyDirectory::scripted(vec![]);
        let auth = DirectoryAuthenticator::new(
            Arc::clone(&directory) as Arc<dyn DirectoryBind>,
            Arc::new(MemoryIdentityStore::new()),
        );
        let bare = DirectoryConfig::new("ldap://dc01", "DC=example,DC=com");

        let err = auth.authenticate(&bare, "alice", "pw").await.unwrap_err();
        assert_eq!(err, DiagnosticCategory::ConfigurationIncomplete);
        assert_eq!(directory.connects(), 0);
    }

    #[tokio::test]
    async fn test_successful_authentication_provisions_identity() {
        let directory = SpyDirectory::scripted(vec![ConnectOutcome::Session {
            user: Some(entry("alice", "CN=Alice,OU=Dept1,OU=Div,DC=example,DC=com")),
            neighbors: vec![
                entry("bob", "CN=Bob,OU=Dept1,OU=Div,DC=example,DC=com"),
                entry("ALICE", "CN=Alice,OU=Dept1,OU=Div,DC=example,DC=com"),
            ],
        }]);
        let store = Arc::new(MemoryIdentityStore::new());
        let auth = DirectoryAuthenticator::new(
            Arc::clone(&directory) as Arc<dyn DirectoryBind>,
            Arc::clone(&store) as Arc<dyn IdentityStore>,
        );

        let identity = auth.authenticate(&config(), "alice", "pw").await.unwrap();
        assert_eq!(identity.source, IdentitySource::Directory);
        assert_eq!(identity.org_unit_code, "Dept1");
        assert_eq!(identity.parent_org_unit_code, "Div");
        assert_eq!(directory.connects(), 1);
        assert_eq!(directory.closes(), 1);

        // The neighbor was provisioned; the requester was not duplicated.
        let bob = store.get_by_username("bob").await.unwrap().unwrap();
        assert_eq!(bob.org_unit_code, "Dept1");
    }

    #[tokio::test]
    async fn test_absent_account_short_circuits_remaining_candidates() {
        // Two candidates exist (NTLM(domain) + UPN(constructed)), but the
        // first bind already proves the credentials; the loop must stop.
        let directory = SpyDirectory::scripted(vec![ConnectOutcome::Session {
            user: None,
            neighbors: vec![],
        }]);
        let auth = DirectoryAuthenticator::new(
            Arc::clone(&directory) as Arc<dyn DirectoryBind>,
            Arc::new(MemoryIdentityStore::new()),
        );
        let mut cfg = config();
        cfg.upn_suffix = Some("example.com".to_string());

        let err = auth.authenticate(&cfg, "alice", "pw").await.unwrap_err();
        assert_eq!(err, DiagnosticCategory::AccountNotProvisioned);
        assert_eq!(directory.connects(), 1);
        assert_eq!(directory.closes(), 1);
    }

    #[tokio::test]
    async fn test_later_candidate_succeeds_after_rejections() {
        let directory = SpyDirectory::scripted(vec![
            rejected(49),
            ConnectOutcome::Session {
                user: Some(entry("alice", "CN=Alice,OU=Dept1,DC=example,DC=com")),
                neighbors: vec![],
            },
        ]);
        let auth = DirectoryAuthenticator::new(
            Arc::clone(&directory) as Arc<dyn DirectoryBind>,
            Arc::new(MemoryIdentityStore::new()),
        );
        let mut cfg = config();
        cfg.upn_suffix = Some("example.com".to_string());

        let identity = auth.authenticate(&cfg, "alice", "pw").await.unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(directory.connects(), 2);
    }

    #[tokio::test]
    async fn test_all_candidates_rejected_is_invalid_credentials() {
        let directory = SpyDirectory::scripted(vec![rejected(49), rejected(49)]);
        let auth = DirectoryAuthenticator::new(
            Arc::clone(&directory) as Arc<dyn DirectoryBind>,
            Arc::new(MemoryIdentityStore::new()),
        );
        let mut cfg = config();
        cfg.upn_suffix = Some("example.com".to_string());

        let err = auth.authenticate(&cfg, "alice", "wrong").await.unwrap_err();
        assert_eq!(err, DiagnosticCategory::InvalidCredentials);
        assert_eq!(directory.connects(), 2);
    }

    #[tokio::test]
    async fn test_network_failures_classified_without_credential_blame() {
        let directory = SpyDirectory::scripted(vec![
            ConnectOutcome::Fail(BindAttempt::new(
                "",
                AttemptStage::Connect,
                "connection refused",
            )),
            ConnectOutcome::Fail(BindAttempt::new(
                "",
                AttemptStage::Connect,
                "operation timed out",
            )),
        ]);
        let auth = DirectoryAuthenticator::new(
            Arc::clone(&directory) as Arc<dyn DirectoryBind>,
            Arc::new(MemoryIdentityStore::new()),
        );
        let mut cfg = config();
        cfg.upn_suffix = Some("example.com".to_string());

        let err = auth.authenticate(&cfg, "alice", "pw").await.unwrap_err();
        assert_eq!(err, DiagnosticCategory::NetworkUnreachable);
    }

    #[tokio::test]
    async fn test_local_account_verified_without_directory() {
        let hash = ringi_auth::hash_password("s3cret!").unwrap();
        let store = Arc::new(MemoryIdentityStore::new());
        store.insert(Identity::new_local("svc-admin", hash)).await;

        let directory = SpyDirectory::scripted(vec![]);
        let auth = DirectoryAuthenticator::new(
            Arc::clone(&directory) as Arc<dyn DirectoryBind>,
            Arc::clone(&store) as Arc<dyn IdentityStore>,
        );
        let cfg = config().with_local_first_prefixes(vec!["svc-".to_string()]);

        let identity = auth.authenticate(&cfg, "svc-admin", "s3cret!").await.unwrap();
        assert_eq!(identity.source, IdentitySource::Local);
        assert_eq!(directory.connects(), 0);

        let err = auth
            .authenticate(&cfg, "svc-admin", "wrong")
            .await
            .unwrap_err();
        assert_eq!(err, DiagnosticCategory::InvalidCredentials);
        assert_eq!(directory.connects(), 0);
    }

    #[tokio::test]
    async fn test_local_account_outside_allow_list_denied_without_fallback() {
        let hash = ringi_auth::hash_password("s3cret!").unwrap();
        let store = Arc::new(MemoryIdentityStore::new());
        store.insert(Identity::new_local("bob", hash)).await;

        let directory = SpyDirectory::scripted(vec![]);
        let auth = DirectoryAuthenticator::new(
            Arc::clone(&directory) as Arc<dyn DirectoryBind>,
            Arc::clone(&store) as Arc<dyn IdentityStore>,
        );
        let cfg = config().with_local_first_prefixes(vec!["svc-".to_string()]);

        let err = auth.authenticate(&cfg, "bob", "s3cret!").await.unwrap_err();
        assert_eq!(err, DiagnosticCategory::InvalidCredentials);
        assert_eq!(directory.connects(), 0);
    }

    #[tokio::test]
    async fn test_directory_sourced_account_skips_local_verification() {
        let store = Arc::new(MemoryIdentityStore::new());
        store.insert(Identity::new_directory("alice")).await;

        let directory = SpyDirectory::scripted(vec![ConnectOutcome::Session {
            user: Some(entry("alice", "CN=Alice,OU=Dept1,DC=example,DC=com")),
            neighbors: vec![],
        }]);
        let auth = DirectoryAuthenticator::new(
            Arc::clone(&directory) as Arc<dyn DirectoryBind>,
            Arc::clone(&store) as Arc<dyn IdentityStore>,
        );

        let identity = auth.authenticate(&config(), "alice", "pw").await.unwrap();
        assert_eq!(identity.source, IdentitySource::Directory);
        assert_eq!(directory.connects(), 1);
    }

    #[tokio::test]
    async fn test_approver_candidates_same_then_parent_excluding_requester() {
        let store = Arc::new(MemoryIdentityStore::new());
        for (name, ou) in [
            ("alice", "Dept1"),
            ("bob", "Dept1"),
            ("carol", "Div"),
            ("dave", "Sales"),
        ] {
            let mut identity = Identity::new_directory(name);
            identity.org_unit_code = ou.to_string();
            identity.given_name = name.to_string();
            identity.surname = "Example".to_string();
            store.insert(identity).await;
        }

        let directory = SpyDirectory::scripted(vec![]);
        let auth = DirectoryAuthenticator::new(
            Arc::clone(&directory) as Arc<dyn DirectoryBind>,
            Arc::clone(&store) as Arc<dyn IdentityStore>,
        );

        let mut requester = Identity::new_directory("alice");
        requester.org_unit_code = "Dept1".to_string();
        requester.parent_org_unit_code = "Div".to_string();

        let approvers = auth.find_approver_candidates(&requester).await.unwrap();
        let names: Vec<&str> = approvers.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol"]);
        assert_eq!(approvers[0].display_name, "bob Example");
        assert_eq!(directory.connects(), 0);
    }

    #[tokio::test]
    async fn test_approver_candidates_empty_org_units() {
        let store = Arc::new(MemoryIdentityStore::new());
        let directory = SpyDirectory::scripted(vec![]);
        let auth = DirectoryAuthenticator::new(
            Arc::clone(&directory) as Arc<dyn DirectoryBind>,
            Arc::clone(&store) as Arc<dyn IdentityStore>,
        );

        let requester = Identity::new_directory("alice");
        let approvers = auth.find_approver_candidates(&requester).await.unwrap();
        assert!(approvers.is_empty());
    }
}
