//! Directory connection attempts over ldap3.
//!
//! One [`LdapDirectory::connect`] call wraps one physical attempt:
//! transport establishment, optional StartTLS upgrade, and the bind. Any
//! failure is captured into a structured [`BindAttempt`] for the
//! orchestrator's candidate loop; nothing here panics or propagates raw
//! client errors upward.

use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions, SearchResult};
use tracing::{debug, info, instrument, warn};

use crate::candidates::BindCandidate;
use crate::config::DirectoryConfig;
use crate::entry::{DirectoryEntry, USER_ATTRIBUTES};
use crate::error::{AttemptStage, BindAttempt};
use crate::traits::{DirectoryBind, DirectorySession};

/// Filter for neighbor enumeration: user objects only, no machine accounts.
const NEIGHBOR_FILTER: &str = "(&(objectClass=user)(!(objectClass=computer))(sAMAccountName=*))";

/// LDAP result code for a size-limit-exceeded search that still carries
/// partial entries.
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;

/// Production [`DirectoryBind`] implementation over ldap3.
#[derive(Debug, Default, Clone, Copy)]
pub struct LdapDirectory;

impl LdapDirectory {
    /// Create the connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Escape special characters in LDAP filter values (RFC 4515).
fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Search filter resolving a user by account name.
fn user_filter(username: &str) -> String {
    format!("(sAMAccountName={})", escape_filter_value(username))
}

/// Attribute the failure of a combined connect/StartTLS establishment to
/// the right stage. ldap3 performs the in-band upgrade during connection
/// setup, so a TLS-flavored error under a requested upgrade is a StartTLS
/// failure, not a transport one.
fn establishment_stage(starttls_requested: bool, error: &str) -> AttemptStage {
    if !starttls_requested {
        return AttemptStage::Connect;
    }
    let lower = error.to_lowercase();
    let tls_flavored = ["starttls", "tls", "certificate", "handshake"]
        .iter()
        .any(|k| lower.contains(k));
    if tls_flavored {
        AttemptStage::StartTls
    } else {
        AttemptStage::Connect
    }
}

#[async_trait]
impl DirectoryBind for LdapDirectory {
    #[instrument(
        skip(self, config, candidate, password),
        fields(candidate = candidate.label, mechanism = ?candidate.mechanism)
    )]
    async fn connect(
        &self,
        config: &DirectoryConfig,
        candidate: &BindCandidate,
        password: &str,
    ) -> Result<Box<dyn DirectorySession>, BindAttempt> {
        let (host, port) = config.host_port();
        let scheme = if config.use_ssl { "ldaps" } else { "ldap" };
        let url = format!("{scheme}://{host}:{port}");
        let starttls = config.requires_starttls();

        debug!(url = %url, starttls, "connecting to directory");

        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(config.connect_timeout_secs))
            .set_starttls(starttls);
        if config.tls_insecure_skip_verify {
            settings = settings.set_no_tls_verify(true);
        }

        // ldap3 performs the StartTLS upgrade during connection setup; a
        // failure here is terminal for the candidate, with no plaintext
        // fallback.
        let (conn, mut ldap) = match LdapConnAsync::with_settings(settings, &url).await {
            Ok(pair) => pair,
            Err(e) => {
                let error = e.to_string();
                let stage = establishment_stage(starttls, &error);
                warn!(
                    host = %host,
                    candidate = candidate.label,
                    stage = stage.as_str(),
                    error = %error,
                    "directory connection failed"
                );
                return Err(BindAttempt::new(candidate.label, stage, error));
            }
        };

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "directory connection driver error");
            }
        });

        // AD domain controllers accept NT4-style `DOMAIN\user` names on a
        // simple bind; ldap3 carries no NTLM SASL mechanism, so both
        // candidate forms bind simply with their respective identity
        // strings.
        let mechanism = candidate.mechanism;
        let bind = ldap
            .with_timeout(Duration::from_secs(config.operation_timeout_secs))
            .simple_bind(&candidate.bind_identity, password)
            .await;

        let result = match bind {
            Ok(result) => result,
            Err(e) => {
                let error = e.to_string();
                warn!(
                    host = %host,
                    candidate = candidate.label,
                    mechanism = ?mechanism,
                    stage = "bind",
                    error = %error,
                    "directory bind errored"
                );
                let _ = ldap.unbind().await;
                return Err(BindAttempt::new(candidate.label, AttemptStage::Bind, error));
            }
        };

        if result.rc != 0 {
            warn!(
                host = %host,
                candidate = candidate.label,
                mechanism = ?mechanism,
                stage = "bind",
                result_code = result.rc,
                "directory bind rejected"
            );
            let attempt = BindAttempt::new(candidate.label, AttemptStage::Bind, "bind rejected")
                .with_result(result.rc, result.text);
            let _ = ldap.unbind().await;
            return Err(attempt);
        }

        info!(host = %host, candidate = candidate.label, "directory bind established");

        Ok(Box::new(LdapSession {
            ldap,
            host,
            candidate_label: candidate.label,
            operation_timeout: Duration::from_secs(config.operation_timeout_secs),
            closed: false,
        }))
    }
}

/// A bound ldap3 session.
struct LdapSession {
    ldap: Ldap,
    host: String,
    candidate_label: &'static str,
    operation_timeout: Duration,
    closed: bool,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn find_user(
        &mut self,
        username: &str,
        search_base: &str,
    ) -> Result<Option<DirectoryEntry>, BindAttempt> {
        let filter = user_filter(username);
        debug!(host = %self.host, filter = %filter, base = %search_base, "searching for user");

        let search = self
            .ldap
            .with_timeout(self.operation_timeout)
            .search(
                search_base,
                Scope::Subtree,
                &filter,
                USER_ATTRIBUTES.to_vec(),
            )
            .await;

        let SearchResult(entries, result) = match search {
            Ok(r) => r,
            Err(e) => {
                let error = e.to_string();
                warn!(
                    host = %self.host,
                    candidate = self.candidate_label,
                    stage = "search",
                    error = %error,
                    "user search errored"
                );
                return Err(BindAttempt::new(
                    self.candidate_label,
                    AttemptStage::Search,
                    error,
                ));
            }
        };

        if result.rc != 0 {
            warn!(
                host = %self.host,
                candidate = self.candidate_label,
                stage = "search",
                result_code = result.rc,
                "user search rejected"
            );
            return Err(
                BindAttempt::new(self.candidate_label, AttemptStage::Search, "search rejected")
                    .with_result(result.rc, result.text),
            );
        }

        let Some(first) = entries.into_iter().next() else {
            warn!(
                host = %self.host,
                candidate = self.candidate_label,
                base = %search_base,
                "user search returned no entries"
            );
            return Ok(None);
        };

        let entry = DirectoryEntry::from_search_entry(&SearchEntry::construct(first));
        Ok(Some(entry))
    }

    async fn find_neighbors(
        &mut self,
        same_ou_base: &str,
        parent_ou_base: Option<&str>,
        exclude_username: &str,
        size_limit: i32,
    ) -> Vec<DirectoryEntry> {
        let mut scopes: Vec<(&str, &str, Scope)> = vec![("same", same_ou_base, Scope::Subtree)];
        if let Some(parent) = parent_ou_base {
            scopes.push(("parent", parent, Scope::OneLevel));
        }

        let mut neighbors: Vec<DirectoryEntry> = Vec::new();
        for (kind, base, scope) in scopes {
            let search = self
                .ldap
                .with_search_options(SearchOptions::new().sizelimit(size_limit))
                .with_timeout(self.operation_timeout)
                .search(base, scope, NEIGHBOR_FILTER, USER_ATTRIBUTES.to_vec())
                .await;

            let SearchResult(entries, result) = match search {
                Ok(r) => r,
                Err(e) => {
                    debug!(
                        host = %self.host,
                        kind,
                        base = %base,
                        error = %e,
                        "neighbor search skipped"
                    );
                    continue;
                }
            };

            // A size-limit overrun still carries the partial page.
            if result.rc != 0 && result.rc != RC_SIZE_LIMIT_EXCEEDED {
                debug!(
                    host = %self.host,
                    kind,
                    base = %base,
                    result_code = result.rc,
                    "neighbor search skipped"
                );
                continue;
            }

            for raw in entries {
                let entry = DirectoryEntry::from_search_entry(&SearchEntry::construct(raw));
                if entry.sam_account_name.is_empty()
                    || entry
                        .sam_account_name
                        .eq_ignore_ascii_case(exclude_username)
                {
                    continue;
                }
                if neighbors
                    .iter()
                    .any(|n| n.sam_account_name == entry.sam_account_name)
                {
                    continue;
                }
                neighbors.push(entry);
            }
        }

        neighbors
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.ldap.unbind().await {
            debug!(host = %self.host, error = %e, "error during unbind");
        }
    }
}
