//! Directory connection configuration.
//!
//! An immutable snapshot of directory-connection policy, loaded once per
//! authentication call (or cached by the caller with explicit invalidation).
//! There is no hidden global: every orchestrator call receives an explicit
//! `DirectoryConfig` value.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DirectoryAuthError, DirectoryAuthResult};

/// Configuration for directory (LDAP/Active Directory) authentication.
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory server URL (e.g., "ldap://dc01.example.com:389").
    /// A bare hostname is accepted; the port then defaults by TLS mode.
    pub server_url: String,

    /// Base DN for user searches (e.g., "DC=example,DC=com").
    pub search_base: String,

    /// NetBIOS or DNS domain used to construct `DOMAIN\user` bind identities.
    #[serde(default)]
    pub domain: String,

    /// Explicit UPN suffix for `user@suffix` bind identities. When absent,
    /// a dotted `domain` is reused as the suffix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upn_suffix: Option<String>,

    /// Use LDAPS from the start of the connection.
    #[serde(default)]
    pub use_ssl: bool,

    /// Always upgrade plaintext connections with StartTLS.
    #[serde(default)]
    pub force_starttls: bool,

    /// Permit a plaintext bind when neither LDAPS nor StartTLS is configured.
    #[serde(default)]
    pub allow_plaintext_fallback: bool,

    /// Skip server certificate validation (lab environments only).
    #[serde(default)]
    pub tls_insecure_skip_verify: bool,

    /// Username prefixes allowed to authenticate locally ahead of the
    /// directory. Empty means local identities are unrestricted.
    #[serde(default)]
    pub local_first_prefixes: Vec<String>,

    /// Transport establishment timeout, per candidate.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Timeout applied to each bind/search operation.
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// Result cap for each neighbor (same-OU / parent-OU) search.
    #[serde(default = "default_neighbor_size_limit")]
    pub neighbor_size_limit: i32,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_operation_timeout_secs() -> u64 {
    10
}

fn default_neighbor_size_limit() -> i32 {
    50
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("server_url", &self.server_url)
            .field("search_base", &self.search_base)
            .field("domain", &self.domain)
            .field("upn_suffix", &self.upn_suffix)
            .field("use_ssl", &self.use_ssl)
            .field("force_starttls", &self.force_starttls)
            .field("allow_plaintext_fallback", &self.allow_plaintext_fallback)
            .field("tls_insecure_skip_verify", &self.tls_insecure_skip_verify)
            .field("local_first_prefixes", &self.local_first_prefixes)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("operation_timeout_secs", &self.operation_timeout_secs)
            .field("neighbor_size_limit", &self.neighbor_size_limit)
            .finish()
    }
}

impl DirectoryConfig {
    /// Create a config with required fields and secure defaults.
    pub fn new(server_url: impl Into<String>, search_base: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            search_base: search_base.into(),
            domain: String::new(),
            upn_suffix: None,
            use_ssl: false,
            force_starttls: false,
            allow_plaintext_fallback: false,
            tls_insecure_skip_verify: false,
            local_first_prefixes: Vec::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            neighbor_size_limit: default_neighbor_size_limit(),
        }
    }

    /// Set the bind domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the UPN suffix.
    #[must_use]
    pub fn with_upn_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.upn_suffix = Some(suffix.into());
        self
    }

    /// Enable LDAPS.
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self
    }

    /// Set the local-first username prefix allow-list.
    #[must_use]
    pub fn with_local_first_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.local_first_prefixes = prefixes;
        self
    }

    /// Whether a plaintext connection must be upgraded with StartTLS.
    ///
    /// Derived at runtime, never stored: StartTLS is forced when explicitly
    /// configured, and also when no encryption is configured at all and the
    /// plaintext fallback has not been opted into.
    #[must_use]
    pub fn requires_starttls(&self) -> bool {
        if self.use_ssl {
            return false;
        }
        self.force_starttls || !self.allow_plaintext_fallback
    }

    /// Resolve (host, port) from `server_url`. An explicit port wins;
    /// otherwise 636 for LDAPS, 389 for plain LDAP.
    #[must_use]
    pub fn host_port(&self) -> (String, u16) {
        let default_port = if self.use_ssl { 636 } else { 389 };

        let parsed = Url::parse(&self.server_url)
            .or_else(|_| Url::parse(&format!("ldap://{}", self.server_url)));
        if let Ok(url) = parsed {
            if let Some(host) = url.host_str() {
                return (host.to_string(), url.port().unwrap_or(default_port));
            }
        }

        (self.server_url.clone(), default_port)
    }

    /// Validate required fields.
    pub fn validate(&self) -> DirectoryAuthResult<()> {
        if self.server_url.is_empty() {
            return Err(DirectoryAuthError::InvalidConfiguration {
                message: "server_url is required".to_string(),
            });
        }
        if self.search_base.is_empty() {
            return Err(DirectoryAuthError::InvalidConfiguration {
                message: "search_base is required".to_string(),
            });
        }
        if self.use_ssl && self.force_starttls {
            return Err(DirectoryAuthError::InvalidConfiguration {
                message: "cannot use both SSL and STARTTLS".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_port_with_scheme_and_port() {
        let config = DirectoryConfig::new("ldap://dc01.example.com:3268", "DC=example,DC=com");
        assert_eq!(config.host_port(), ("dc01.example.com".to_string(), 3268));
    }

    #[test]
    fn test_host_port_defaults_by_tls_mode() {
        let plain = DirectoryConfig::new("ldap://dc01.example.com", "DC=example,DC=com");
        assert_eq!(plain.host_port(), ("dc01.example.com".to_string(), 389));

        let ldaps = DirectoryConfig::new("ldaps://dc01.example.com", "DC=example,DC=com").with_ssl();
        assert_eq!(ldaps.host_port(), ("dc01.example.com".to_string(), 636));
    }

    #[test]
    fn test_host_port_bare_hostname() {
        let config = DirectoryConfig::new("dc01.example.com", "DC=example,DC=com");
        assert_eq!(config.host_port(), ("dc01.example.com".to_string(), 389));
    }

    #[test]
    fn test_starttls_forced_by_default() {
        // No SSL, no explicit StartTLS, no plaintext opt-in: secure by default.
        let config = DirectoryConfig::new("ldap://dc01", "DC=example,DC=com");
        assert!(config.requires_starttls());
    }

    #[test]
    fn test_starttls_not_required_with_plaintext_opt_in() {
        let mut config = DirectoryConfig::new("ldap://dc01", "DC=example,DC=com");
        config.allow_plaintext_fallback = true;
        assert!(!config.requires_starttls());

        config.force_starttls = true;
        assert!(config.requires_starttls());
    }

    #[test]
    fn test_starttls_never_required_under_ssl() {
        let config = DirectoryConfig::new("ldaps://dc01", "DC=example,DC=com").with_ssl();
        assert!(!config.requires_starttls());
    }

    #[test]
    fn test_validate_rejects_ssl_plus_starttls() {
        let mut config = DirectoryConfig::new("ldaps://dc01", "DC=example,DC=com").with_ssl();
        config.force_starttls = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_server_and_base() {
        assert!(DirectoryConfig::new("", "DC=example,DC=com").validate().is_err());
        assert!(DirectoryConfig::new("ldap://dc01", "").validate().is_err());
        assert!(DirectoryConfig::new("ldap://dc01", "DC=example,DC=com")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_deserialization_defaults() {
        let config: DirectoryConfig = serde_json::from_str(
            r#"{"server_url": "ldap://dc01", "search_base": "DC=example,DC=com"}"#,
        )
        .unwrap();
        assert_eq!(config.domain, "");
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.neighbor_size_limit, 50);
        assert!(!config.use_ssl);
        assert!(config.local_first_prefixes.is_empty());
    }

    #[test]
    fn test_debug_lists_policy_fields() {
        let config = DirectoryConfig::new("ldap://dc01", "DC=example,DC=com").with_domain("CORP");
        let debug = format!("{config:?}");
        assert!(debug.contains("CORP"));
        assert!(debug.contains("tls_insecure_skip_verify"));
    }
}
