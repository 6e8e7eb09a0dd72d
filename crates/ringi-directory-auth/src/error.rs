//! Error types and the user-facing diagnostic taxonomy.
//!
//! Directory/network failures are captured at the connector boundary as
//! [`BindAttempt`] records and never propagate as faults past the
//! orchestrator, which classifies the accumulated attempts into a single
//! [`DiagnosticCategory`]. Raw error strings are logged server-side only;
//! the user sees the generic category text.

use thiserror::Error;

/// Internal error for configuration and identity-store faults.
#[derive(Debug, Error)]
pub enum DirectoryAuthError {
    /// Directory configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Identity store operation failed.
    #[error("identity store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DirectoryAuthError {
    /// Create an identity store error.
    pub fn store(message: impl Into<String>) -> Self {
        DirectoryAuthError::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Create an identity store error with source.
    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryAuthError::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for directory authentication internals.
pub type DirectoryAuthResult<T> = Result<T, DirectoryAuthError>;

/// The stage at which a single candidate attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStage {
    /// Transport establishment (TCP/TLS).
    Connect,
    /// In-band StartTLS upgrade.
    StartTls,
    /// The bind itself was rejected.
    Bind,
    /// The post-bind user search failed to execute.
    Search,
}

impl AttemptStage {
    /// Stable name for structured log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStage::Connect => "connect",
            AttemptStage::StartTls => "starttls",
            AttemptStage::Bind => "bind",
            AttemptStage::Search => "search",
        }
    }
}

impl std::fmt::Display for AttemptStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured outcome of one failed bind-candidate attempt.
///
/// Accumulated across all candidates for end-of-flow classification.
#[derive(Debug, Clone)]
pub struct BindAttempt {
    /// Label of the candidate that was tried (e.g., "NTLM(domain)").
    pub candidate_label: String,
    /// Stage at which the attempt failed.
    pub stage: AttemptStage,
    /// Raw error string from the directory client. Logged, never shown.
    pub error: String,
    /// LDAP result code, when the server produced one (49 = invalid
    /// credentials).
    pub result_code: Option<u32>,
    /// LDAP result diagnostic text, when present.
    pub result_text: Option<String>,
}

impl BindAttempt {
    /// Capture a failed attempt.
    pub fn new(
        candidate_label: impl Into<String>,
        stage: AttemptStage,
        error: impl Into<String>,
    ) -> Self {
        Self {
            candidate_label: candidate_label.into(),
            stage,
            error: error.into(),
            result_code: None,
            result_text: None,
        }
    }

    /// Attach the server's result code and diagnostic text.
    #[must_use]
    pub fn with_result(mut self, code: u32, text: impl Into<String>) -> Self {
        self.result_code = Some(code);
        self.result_text = Some(text.into());
        self
    }

    fn haystack(&self) -> String {
        let mut text = self.error.to_lowercase();
        if let Some(t) = &self.result_text {
            text.push(' ');
            text.push_str(&t.to_lowercase());
        }
        text
    }

    fn contains_any(&self, keywords: &[&str]) -> bool {
        let haystack = self.haystack();
        keywords.iter().any(|k| haystack.contains(k))
    }
}

/// LDAP result code for invalid credentials.
const RC_INVALID_CREDENTIALS: u32 = 49;

const NETWORK_KEYWORDS: &[&str] = &[
    "can't contact ldap server",
    "connect error",
    "connection refused",
    "connection reset",
    "timed out",
    "timeout",
    "unreachable",
    "broken pipe",
];

const DNS_KEYWORDS: &[&str] = &[
    "failed to lookup address",
    "name or service not known",
    "nodename nor servname",
    "unknown host",
    "no such host",
    "dns error",
];

const TLS_KEYWORDS: &[&str] = &["starttls", "tls", "ssl", "certificate", "handshake"];

/// User-facing diagnostic category for a failed authentication.
///
/// Each category carries a resolution path: self-resolvable by the user,
/// an operations escalation, or a maintainer escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCategory {
    /// A candidate bound and the directory rejected the credentials.
    InvalidCredentials,
    /// Bind succeeded but the account does not exist in the directory.
    AccountNotProvisioned,
    /// Connection/timeout/refused errors across all candidates.
    NetworkUnreachable,
    /// The server host name could not be resolved.
    NameResolutionFailure,
    /// StartTLS/TLS negotiation failed.
    SecureChannelFailure,
    /// No bind candidates could be generated from configuration.
    ConfigurationIncomplete,
    /// Any other failure path.
    Unclassified,
}

impl DiagnosticCategory {
    /// Stable code for structured log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCategory::InvalidCredentials => "INVALID_CREDENTIALS",
            DiagnosticCategory::AccountNotProvisioned => "ACCOUNT_NOT_PROVISIONED",
            DiagnosticCategory::NetworkUnreachable => "NETWORK_UNREACHABLE",
            DiagnosticCategory::NameResolutionFailure => "NAME_RESOLUTION_FAILURE",
            DiagnosticCategory::SecureChannelFailure => "SECURE_CHANNEL_FAILURE",
            DiagnosticCategory::ConfigurationIncomplete => "CONFIGURATION_INCOMPLETE",
            DiagnosticCategory::Unclassified => "UNCLASSIFIED",
        }
    }

    /// Generic message shown to the user. Never contains raw directory
    /// errors or topology details.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            DiagnosticCategory::InvalidCredentials => {
                "Username or password is incorrect. Check your input \
                 (Caps Lock, IME, VPN) and try again."
            }
            DiagnosticCategory::AccountNotProvisioned => {
                "The directory accepted the connection but no account was \
                 found for this user. Contact the operations desk to have \
                 the directory account added or synced."
            }
            DiagnosticCategory::NetworkUnreachable => {
                "The directory server could not be reached (network error \
                 or timeout). Check your LAN/VPN connection; if it looks \
                 fine, report a directory connectivity problem to the \
                 operations desk."
            }
            DiagnosticCategory::NameResolutionFailure => {
                "The directory server address could not be resolved. Ask \
                 the operations desk to review the directory host settings."
            }
            DiagnosticCategory::SecureChannelFailure => {
                "Secure connection setup to the directory failed. Report a \
                 StartTLS/TLS failure to the maintainers via the operations \
                 desk."
            }
            DiagnosticCategory::ConfigurationIncomplete => {
                "Domain information required for sign-in is missing. \
                 Contact the system administrator."
            }
            DiagnosticCategory::Unclassified => {
                "Authentication failed. Report the situation to the \
                 operations desk for escalation."
            }
        }
    }

    /// Classify accumulated attempt failures into one category.
    ///
    /// The most recent attempt decides the credential case; keyword scans
    /// over all attempts decide the operational cases, in the order
    /// network, name resolution, secure channel.
    #[must_use]
    pub fn classify(attempts: &[BindAttempt]) -> Self {
        let Some(last) = attempts.last() else {
            return DiagnosticCategory::Unclassified;
        };

        if last.result_code == Some(RC_INVALID_CREDENTIALS) {
            return DiagnosticCategory::InvalidCredentials;
        }

        if attempts.iter().any(|a| a.contains_any(DNS_KEYWORDS)) {
            return DiagnosticCategory::NameResolutionFailure;
        }

        if attempts.iter().any(|a| a.contains_any(NETWORK_KEYWORDS)) {
            return DiagnosticCategory::NetworkUnreachable;
        }

        if attempts
            .iter()
            .any(|a| a.stage == AttemptStage::StartTls || a.contains_any(TLS_KEYWORDS))
        {
            return DiagnosticCategory::SecureChannelFailure;
        }

        DiagnosticCategory::Unclassified
    }
}

impl std::fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
