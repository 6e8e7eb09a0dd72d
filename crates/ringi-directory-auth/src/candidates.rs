//! Bind-identity candidate generation.
//!
//! Directory naming conventions are ambiguous: the same person may sign in
//! as `alice`, `CORP\alice`, or `alice@corp.example.com`. From one input
//! username and the configured domain/suffix, this module produces the
//! ordered, deduplicated list of bind identities to try. Pure and
//! deterministic; no I/O.

use serde::{Deserialize, Serialize};

use crate::config::DirectoryConfig;

/// Bind authentication mechanism selected for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindMechanism {
    /// NT4-style `DOMAIN\user` identity.
    Ntlm,
    /// Simple bind with a UPN (`user@suffix`) identity.
    Simple,
}

/// One bind identity to attempt, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindCandidate {
    /// Human-readable label used in logs and attempt records.
    pub label: &'static str,
    /// The identity string passed to the bind.
    pub bind_identity: String,
    /// Mechanism dictated by the identity form.
    pub mechanism: BindMechanism,
}

impl BindCandidate {
    fn new(label: &'static str, bind_identity: String, mechanism: BindMechanism) -> Self {
        Self {
            label,
            bind_identity,
            mechanism,
        }
    }
}

/// Generate bind candidates for `username` under `config`.
///
/// Rules, applied in order (all applicable rules fire; duplicates by
/// `bind_identity` are dropped, first occurrence wins):
///
/// 1. input contains `\` → `NTLM(as-is)` with the input unchanged;
/// 2. input contains `@` → `UPN(as-is)` with the input unchanged;
/// 3. bare input and a configured domain → `NTLM(domain)` as
///    `domain\input`;
/// 4. bare input and a resolvable suffix (`upn_suffix`, else a dotted
///    `domain`) → `UPN(constructed)` as `input@suffix`.
///
/// An empty result is itself a valid (terminal) outcome: the orchestrator
/// fails with `ConfigurationIncomplete` without any network attempt.
#[must_use]
pub fn generate_candidates(username: &str, config: &DirectoryConfig) -> Vec<BindCandidate> {
    let mut candidates: Vec<BindCandidate> = Vec::new();
    let mut push = |candidate: BindCandidate| {
        if !candidates.iter().any(|c| c.bind_identity == candidate.bind_identity) {
            candidates.push(candidate);
        }
    };

    let has_backslash = username.contains('\\');
    let has_at = username.contains('@');

    if has_backslash {
        push(BindCandidate::new(
            "NTLM(as-is)",
            username.to_string(),
            BindMechanism::Ntlm,
        ));
    }
    if has_at {
        push(BindCandidate::new(
            "UPN(as-is)",
            username.to_string(),
            BindMechanism::Simple,
        ));
    }
    if !has_backslash && !has_at {
        if !config.domain.is_empty() {
            push(BindCandidate::new(
                "NTLM(domain)",
                format!("{}\\{}", config.domain, username),
                BindMechanism::Ntlm,
            ));
        }
        let suffix = config.upn_suffix.as_deref().or_else(|| {
            if !config.domain.is_empty() && config.domain.contains('.') {
                Some(config.domain.as_str())
            } else {
                None
            }
        });
        if let Some(suffix) = suffix {
            push(BindCandidate::new(
                "UPN(constructed)",
                format!("{username}@{suffix}"),
                BindMechanism::Simple,
            ));
        }
    }

    candidates
}
