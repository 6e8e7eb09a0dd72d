//! # Directory Authentication
//!
//! LDAP/Active Directory authentication negotiation for ringi.
//!
//! One username and password go in; out comes either a provisioned local
//! identity or a single user-facing diagnostic category. In between, the
//! crate negotiates the ambiguity of enterprise directory sign-in:
//! several bind-identity forms (`DOMAIN\user`, `user@suffix`), transport
//! security that is secure by default (StartTLS unless LDAPS or an
//! explicit plaintext opt-in), and failure modes ranging from a typo to a
//! dead domain controller.
//!
//! ## Features
//!
//! - Ordered, deduplicated bind-candidate generation
//! - LDAPS and StartTLS, with StartTLS derived when nothing is configured
//! - Local-first verification for prefix-allow-listed service accounts
//! - Just-in-time identity provisioning with idempotent profile sync
//! - One-level neighbor provisioning to seed approver candidates
//! - A fixed diagnostic taxonomy that never leaks raw directory errors
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ringi_directory_auth::{
//!     DirectoryAuthenticator, DirectoryConfig, LdapDirectory, MemoryIdentityStore,
//! };
//!
//! let config = DirectoryConfig::new("ldap://dc01.example.com", "DC=example,DC=com")
//!     .with_domain("EXAMPLE")
//!     .with_upn_suffix("example.com");
//! config.validate()?;
//!
//! let auth = DirectoryAuthenticator::new(
//!     Arc::new(LdapDirectory::new()),
//!     Arc::new(MemoryIdentityStore::new()),
//! );
//!
//! match auth.authenticate(&config, "alice", "password").await {
//!     Ok(identity) => println!("signed in as {}", identity.username),
//!     Err(category) => println!("{}", category.user_message()),
//! }
//! ```

pub mod candidates;
pub mod config;
pub mod connector;
pub mod entry;
pub mod error;
pub mod orchestrator;
pub mod provision;
pub mod store;
pub mod traits;

// Re-exports
pub use candidates::{generate_candidates, BindCandidate, BindMechanism};
pub use config::DirectoryConfig;
pub use connector::LdapDirectory;
pub use entry::{extract_ou_levels, ou_search_bases, DirectoryEntry};
pub use error::{
    AttemptStage, BindAttempt, DiagnosticCategory, DirectoryAuthError, DirectoryAuthResult,
};
pub use orchestrator::{ApproverCandidate, DirectoryAuthenticator};
pub use store::{Identity, IdentitySource, MemoryIdentityStore};
pub use traits::{DirectoryBind, DirectorySession, IdentityStore};
