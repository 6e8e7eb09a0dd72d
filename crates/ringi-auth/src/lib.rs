//! Local credential handling for ringi.
//!
//! Provides Argon2id password hashing and verification with
//! OWASP-recommended parameters. Used only for local-sourced identities;
//! directory-sourced identities are always verified against the directory.

mod error;
mod password;

pub use error::CredentialError;
pub use password::{hash_password, verify_password};
