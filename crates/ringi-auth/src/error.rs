//! Error types for local credential operations.

use thiserror::Error;

/// Local credential error types.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// Password hashing operation failed.
    #[error("password hashing failed: {0}")]
    HashingFailed(String),

    /// Stored password hash is not a valid PHC string.
    #[error("invalid password hash format")]
    InvalidHashFormat,
}
