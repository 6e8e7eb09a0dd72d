//! Argon2id password hashing and verification.
//!
//! Local identities carry a PHC-formatted Argon2id hash; directory-sourced
//! identities carry no usable hash at all and are never verified here.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

use crate::error::CredentialError;

/// OWASP 2024 recommended Argon2id parameters: m=19456 KiB, t=2, p=1.
fn owasp_params() -> Params {
    // Constants known to be valid; failure would be an argon2 library bug.
    Params::new(19456, 2, 1, None).expect("OWASP Argon2 parameters are valid constants")
}

/// Hash a password using Argon2id.
///
/// Returns a PHC-formatted hash string suitable for storage on a local
/// identity record.
pub fn hash_password(password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, owasp_params());

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CredentialError::HashingFailed(e.to_string()))?;

    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored PHC hash.
///
/// `Ok(false)` means the password does not match; an error means the stored
/// hash itself is unreadable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, CredentialError> {
    let parsed = PasswordHash::new(hash).map_err(|_| CredentialError::InvalidHashFormat)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, owasp_params());

    match argon2.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}
