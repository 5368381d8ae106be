use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::error;

lazy_static! {
    // Stand-in credential for logins that name no account.
    static ref DUMMY_HASH: Option<String> = hash_password("lemon-accounts-dummy").ok();
}

/// Encrypts an account password into the argon2 PHC string kept in
/// `AccountRecord::password`. A fresh salt is drawn per call.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "account credential hashing failed");
            anyhow::anyhow!("hash account credential: {e}")
        })?
        .to_string();
    Ok(hash)
}

/// Checks `plain` against a stored account credential. A stored value that
/// is not a PHC string is an error, not a mismatch.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "stored account credential is unreadable");
        anyhow::anyhow!("parse stored account credential: {e}")
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Spends the same argon2 work as a real verification, for callers that
/// have no stored credential to check against. Always yields `false`.
pub fn verify_against_dummy(plain: &str) -> bool {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(plain, hash);
    }
    false
}
