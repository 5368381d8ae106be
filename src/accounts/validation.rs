use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use super::captcha::CaptchaVerifier;
use super::record::{EMAIL_MAX, EMAIL_MIN, PASSWORD_MAX, PASSWORD_MIN};
use super::repo::{AccountStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid email")]
    InvalidEmail,
    #[error("email already registered")]
    EmailTaken,
    #[error("password must be 6 to 50 characters")]
    WeakPassword,
    #[error("captcha verification failed")]
    CaptchaFailed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Lower-cases and trims, the form emails are stored in.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    let len = email.chars().count();
    (EMAIL_MIN..=EMAIL_MAX).contains(&len) && EMAIL_RE.is_match(email)
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        warn!(email = %email, "invalid email");
        Err(ValidationError::InvalidEmail)
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if (PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
        Ok(())
    } else {
        warn!(len, "password length out of range");
        Err(ValidationError::WeakPassword)
    }
}

async fn validate_unique_email(store: &dyn AccountStore, email: &str) -> Result<(), ValidationError> {
    if store.email_taken(email).await? {
        warn!(email = %email, "email already registered");
        return Err(ValidationError::EmailTaken);
    }
    Ok(())
}

/// Checks run before a new account is built. `email` must already be
/// normalized.
pub async fn validate_sign_up(
    store: &dyn AccountStore,
    captcha: &dyn CaptchaVerifier,
    email: &str,
    password: &str,
    captcha_response: Option<&str>,
) -> Result<(), ValidationError> {
    validate_email(email)?;
    validate_password(password)?;
    let passed = captcha
        .verify(captcha_response.unwrap_or_default())
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "captcha verification errored");
            false
        });
    if !passed {
        return Err(ValidationError::CaptchaFailed);
    }
    // uniqueness is only reported once the captcha has passed
    validate_unique_email(store, email).await
}

/// Checks for a requested new email. `new_email` must already be normalized.
pub async fn validate_email_change(
    store: &dyn AccountStore,
    new_email: &str,
) -> Result<(), ValidationError> {
    validate_email(new_email)?;
    validate_unique_email(store, new_email).await
}
