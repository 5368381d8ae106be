use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use uuid::Uuid;

pub const EMAIL_MIN: usize = 4;
pub const EMAIL_MAX: usize = 250;
pub const PASSWORD_MIN: usize = 6;
pub const PASSWORD_MAX: usize = 50;

/// Well-known role names. Roles are plain strings so integrators can add
/// their own next to these.
pub mod role {
    pub const UNVERIFIED: &str = "UNVERIFIED";
    pub const BLOCKED: &str = "BLOCKED";
    pub const ADMIN: &str = "ADMIN";
}

/// Built-in permission names understood by the projector.
pub mod permission {
    pub const EDIT: &str = "edit";
}

/// Stored shape of a user account.
///
/// No validation happens here: lengths, formats and uniqueness are
/// checked by `accounts::validation` and the store before a record is
/// built or saved. `email` and `password` are only `None` on a redacted
/// copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>, // encrypted credential
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_email: Option<String>, // set only while an email change is in flight
    /// Tokens issued before this instant (ms since epoch) are rejected.
    #[serde(skip)]
    pub credential_epoch: i64,
    #[serde(default, skip_serializing)]
    pub captcha_response: Option<String>, // sign-up only, never persisted
    #[serde(skip)]
    pub version: i32,
}

impl AccountRecord {
    /// Fresh record with a new id and the credential epoch set to now.
    pub fn new(email: impl Into<String>, encrypted_password: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: Some(email.into()),
            password: Some(encrypted_password.into()),
            roles: BTreeSet::new(),
            pending_email: None,
            credential_epoch: now_millis(),
            captcha_response: None,
            version: 0,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Every address this account occupies in the shared email namespace.
    pub fn held_emails(&self) -> BTreeSet<&str> {
        self.email
            .as_deref()
            .into_iter()
            .chain(self.pending_email.as_deref())
            .collect()
    }

    /// Moves the credential epoch forward so that earlier tokens stop working.
    pub fn touch_credentials(&mut self) {
        self.credential_epoch = now_millis().max(self.credential_epoch + 1);
    }
}

impl std::fmt::Display for AccountRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Account [id={}, email={}, roles={:?}]",
            self.id,
            self.email.as_deref().unwrap_or("-"),
            self.roles
        )
    }
}

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
