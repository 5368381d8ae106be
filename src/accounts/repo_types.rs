use sqlx::FromRow;
use std::collections::BTreeSet;
use uuid::Uuid;

use super::record::AccountRecord;

/// Row of the `users` table. Roles live in `usr_role`.
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub email: String,
    pub password: String, // argon2 hash
    pub pending_email: Option<String>,
    pub credential_epoch: i64,
    pub version: i32,
}

impl AccountRow {
    pub fn into_record(self, roles: BTreeSet<String>) -> AccountRecord {
        AccountRecord {
            id: self.id,
            email: Some(self.email),
            password: Some(self.password),
            roles,
            pending_email: self.pending_email,
            credential_epoch: self.credential_epoch,
            captcha_response: None,
            version: self.version,
        }
    }
}
