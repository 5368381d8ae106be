use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::record::AccountRecord;
use super::repo::{AccountStore, StoreError};

/// Process-local store with the same uniqueness and versioning rules as
/// the Postgres one. Used when no `DATABASE_URL` is set and in tests.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<Uuid, AccountRecord>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn holds_email(rec: &AccountRecord, email: &str) -> bool {
    rec.held_emails().contains(email)
}

fn conflicts(accounts: &HashMap<Uuid, AccountRecord>, record: &AccountRecord) -> bool {
    let wanted = record.held_emails();
    accounts
        .values()
        .filter(|other| other.id != record.id)
        .any(|other| !other.held_emails().is_disjoint(&wanted))
}

fn require_credentials(record: &AccountRecord) -> Result<(), StoreError> {
    if record.email.is_none() {
        return Err(StoreError::Incomplete("email"));
    }
    if record.password.is_none() {
        return Err(StoreError::Incomplete("password"));
    }
    Ok(())
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn load_by_id(&self, id: Uuid) -> Result<AccountRecord, StoreError> {
        self.accounts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|rec| rec.email.as_deref() == Some(email))
            .cloned())
    }

    async fn email_taken(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .any(|rec| holds_email(rec, email)))
    }

    async fn insert(&self, record: &AccountRecord) -> Result<AccountRecord, StoreError> {
        require_credentials(record)?;
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&record.id) || conflicts(&accounts, record) {
            return Err(StoreError::UniqueConstraintViolation);
        }
        let mut stored = record.clone();
        stored.captcha_response = None;
        stored.version = 0;
        accounts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, record: &AccountRecord) -> Result<AccountRecord, StoreError> {
        require_credentials(record)?;
        let mut accounts = self.accounts.write().await;
        let current = accounts.get(&record.id).ok_or(StoreError::NotFound)?;
        if current.version != record.version {
            return Err(StoreError::StaleVersion);
        }
        if conflicts(&accounts, record) {
            return Err(StoreError::UniqueConstraintViolation);
        }
        let mut stored = record.clone();
        stored.captcha_response = None;
        stored.version += 1;
        accounts.insert(stored.id, stored.clone());
        Ok(stored)
    }
}
