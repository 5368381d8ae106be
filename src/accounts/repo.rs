use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

use super::record::AccountRecord;
use super::repo_types::AccountRow;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("account not found")]
    NotFound,
    #[error("email already in use")]
    UniqueConstraintViolation,
    #[error("account was modified concurrently")]
    StaleVersion,
    #[error("record is missing {0}")]
    Incomplete(&'static str),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23505") => {
                StoreError::UniqueConstraintViolation
            }
            other => StoreError::Database(other),
        }
    }
}

/// Persistence of account records.
///
/// Implementations enforce optimistic versioning and a single email
/// namespace: an address held by one account, as its `email` or its
/// `pending_email`, cannot appear in either field of another account.
/// A violation is reported as [`StoreError::UniqueConstraintViolation`].
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn load_by_id(&self, id: Uuid) -> Result<AccountRecord, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<AccountRecord>, StoreError>;

    /// True when `email` is held by any account, as its email or pending email.
    async fn email_taken(&self, email: &str) -> Result<bool, StoreError>;

    async fn insert(&self, record: &AccountRecord) -> Result<AccountRecord, StoreError>;

    /// Saves `record` if its `version` still matches the stored one and
    /// returns it with the version bumped.
    async fn update(&self, record: &AccountRecord) -> Result<AccountRecord, StoreError>;
}

pub struct PgAccountStore {
    db: PgPool,
}

impl PgAccountStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn roles_of(&self, id: Uuid) -> Result<BTreeSet<String>, StoreError> {
        let roles = sqlx::query_scalar::<_, String>(
            r#"SELECT role FROM usr_role WHERE user_id = $1"#,
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;
        Ok(roles.into_iter().collect())
    }

    async fn replace_roles(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        roles: &BTreeSet<String>,
    ) -> Result<(), StoreError> {
        sqlx::query(r#"DELETE FROM usr_role WHERE user_id = $1"#)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        for role in roles {
            sqlx::query(r#"INSERT INTO usr_role (user_id, role) VALUES ($1, $2)"#)
                .bind(id)
                .bind(role)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    /// Rewrites the account's rows in `user_email`, whose primary key spans
    /// both email columns of every account.
    async fn replace_emails(
        tx: &mut Transaction<'_, Postgres>,
        record: &AccountRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(r#"DELETE FROM user_email WHERE user_id = $1"#)
            .bind(record.id)
            .execute(&mut **tx)
            .await?;
        for email in record.held_emails() {
            sqlx::query(r#"INSERT INTO user_email (email, user_id) VALUES ($1, $2)"#)
                .bind(email)
                .bind(record.id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn load_by_id(&self, id: Uuid) -> Result<AccountRecord, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, email, password, pending_email, credential_epoch, version
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)?;
        let roles = self.roles_of(id).await?;
        Ok(row.into_record(roles))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AccountRecord>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, email, password, pending_email, credential_epoch, version
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        match row {
            Some(row) => {
                let roles = self.roles_of(row.id).await?;
                Ok(Some(row.into_record(roles)))
            }
            None => Ok(None),
        }
    }

    async fn email_taken(&self, email: &str) -> Result<bool, StoreError> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (SELECT 1 FROM user_email WHERE email = $1)"#,
        )
        .bind(email)
        .fetch_one(&self.db)
        .await?;
        Ok(taken)
    }

    async fn insert(&self, record: &AccountRecord) -> Result<AccountRecord, StoreError> {
        let email = record.email.as_deref().ok_or(StoreError::Incomplete("email"))?;
        let password = record
            .password
            .as_deref()
            .ok_or(StoreError::Incomplete("password"))?;

        let mut tx = self.db.begin().await?;
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO users (id, email, password, pending_email, credential_epoch, version)
            VALUES ($1, $2, $3, $4, $5, 0)
            RETURNING id, email, password, pending_email, credential_epoch, version
            "#,
        )
        .bind(record.id)
        .bind(email)
        .bind(password)
        .bind(record.pending_email.as_deref())
        .bind(record.credential_epoch)
        .fetch_one(&mut *tx)
        .await?;
        Self::replace_emails(&mut tx, record).await?;
        Self::replace_roles(&mut tx, record.id, &record.roles).await?;
        tx.commit().await?;

        debug!(user_id = %record.id, "account inserted");
        Ok(row.into_record(record.roles.clone()))
    }

    async fn update(&self, record: &AccountRecord) -> Result<AccountRecord, StoreError> {
        let email = record.email.as_deref().ok_or(StoreError::Incomplete("email"))?;
        let password = record
            .password
            .as_deref()
            .ok_or(StoreError::Incomplete("password"))?;

        let mut tx = self.db.begin().await?;
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            UPDATE users
            SET email = $2, password = $3, pending_email = $4,
                credential_epoch = $5, version = version + 1
            WHERE id = $1 AND version = $6
            RETURNING id, email, password, pending_email, credential_epoch, version
            "#,
        )
        .bind(record.id)
        .bind(email)
        .bind(password)
        .bind(record.pending_email.as_deref())
        .bind(record.credential_epoch)
        .bind(record.version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let exists = sqlx::query_scalar::<_, bool>(
                r#"SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)"#,
            )
            .bind(record.id)
            .fetch_one(&mut *tx)
            .await?;
            return Err(if exists {
                StoreError::StaleVersion
            } else {
                StoreError::NotFound
            });
        };

        Self::replace_emails(&mut tx, record).await?;
        Self::replace_roles(&mut tx, record.id, &record.roles).await?;
        tx.commit().await?;

        debug!(user_id = %record.id, version = row.version, "account updated");
        Ok(row.into_record(record.roles.clone()))
    }
}
