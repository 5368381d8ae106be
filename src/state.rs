use crate::accounts::{
    captcha::{CaptchaVerifier, NoCaptcha, RecaptchaVerifier},
    memory::InMemoryAccountStore,
    projector::AccountProjector,
    repo::{AccountStore, PgAccountStore},
};
use crate::config::AppConfig;
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Option<PgPool>,
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn AccountStore>,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub projector: Arc<AccountProjector>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (db, store) = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                let store = Arc::new(PgAccountStore::new(db.clone())) as Arc<dyn AccountStore>;
                (Some(db), store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; accounts are kept in memory");
                (None, Arc::new(InMemoryAccountStore::new()) as Arc<dyn AccountStore>)
            }
        };

        let captcha: Arc<dyn CaptchaVerifier> = match &config.recaptcha_secret {
            Some(secret) => Arc::new(RecaptchaVerifier::new(secret.clone())),
            None => Arc::new(NoCaptcha),
        };

        Ok(Self {
            db,
            config,
            store,
            captcha,
            projector: Arc::new(AccountProjector::default()),
        })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn AccountStore>,
        captcha: Arc<dyn CaptchaVerifier>,
        projector: Arc<AccountProjector>,
    ) -> Self {
        Self {
            db: None,
            config,
            store,
            captcha,
            projector,
        }
    }

    /// In-memory state for tests.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
            },
            recaptcha_secret: None,
        });
        Self::from_parts(
            config,
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(NoCaptcha),
            Arc::new(AccountProjector::default()),
        )
    }
}
