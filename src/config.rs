use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Unset means accounts are kept in memory.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    /// Unset disables the reCAPTCHA check on sign-up.
    pub recaptcha_secret: Option<String>,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "lemon-accounts".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "lemon-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
        };
        Ok(Self {
            database_url: non_empty_var("DATABASE_URL"),
            jwt,
            recaptcha_secret: non_empty_var("RECAPTCHA_SECRET"),
        })
    }
}
