use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

const SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, response: &str) -> anyhow::Result<bool>;
}

/// Accepts every response. Used when no reCAPTCHA secret is configured.
pub struct NoCaptcha;

#[async_trait]
impl CaptchaVerifier for NoCaptcha {
    async fn verify(&self, _response: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Google reCAPTCHA v2 server-side check.
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    secret: String,
}

impl RecaptchaVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaVerifier {
    async fn verify(&self, response: &str) -> anyhow::Result<bool> {
        if response.is_empty() {
            return Ok(false);
        }
        let body: SiteVerifyResponse = self
            .client
            .post(SITEVERIFY_URL)
            .form(&[("secret", self.secret.as_str()), ("response", response)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if body.success {
            debug!("captcha passed");
        } else {
            warn!(errors = ?body.error_codes, "captcha rejected");
        }
        Ok(body.success)
    }
}
