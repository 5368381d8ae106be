use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // account ID
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
    #[serde(default)]
    pub iat_ms: i64, // issued at, milliseconds; compared with the credential epoch
}

impl Claims {
    /// True once the account's credentials changed after this token was issued.
    pub fn issued_before(&self, credential_epoch: i64) -> bool {
        self.iat_ms < credential_epoch
    }
}
