use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::{error, warn};

use super::jwt::JwtKeys;
use crate::accounts::{
    dto::Principal,
    repo::{AccountStore, StoreError},
};
use crate::state::AppState;

/// The caller behind the request, `None` when no `Authorization` header
/// was sent.
pub struct CurrentUser(pub Option<Principal>);

impl CurrentUser {
    pub fn require(self) -> Result<Principal, (StatusCode, String)> {
        self.0
            .ok_or((StatusCode::UNAUTHORIZED, "Authentication required".to_string()))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
            return Ok(CurrentUser(None));
        };
        let token = header
            .to_str()
            .ok()
            .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
            .ok_or((StatusCode::UNAUTHORIZED, "Invalid Authorization header".to_string()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            (StatusCode::UNAUTHORIZED, "Invalid or expired token".to_string())
        })?;

        let mut record = match state.store.load_by_id(claims.sub).await {
            Ok(r) => r,
            Err(StoreError::NotFound) => {
                warn!(user_id = %claims.sub, "token for unknown account");
                return Err((StatusCode::UNAUTHORIZED, "User not found".to_string()));
            }
            Err(e) => {
                error!(error = %e, "load principal failed");
                return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
            }
        };

        if claims.issued_before(record.credential_epoch) {
            warn!(user_id = %record.id, "token predates credential change");
            return Err((StatusCode::UNAUTHORIZED, "Invalid or expired token".to_string()));
        }

        record.password = None;
        Ok(CurrentUser(Some(state.projector.project(&record, None))))
    }
}
