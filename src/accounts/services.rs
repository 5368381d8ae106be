use axum::extract::FromRef;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{ChangeEmailRequest, ChangePasswordRequest, LoginRequest, Principal, SignUpRequest};
use super::record::{role, AccountRecord};
use super::repo::{AccountStore, StoreError};
use super::validation::{
    normalize_email, validate_email_change, validate_password, validate_sign_up, ValidationError,
};
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_against_dummy, verify_password};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("not allowed")]
    Forbidden,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is blocked")]
    Blocked,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Creates an `UNVERIFIED` account.
pub async fn sign_up(state: &AppState, req: SignUpRequest) -> Result<AccountRecord, ServiceError> {
    let email = normalize_email(&req.email);
    validate_sign_up(
        state.store.as_ref(),
        state.captcha.as_ref(),
        &email,
        &req.password,
        req.captcha_response.as_deref(),
    )
    .await?;

    let mut record =
        AccountRecord::new(email, hash_password(&req.password)?).with_roles([role::UNVERIFIED]);
    record.captcha_response = req.captcha_response;
    let record = state.store.insert(&record).await?;

    info!(user_id = %record.id, "account signed up");
    Ok(record)
}

/// Checks credentials and issues an access token.
pub async fn login(
    state: &AppState,
    req: LoginRequest,
) -> Result<(String, AccountRecord), ServiceError> {
    let email = normalize_email(&req.email);
    let Some(record) = state.store.find_by_email(&email).await? else {
        verify_against_dummy(&req.password);
        warn!(email = %email, "login unknown email");
        return Err(ServiceError::InvalidCredentials);
    };

    let hash = record.password.as_deref().unwrap_or_default();
    if !verify_password(&req.password, hash)? {
        warn!(user_id = %record.id, "login invalid password");
        return Err(ServiceError::InvalidCredentials);
    }
    if record.has_role(role::BLOCKED) {
        warn!(user_id = %record.id, "login refused for blocked account");
        return Err(ServiceError::Blocked);
    }

    let token = JwtKeys::from_ref(state).sign_access(record.id)?;
    info!(user_id = %record.id, "user logged in");
    Ok((token, record))
}

fn authorize_edit(
    state: &AppState,
    principal: Option<&Principal>,
    target_id: Uuid,
) -> Result<(), ServiceError> {
    if state.projector.has_edit_permission(principal, target_id) {
        Ok(())
    } else {
        warn!(target_id = %target_id, "edit permission denied");
        Err(ServiceError::Forbidden)
    }
}

/// Replaces the password and moves the credential epoch, which invalidates
/// every token issued so far. Users changing their own password must supply
/// the old one; good admins need not.
pub async fn change_password(
    state: &AppState,
    principal: Option<&Principal>,
    target_id: Uuid,
    req: ChangePasswordRequest,
) -> Result<AccountRecord, ServiceError> {
    authorize_edit(state, principal, target_id)?;
    let mut record = state.store.load_by_id(target_id).await?;

    if principal.is_some_and(|p| p.id == target_id) {
        let old = req.old_password.as_deref().unwrap_or_default();
        if !verify_password(old, record.password.as_deref().unwrap_or_default())? {
            warn!(user_id = %target_id, "change password with wrong old password");
            return Err(ServiceError::InvalidCredentials);
        }
    }
    validate_password(&req.new_password)?;

    record.password = Some(hash_password(&req.new_password)?);
    record.touch_credentials();
    let record = state.store.update(&record).await?;

    info!(user_id = %record.id, "password changed");
    Ok(record)
}

/// Parks the requested address in `pending_email` until it is confirmed.
pub async fn request_email_change(
    state: &AppState,
    principal: Option<&Principal>,
    target_id: Uuid,
    req: ChangeEmailRequest,
) -> Result<AccountRecord, ServiceError> {
    authorize_edit(state, principal, target_id)?;
    let mut record = state.store.load_by_id(target_id).await?;

    if !verify_password(&req.password, record.password.as_deref().unwrap_or_default())? {
        warn!(user_id = %target_id, "email change with wrong password");
        return Err(ServiceError::InvalidCredentials);
    }

    let new_email = normalize_email(&req.new_email);
    validate_email_change(state.store.as_ref(), &new_email).await?;

    record.pending_email = Some(new_email);
    let record = state.store.update(&record).await?;

    info!(user_id = %record.id, "email change requested");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn signed_up(state: &AppState, email: &str) -> AccountRecord {
        sign_up(
            state,
            SignUpRequest {
                email: email.into(),
                password: "secret1".into(),
                captcha_response: None,
            },
        )
        .await
        .expect("sign up")
    }

    async fn make_admin(state: &AppState, email: &str) -> Principal {
        let rec = signed_up(state, email).await;
        let rec = state
            .store
            .update(&rec.with_roles([role::ADMIN]))
            .await
            .expect("promote");
        state.projector.project(&rec, None)
    }

    #[tokio::test]
    async fn sign_up_creates_unverified_account() {
        let state = AppState::fake();
        let rec = signed_up(&state, "  New@Example.com ").await;
        assert_eq!(rec.email.as_deref(), Some("new@example.com"));
        assert!(rec.has_role(role::UNVERIFIED));
        assert_ne!(rec.password.as_deref(), Some("secret1"));
        assert_eq!(rec.captcha_response, None);
    }

    #[tokio::test]
    async fn sign_up_twice_conflicts() {
        let state = AppState::fake();
        signed_up(&state, "a@b.io").await;
        let err = sign_up(
            &state,
            SignUpRequest {
                email: "A@B.io".into(),
                password: "secret1".into(),
                captcha_response: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::EmailTaken)));
    }

    #[tokio::test]
    async fn login_checks_password_and_block() {
        let state = AppState::fake();
        let rec = signed_up(&state, "a@b.io").await;

        let bad = login(
            &state,
            LoginRequest {
                email: "a@b.io".into(),
                password: "nope-nope".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(bad, ServiceError::InvalidCredentials));

        let (token, _) = login(
            &state,
            LoginRequest {
                email: "a@b.io".into(),
                password: "secret1".into(),
            },
        )
        .await
        .expect("login");
        assert!(!token.is_empty());

        state
            .store
            .update(&rec.with_roles([role::BLOCKED]))
            .await
            .unwrap();
        let blocked = login(
            &state,
            LoginRequest {
                email: "a@b.io".into(),
                password: "secret1".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(blocked, ServiceError::Blocked));
    }

    #[tokio::test]
    async fn unknown_email_looks_like_wrong_password() {
        let state = AppState::fake();
        signed_up(&state, "a@b.io").await;

        let unknown = login(
            &state,
            LoginRequest {
                email: "ghost@b.io".into(),
                password: "secret1".into(),
            },
        )
        .await
        .unwrap_err();
        let wrong = login(
            &state,
            LoginRequest {
                email: "a@b.io".into(),
                password: "secret2".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(unknown, ServiceError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn change_own_password_needs_old_one_and_bumps_epoch() {
        let state = AppState::fake();
        let rec = signed_up(&state, "a@b.io").await;
        let me = state.projector.project(&rec, None);

        let err = change_password(
            &state,
            Some(&me),
            rec.id,
            ChangePasswordRequest {
                old_password: Some("wrong1".into()),
                new_password: "brand-new".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));

        let updated = change_password(
            &state,
            Some(&me),
            rec.id,
            ChangePasswordRequest {
                old_password: Some("secret1".into()),
                new_password: "brand-new".into(),
            },
        )
        .await
        .expect("change password");
        assert!(updated.credential_epoch > rec.credential_epoch);
        assert!(verify_password("brand-new", updated.password.as_deref().unwrap()).unwrap());
    }

    #[tokio::test]
    async fn strangers_cannot_change_password_but_admins_can() {
        let state = AppState::fake();
        let target = signed_up(&state, "target@b.io").await;
        let stranger = state
            .projector
            .project(&signed_up(&state, "other@b.io").await, None);

        let req = || ChangePasswordRequest {
            old_password: None,
            new_password: "brand-new".into(),
        };
        let err = change_password(&state, Some(&stranger), target.id, req())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
        let err = change_password(&state, None, target.id, req())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));

        let admin = make_admin(&state, "admin@b.io").await;
        change_password(&state, Some(&admin), target.id, req())
            .await
            .expect("admin may change password");
    }

    #[tokio::test]
    async fn email_change_sets_pending_email() {
        let state = AppState::fake();
        let rec = signed_up(&state, "a@b.io").await;
        let me = state.projector.project(&rec, None);

        let updated = request_email_change(
            &state,
            Some(&me),
            rec.id,
            ChangeEmailRequest {
                new_email: "New@B.io".into(),
                password: "secret1".into(),
            },
        )
        .await
        .expect("request change");
        assert_eq!(updated.pending_email.as_deref(), Some("new@b.io"));
        assert_eq!(updated.email.as_deref(), Some("a@b.io"));

        let err = sign_up(
            &state,
            SignUpRequest {
                email: "new@b.io".into(),
                password: "secret1".into(),
                captcha_response: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::EmailTaken)));
    }
}
