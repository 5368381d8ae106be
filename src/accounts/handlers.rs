use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    accounts::{
        dto::{
            AccountSnapshot, ChangeEmailRequest, ChangePasswordRequest, LoginRequest,
            LoginResponse, SignUpRequest,
        },
        record::AccountRecord,
        repo::{AccountStore, StoreError},
        services::{self, ServiceError},
        validation::ValidationError,
    },
    auth::extractors::CurrentUser,
    state::AppState,
};

type Rejection = (StatusCode, String);

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(sign_up))
        .route("/auth/login", post(login))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/users/:id", get(get_user))
        .route("/users/:id/password", post(change_password))
        .route("/users/:id/email", post(request_email_change))
}

fn store_rejection(e: StoreError) -> Rejection {
    match e {
        StoreError::NotFound => (StatusCode::NOT_FOUND, e.to_string()),
        StoreError::UniqueConstraintViolation | StoreError::StaleVersion => {
            (StatusCode::CONFLICT, e.to_string())
        }
        StoreError::Incomplete(_) | StoreError::Database(_) => {
            error!(error = %e, "store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub(crate) fn reject(e: ServiceError) -> Rejection {
    match e {
        ServiceError::Store(e) | ServiceError::Validation(ValidationError::Store(e)) => {
            store_rejection(e)
        }
        ServiceError::Validation(ValidationError::EmailTaken) => {
            (StatusCode::CONFLICT, e.to_string())
        }
        ServiceError::Validation(v) => (StatusCode::UNPROCESSABLE_ENTITY, v.to_string()),
        ServiceError::Forbidden => (StatusCode::FORBIDDEN, e.to_string()),
        ServiceError::InvalidCredentials => (StatusCode::UNAUTHORIZED, e.to_string()),
        ServiceError::Blocked => (StatusCode::FORBIDDEN, e.to_string()),
        ServiceError::Internal(e) => {
            error!(error = %e, "internal error");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Redacts for the account itself and projects, the view an account gets of
/// its own data.
fn own_snapshot(state: &AppState, record: &AccountRecord) -> AccountSnapshot {
    let mut me = state.projector.project(record, None);
    me.password = None;
    state
        .projector
        .project(&state.projector.redact(record, Some(&me)), Some(&me))
}

#[instrument(skip(state, payload))]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<AccountSnapshot>), Rejection> {
    let record = services::sign_up(&state, payload).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(own_snapshot(&state, &record))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Rejection> {
    let (access_token, record) = services::login(&state, payload).await.map_err(reject)?;
    Ok(Json(LoginResponse {
        access_token,
        user: own_snapshot(&state, &record),
    }))
}

#[instrument(skip(state, user))]
pub async fn get_me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<AccountSnapshot>, Rejection> {
    let me = user.require()?;
    let record = state.store.load_by_id(me.id).await.map_err(store_rejection)?;
    Ok(Json(own_snapshot(&state, &record)))
}

#[instrument(skip(state, principal))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<AccountRecord>, Rejection> {
    let record = state.store.load_by_id(id).await.map_err(store_rejection)?;
    Ok(Json(state.projector.redact(&record, principal.as_ref())))
}

#[instrument(skip(state, principal, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    CurrentUser(principal): CurrentUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, Rejection> {
    services::change_password(&state, principal.as_ref(), id, payload)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, principal, payload))]
pub async fn request_email_change(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    CurrentUser(principal): CurrentUser,
    Json(payload): Json<ChangeEmailRequest>,
) -> Result<Json<AccountRecord>, Rejection> {
    let record = services::request_email_change(&state, principal.as_ref(), id, payload)
        .await
        .map_err(reject)?;
    Ok(Json(state.projector.redact(&record, principal.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::record::{now_millis, role};
    use crate::app::build_app;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(
        state: &AppState,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = build_app(state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn sign_up_and_login(state: &AppState, email: &str) -> (Uuid, String) {
        let (status, body) = call(
            state,
            "POST",
            "/api/v1/auth/signup",
            None,
            Some(json!({ "email": email, "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id: Uuid = serde_json::from_value(body["id"].clone()).unwrap();

        let (status, body) = call(
            state,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": email, "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        (id, body["access_token"].as_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn sign_up_returns_redacted_snapshot() {
        let state = AppState::fake();
        let (status, body) = call(
            &state,
            "POST",
            "/api/v1/auth/signup",
            None,
            Some(json!({ "email": "a@b.io", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["username"], "a@b.io");
        assert_eq!(body["unverified"], true);
        assert_eq!(body["good_user"], false);
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn sign_up_rejects_short_password() {
        let state = AppState::fake();
        let (status, _) = call(
            &state,
            "POST",
            "/api/v1/auth/signup",
            None,
            Some(json!({ "email": "a@b.io", "password": "123" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn sign_up_with_taken_email_conflicts() {
        let state = AppState::fake();
        sign_up_and_login(&state, "a@b.io").await;
        let (status, _) = call(
            &state,
            "POST",
            "/api/v1/auth/signup",
            None,
            Some(json!({ "email": "A@b.io", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn blocked_account_cannot_log_in() {
        let state = AppState::fake();
        let (id, _) = sign_up_and_login(&state, "a@b.io").await;
        let rec = state.store.load_by_id(id).await.unwrap();
        state
            .store
            .update(&rec.with_roles([role::BLOCKED]))
            .await
            .unwrap();

        let (status, _) = call(
            &state,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "a@b.io", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &state,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "a@b.io", "password": "wrong-one" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_requires_token() {
        let state = AppState::fake();
        let (status, _) = call(&state, "GET", "/api/v1/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (id, token) = sign_up_and_login(&state, "a@b.io").await;
        let (status, body) = call(&state, "GET", "/api/v1/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!(id));
        assert_eq!(body["username"], "a@b.io");
    }

    #[tokio::test]
    async fn email_is_only_visible_with_edit_permission() {
        let state = AppState::fake();
        let (id, token) = sign_up_and_login(&state, "a@b.io").await;
        let (_, other_token) = sign_up_and_login(&state, "c@d.io").await;
        let uri = format!("/api/v1/users/{id}");

        let (status, body) = call(&state, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("email").is_none());
        assert!(body.get("password").is_none());

        let (_, body) = call(&state, "GET", &uri, Some(&other_token), None).await;
        assert!(body.get("email").is_none());

        let (_, body) = call(&state, "GET", &uri, Some(&token), None).await;
        assert_eq!(body["email"], "a@b.io");
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn unknown_user_is_404() {
        let state = AppState::fake();
        let uri = format!("/api/v1/users/{}", Uuid::new_v4());
        let (status, _) = call(&state, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn token_older_than_credential_epoch_is_rejected() {
        let state = AppState::fake();
        let (id, token) = sign_up_and_login(&state, "a@b.io").await;

        let mut rec = state.store.load_by_id(id).await.unwrap();
        rec.credential_epoch = now_millis() + 60_000;
        state.store.update(&rec).await.unwrap();

        let (status, _) = call(&state, "GET", "/api/v1/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn password_change_by_stranger_is_forbidden() {
        let state = AppState::fake();
        let (id, _) = sign_up_and_login(&state, "a@b.io").await;
        let (_, other_token) = sign_up_and_login(&state, "c@d.io").await;
        let (status, _) = call(
            &state,
            "POST",
            &format!("/api/v1/users/{id}/password"),
            Some(&other_token),
            Some(json!({ "new_password": "brand-new" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_can_read_email_and_change_password() {
        let state = AppState::fake();
        let (id, _) = sign_up_and_login(&state, "a@b.io").await;
        let (admin_id, admin_token) = sign_up_and_login(&state, "root@b.io").await;
        let admin = state.store.load_by_id(admin_id).await.unwrap();
        state
            .store
            .update(&admin.with_roles([role::ADMIN]))
            .await
            .unwrap();

        let (_, body) = call(
            &state,
            "GET",
            &format!("/api/v1/users/{id}"),
            Some(&admin_token),
            None,
        )
        .await;
        assert_eq!(body["email"], "a@b.io");

        let (status, _) = call(
            &state,
            "POST",
            &format!("/api/v1/users/{id}/password"),
            Some(&admin_token),
            Some(json!({ "new_password": "brand-new" })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn email_change_request_shows_pending_email() {
        let state = AppState::fake();
        let (id, token) = sign_up_and_login(&state, "a@b.io").await;
        let (status, body) = call(
            &state,
            "POST",
            &format!("/api/v1/users/{id}/email"),
            Some(&token),
            Some(json!({ "new_email": "new@b.io", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pending_email"], "new@b.io");
        assert_eq!(body["email"], "a@b.io");
    }
}
