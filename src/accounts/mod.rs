use crate::state::AppState;
use axum::Router;

pub mod captcha;
pub mod dto;
pub mod flags;
pub mod handlers;
pub mod memory;
pub mod permission;
pub mod projector;
pub mod record;
pub mod repo;
mod repo_types;
pub mod services;
pub mod validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::user_routes())
}
