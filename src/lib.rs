pub mod accounts;
pub mod app;
pub mod auth;
pub mod config;
pub mod state;

pub use accounts::{
    dto::{AccountSnapshot, Principal},
    flags::RoleFlags,
    permission::PermissionRules,
    projector::{AccountProjector, TagHook},
    record::AccountRecord,
};
