use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::dto::{AccountSnapshot, Principal};
use super::flags::RoleFlags;
use super::permission::PermissionRules;
use super::record::{permission, AccountRecord};

/// Supplies the opaque `tag` carried on every snapshot, e.g. a display name
/// kept outside the core record.
pub trait TagHook: Send + Sync {
    fn tag(&self, record: &AccountRecord) -> Option<serde_json::Value>;
}

impl<F> TagHook for F
where
    F: Fn(&AccountRecord) -> Option<serde_json::Value> + Send + Sync,
{
    fn tag(&self, record: &AccountRecord) -> Option<serde_json::Value> {
        self(record)
    }
}

/// Default hook: no tag.
pub fn no_tag(_record: &AccountRecord) -> Option<serde_json::Value> {
    None
}

/// Authorization decisions and client-safe views over account records.
///
/// Stateless apart from its configuration, so one instance can be shared
/// across tasks behind an `Arc`.
#[derive(Clone)]
pub struct AccountProjector {
    rules: PermissionRules,
    tag_hook: Arc<dyn TagHook>,
}

impl Default for AccountProjector {
    fn default() -> Self {
        Self {
            rules: PermissionRules::default(),
            tag_hook: Arc::new(no_tag),
        }
    }
}

impl AccountProjector {
    pub fn with_tag_hook(mut self, hook: impl TagHook + 'static) -> Self {
        self.tag_hook = Arc::new(hook);
        self
    }

    pub fn with_rules(mut self, rules: PermissionRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn compute_flags(roles: &std::collections::BTreeSet<String>) -> RoleFlags {
        RoleFlags::compute(roles)
    }

    pub fn has_permission(&self, principal: Option<&Principal>, target_id: Uuid, name: &str) -> bool {
        self.rules.check(principal, target_id, name)
    }

    pub fn has_edit_permission(&self, principal: Option<&Principal>, target_id: Uuid) -> bool {
        self.has_permission(principal, target_id, permission::EDIT)
    }

    /// Copy of `record` safe to hand out: the password is always dropped and
    /// the email is kept only for callers allowed to edit the account.
    pub fn redact(&self, record: &AccountRecord, principal: Option<&Principal>) -> AccountRecord {
        let mut out = record.clone();
        out.password = None;
        out.captcha_response = None;
        if !self.has_edit_permission(principal, record.id) {
            out.email = None;
        }
        debug!(account = %out, "hid confidential fields");
        out
    }

    /// Builds a snapshot of `record`.
    ///
    /// `password` is copied as it is, so callers that will serialize the
    /// snapshot must pass a record through [`redact`](Self::redact) first.
    /// `username` is always the record's email and is not subject to the
    /// edit-permission check that `redact` applies to `email`.
    pub fn project(&self, record: &AccountRecord, _principal: Option<&Principal>) -> AccountSnapshot {
        AccountSnapshot {
            id: record.id,
            username: record.email.clone(),
            password: record.password.clone(),
            roles: record.roles.clone(),
            tag: self.tag_hook.tag(record),
            flags: RoleFlags::compute(&record.roles),
        }
    }
}

impl std::fmt::Debug for AccountProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountProjector")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}
