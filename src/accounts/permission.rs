use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::dto::Principal;
use super::flags::RoleFlags;
use super::record::permission;

/// Decides one named permission for a caller against a target account id.
pub type PermissionRule = Arc<dyn Fn(Option<&Principal>, Uuid) -> bool + Send + Sync>;

/// Permission name -> rule. Names without a rule are denied.
#[derive(Clone)]
pub struct PermissionRules {
    rules: HashMap<String, PermissionRule>,
}

impl PermissionRules {
    /// Table with no rules at all; every check is denied.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    pub fn with_rule<F>(mut self, name: impl Into<String>, rule: F) -> Self
    where
        F: Fn(Option<&Principal>, Uuid) -> bool + Send + Sync + 'static,
    {
        self.insert(name, rule);
        self
    }

    /// Adds or replaces the rule for `name`.
    pub fn insert<F>(&mut self, name: impl Into<String>, rule: F)
    where
        F: Fn(Option<&Principal>, Uuid) -> bool + Send + Sync + 'static,
    {
        self.rules.insert(name.into(), Arc::new(rule));
    }

    pub fn check(&self, principal: Option<&Principal>, target_id: Uuid, name: &str) -> bool {
        let granted = self
            .rules
            .get(name)
            .map(|rule| rule(principal, target_id))
            .unwrap_or(false);
        debug!(
            permission = name,
            target_id = %target_id,
            principal_id = ?principal.map(|p| p.id),
            granted,
            "permission computed"
        );
        granted
    }
}

impl Default for PermissionRules {
    /// The built-in table: only `edit`.
    fn default() -> Self {
        Self::empty().with_rule(permission::EDIT, edit_rule)
    }
}

impl std::fmt::Debug for PermissionRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.rules.keys().collect();
        names.sort();
        f.debug_struct("PermissionRules").field("rules", &names).finish()
    }
}

/// Self, or a good admin. Admin status comes from the caller's roles,
/// not from the flags carried on the snapshot.
pub fn edit_rule(principal: Option<&Principal>, target_id: Uuid) -> bool {
    let Some(principal) = principal else {
        return false;
    };
    principal.id == target_id || RoleFlags::compute(&principal.roles).good_admin
}
