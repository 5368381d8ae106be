use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::record::role;

/// Status flags derived from a role set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleFlags {
    pub unverified: bool,
    pub blocked: bool,
    pub admin: bool,
    pub good_user: bool,
    pub good_admin: bool,
}

impl RoleFlags {
    /// Custom roles are ignored; `UNVERIFIED` and `BLOCKED` may coexist.
    pub fn compute(roles: &BTreeSet<String>) -> Self {
        let unverified = roles.contains(role::UNVERIFIED);
        let blocked = roles.contains(role::BLOCKED);
        let admin = roles.contains(role::ADMIN);
        let good_user = !(unverified || blocked);
        Self {
            unverified,
            blocked,
            admin,
            good_user,
            good_admin: good_user && admin,
        }
    }
}
