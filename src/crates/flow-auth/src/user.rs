//! `User` (spec §6.4): `{name, admin, action-privileges, db-privileges}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::privilege::Privilege;

/// Prefix applied to the synthetic user name generated for a streaming
/// ingest subscription token, so it can never collide with a real username.
pub const SUBSCRIPTION_USER_PREFIX: &str = "subscription:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub admin: bool,
    /// Keyed by absolute resource path, as walked by `authorize_action`.
    pub action_privileges: BTreeMap<String, Privilege>,
    pub db_privileges: BTreeMap<String, Privilege>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            admin: false,
            action_privileges: BTreeMap::new(),
            db_privileges: BTreeMap::new(),
        }
    }

    pub fn admin(mut self) -> Self {
        self.admin = true;
        self
    }

    pub fn with_action_privilege(mut self, path: impl Into<String>, privilege: Privilege) -> Self {
        self.action_privileges.insert(path.into(), privilege);
        self
    }

    pub fn with_db_privilege(mut self, db: impl Into<String>, privilege: Privilege) -> Self {
        self.db_privileges.insert(db.into(), privilege);
        self
    }

    /// A synthetic user standing in for a streaming ingest subscription
    /// token, granted exactly `privilege` on `db`.
    pub fn for_subscription_token(token_name: &str, db: &str, privilege: Privilege) -> Self {
        User::new(format!("{SUBSCRIPTION_USER_PREFIX}{token_name}")).with_db_privilege(db, privilege)
    }

    /// `AuthorizeDB(privilege, db)`: allow if admin, else allow iff the user
    /// has either the requested privilege or `All` on that database.
    pub fn authorize_db(&self, required: Privilege, db: &str) -> bool {
        if self.admin {
            return true;
        }
        match self.db_privileges.get(db) {
            Some(p) => p.allows(required),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_bypasses_db_privilege_check() {
        let u = User::new("root").admin();
        assert!(u.authorize_db(Privilege::ALL, "telemetry"));
    }

    #[test]
    fn missing_db_privilege_denies() {
        let u = User::new("alice");
        assert!(!u.authorize_db(Privilege::READ, "telemetry"));
    }

    #[test]
    fn matching_db_privilege_allows() {
        let u = User::new("alice").with_db_privilege("telemetry", Privilege::WRITE);
        assert!(u.authorize_db(Privilege::WRITE, "telemetry"));
        assert!(!u.authorize_db(Privilege::DELETE, "telemetry"));
    }

    #[test]
    fn subscription_user_is_namespaced() {
        let u = User::for_subscription_token("ingest-1", "telemetry", Privilege::WRITE);
        assert!(u.name.starts_with(SUBSCRIPTION_USER_PREFIX));
    }
}
