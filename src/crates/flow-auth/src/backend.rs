//! The collaborator contract itself (spec §6.4): `Authenticate`/`User` are
//! "out of scope" for this crate's own implementation — callers plug in
//! their own backend (local table, LDAP, whatever), this crate only defines
//! the trait and the one error type both sides agree on.

use async_trait::async_trait;
use thiserror::Error;

use crate::privilege::Privilege;
use crate::user::User;

#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("user {0:?} not found")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn authenticate(&self, name: &str, password: &str) -> Result<User, AuthenticationError>;
    async fn user(&self, name: &str) -> Result<User, AuthenticationError>;
}

/// An in-memory backend for tests and single-node deployments without a
/// real user store wired up. Passwords are compared directly — not a
/// production credential store, just the minimal thing this crate itself
/// can stand behind without depending on a KDF crate the rest of the
/// workspace doesn't carry.
#[derive(Default)]
pub struct StaticBackend {
    users: std::collections::HashMap<String, (String, User)>,
}

impl StaticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, password: impl Into<String>, user: User) {
        self.users.insert(user.name.clone(), (password.into(), user));
    }
}

#[async_trait]
impl AuthBackend for StaticBackend {
    async fn authenticate(&self, name: &str, password: &str) -> Result<User, AuthenticationError> {
        match self.users.get(name) {
            Some((expected, user)) if expected == password => Ok(user.clone()),
            Some(_) => Err(AuthenticationError::AuthenticationFailed),
            None => Err(AuthenticationError::NotFound(name.to_string())),
        }
    }

    async fn user(&self, name: &str) -> Result<User, AuthenticationError> {
        self.users
            .get(name)
            .map(|(_, u)| u.clone())
            .ok_or_else(|| AuthenticationError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrong_password_is_authentication_failed() {
        let mut backend = StaticBackend::new();
        backend.add_user("hunter2", User::new("alice").with_db_privilege("telemetry", Privilege::READ));
        let err = backend.authenticate("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthenticationError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn correct_password_returns_user() {
        let mut backend = StaticBackend::new();
        backend.add_user("hunter2", User::new("alice"));
        let user = backend.authenticate("alice", "hunter2").await.unwrap();
        assert_eq!(user.name, "alice");
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let backend = StaticBackend::new();
        assert!(matches!(backend.user("ghost").await, Err(AuthenticationError::NotFound(_))));
    }
}
