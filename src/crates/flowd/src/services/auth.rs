//! Authentication/authorization service wiring (spec §6.4).
//!
//! Resolves the caller for `SecurityMode::UserLogin` requests and checks
//! fine-grained per-resource privileges via `flow_auth::authorize_action`.
//! Grounded on the teacher's `AuthServiceImpl`/`JwtManager` shape (a thin
//! wrapper owning a pluggable backend), stripped of the hand-rolled JWT and
//! pointed at `flow-auth`'s real privilege model instead.

use std::sync::Arc;

use flow_auth::{authorize_action, Action, AuthBackend, AuthError, AuthenticationError, Method, StaticBackend, User};

/// Map an HTTP method onto the `flow-auth` method enum `authorize_action`
/// understands. Methods outside the admin surface's vocabulary (`PUT`,
/// `CONNECT`, ...) have no privilege mapping and are rejected upstream.
pub fn method_from_http(m: &axum::http::Method) -> Option<Method> {
    match m.as_str() {
        "GET" => Some(Method::Get),
        "POST" => Some(Method::Post),
        "PATCH" | "PUT" => Some(Method::Patch),
        "DELETE" => Some(Method::Delete),
        "HEAD" => Some(Method::Head),
        "OPTIONS" => Some(Method::Options),
        _ => None,
    }
}

/// Wraps an `AuthBackend` collaborator with the request-facing
/// authenticate + authorize flow `SecurityMode::UserLogin` drives.
pub struct AuthService {
    backend: Arc<dyn AuthBackend>,
}

impl AuthService {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self { backend }
    }

    /// A backend with no users configured, for deployments running under
    /// `SecurityMode::Open`/`SecretKey` that never consult it.
    pub fn empty() -> Self {
        Self::new(Arc::new(StaticBackend::new()))
    }

    pub async fn authenticate(&self, name: &str, password: &str) -> Result<User, AuthenticationError> {
        self.backend.authenticate(name, password).await
    }

    pub fn authorize(&self, user: &User, resource: &str, method: Method) -> Result<(), AuthError> {
        authorize_action(user, &Action { resource: resource.to_string(), method })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_auth::Privilege;

    #[tokio::test]
    async fn empty_backend_rejects_every_user() {
        let svc = AuthService::empty();
        assert!(svc.authenticate("alice", "hunter2").await.is_err());
    }

    #[tokio::test]
    async fn authenticated_user_is_authorized_by_privilege() {
        let mut backend = StaticBackend::new();
        backend.add_user("hunter2", User::new("alice").with_action_privilege("/tasks", Privilege::READ));
        let svc = AuthService::new(Arc::new(backend));

        let user = svc.authenticate("alice", "hunter2").await.unwrap();
        assert!(svc.authorize(&user, "/tasks", Method::Get).is_ok());
        assert!(svc.authorize(&user, "/tasks", Method::Delete).is_err());
    }

    #[test]
    fn method_from_http_maps_put_to_patch() {
        assert!(matches!(method_from_http(&axum::http::Method::PUT), Some(Method::Patch)));
        assert!(method_from_http(&axum::http::Method::CONNECT).is_none());
    }
}
