//! Security configuration and middleware
//!
//! Handles different security modes: open, secret-key, and user-login.

use crate::config::{SecurityConfig, SecurityMode};
use crate::services::auth::{method_from_http, AuthService};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use tracing::warn;

/// Security middleware state
#[derive(Clone)]
pub struct SecurityState {
    config: Arc<SecurityConfig>,
    auth: Arc<AuthService>,
}

impl SecurityState {
    pub fn new(config: SecurityConfig, auth: Arc<AuthService>) -> Self {
        Self {
            config: Arc::new(config),
            auth,
        }
    }

    pub fn mode(&self) -> SecurityMode {
        self.config.mode
    }

    pub fn get_secret_key(&self) -> Option<String> {
        std::env::var("SECRET_KEY")
            .ok()
            .or_else(|| self.config.secret_key.clone())
    }
}

/// Decode a `Basic base64(username:password)` `Authorization` header.
fn decode_basic_auth(header: &str) -> Option<(String, String)> {
    use base64::Engine;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Security middleware for Axum
pub async fn security_middleware(
    State(state): State<Arc<SecurityState>>,
    request: Request,
    next: Next,
) -> Response {
    match state.mode() {
        SecurityMode::Open => {
            // No authentication required
            next.run(request).await
        }
        SecurityMode::SecretKey => {
            // Check for API key in headers
            if let Some(auth_header) = request.headers().get("Authorization") {
                if let Ok(auth_str) = auth_header.to_str() {
                    if let Some(key) = auth_str.strip_prefix("Bearer ") {
                        if let Some(expected_key) = state.get_secret_key() {
                            if key == expected_key {
                                return next.run(request).await;
                            }
                        }
                    }
                }
            }
            
            // Return 401 Unauthorized
            warn!("Unauthorized request - missing or invalid API key");
            Response::builder()
                .status(401)
                .body("Unauthorized".into())
                .unwrap()
        }
        SecurityMode::UserLogin => {
            let Some(method) = method_from_http(request.method()) else {
                return Response::builder().status(405).body("Method Not Allowed".into()).unwrap();
            };

            let auth_header = request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .and_then(decode_basic_auth);

            let Some((username, password)) = auth_header else {
                warn!("unauthorized request: missing or malformed Basic auth header");
                return Response::builder()
                    .status(401)
                    .header("WWW-Authenticate", "Basic")
                    .body("Unauthorized".into())
                    .unwrap();
            };

            let user = match state.auth.authenticate(&username, &password).await {
                Ok(user) => user,
                Err(e) => {
                    warn!(user = %username, error = %e, "authentication failed");
                    return Response::builder().status(401).body("Unauthorized".into()).unwrap();
                }
            };

            let resource = request.uri().path();
            if let Err(e) = state.auth.authorize(&user, resource, method) {
                warn!(user = %username, resource, "forbidden: {e}");
                return Response::builder().status(403).body("Forbidden".into()).unwrap();
            }

            next.run(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_state() {
        let config = SecurityConfig {
            mode: SecurityMode::SecretKey,
            secret_key: Some("test-key".to_string()),
        };
        let state = SecurityState::new(config, Arc::new(AuthService::empty()));
        assert_eq!(state.mode(), SecurityMode::SecretKey);
        assert_eq!(state.get_secret_key(), Some("test-key".to_string()));
    }

    #[test]
    fn basic_auth_header_decodes_user_and_password() {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode("alice:hunter2");
        let header = format!("Basic {encoded}");
        assert_eq!(decode_basic_auth(&header), Some(("alice".to_string(), "hunter2".to_string())));
        assert_eq!(decode_basic_auth("Bearer xyz"), None);
    }
}

