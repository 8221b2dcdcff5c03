//! `AuthorizeAction` (spec §6.4) — the normative path-prefix-walk contract,
//! including the traversal-blocking path normalization it requires before
//! matching.

use thiserror::Error;

use crate::privilege::Privilege;
use crate::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    /// The privilege a method requires, or `None` if the method doesn't map
    /// to one at all (`Head`/`Options` are handled separately, before this
    /// is consulted).
    fn required_privilege(self) -> Option<Privilege> {
        match self {
            Method::Get => Some(Privilege::READ),
            Method::Post | Method::Patch => Some(Privilege::WRITE),
            Method::Delete => Some(Privilege::DELETE),
            Method::Head | Method::Options => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Action {
    pub resource: String,
    pub method: Method,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid method for action authorization")]
    InvalidMethod,
    #[error("resource {0:?} is not an absolute path")]
    InvalidResource(String),
    #[error("user {user:?} lacks {required} on {resource:?}")]
    Denied {
        user: String,
        required: Privilege,
        resource: String,
    },
}

/// Collapse `.`/`..` segments and drop trailing slashes. Run before any
/// privilege matching — spec §6.4 step 4, the step that blocks traversal
/// attacks such as `/a/b/c/../../d/e/f`.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Every prefix of `path` from the full path down to `/`, most specific
/// first. `/a/b/c` yields `["/a/b/c", "/a/b", "/a", "/"]`.
fn prefixes(path: &str) -> Vec<String> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return vec!["/".to_string()];
    }
    let parts: Vec<&str> = trimmed.split('/').collect();
    let mut out = Vec::with_capacity(parts.len() + 1);
    for i in (0..parts.len()).rev() {
        out.push(format!("/{}", parts[..=i].join("/")));
    }
    out.push("/".to_string());
    out
}

/// The normative contract: normalize, walk prefixes from most to least
/// specific, stop at the first match (allow or deny) — the most specific
/// hit always wins, even if it's a deny.
pub fn authorize_action(user: &User, action: &Action) -> Result<(), AuthError> {
    if user.admin {
        return Ok(());
    }

    if matches!(action.method, Method::Head | Method::Options) {
        return Ok(());
    }

    let Some(required) = action.method.required_privilege() else {
        return Err(AuthError::InvalidMethod);
    };

    if !action.resource.starts_with('/') {
        return Err(AuthError::InvalidResource(action.resource.clone()));
    }

    let normalized = normalize_path(&action.resource);

    for prefix in prefixes(&normalized) {
        if let Some(p) = user.action_privileges.get(&prefix) {
            return if p.allows(required) {
                Ok(())
            } else {
                Err(AuthError::Denied {
                    user: user.name.clone(),
                    required,
                    resource: normalized,
                })
            };
        }
    }

    Err(AuthError::Denied {
        user: user.name.clone(),
        required,
        resource: normalized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(resource: &str, method: Method) -> Action {
        Action { resource: resource.to_string(), method }
    }

    /// Spec §8 "Authorize path-prefix": privileges `{"/": All, "/a/b/c":
    /// Write}`; `GET /a/b/c` is denied (specific hit wins over root);
    /// `GET /a/b` is allowed; `GET /a/b/c/../../d/e/f` normalizes to
    /// `/a/d/e/f` and falls back to root-allow.
    #[test]
    fn path_prefix_most_specific_hit_wins() {
        let user = User::new("alice")
            .with_action_privilege("/", Privilege::ALL)
            .with_action_privilege("/a/b/c", Privilege::WRITE);

        assert!(authorize_action(&user, &action("/a/b/c", Method::Get)).is_err());
        assert!(authorize_action(&user, &action("/a/b", Method::Get)).is_ok());
        assert!(authorize_action(&user, &action("/a/b/c/../../d/e/f", Method::Get)).is_ok());
    }

    #[test]
    fn normalize_collapses_dot_dot_and_trailing_slash() {
        assert_eq!(normalize_path("/a/b/c/../../d/e/f"), "/a/d/e/f");
        assert_eq!(normalize_path("/a/b/"), "/a/b");
        assert_eq!(normalize_path("/a/./b"), "/a/b");
        assert_eq!(normalize_path("/../.."), "/");
    }

    #[test]
    fn head_and_options_are_unconditionally_allowed() {
        let user = User::new("nobody");
        assert!(authorize_action(&user, &action("/anything", Method::Head)).is_ok());
        assert!(authorize_action(&user, &action("/anything", Method::Options)).is_ok());
    }

    #[test]
    fn admin_short_circuits_every_check() {
        let user = User::new("root").admin();
        assert!(authorize_action(&user, &action("/secret", Method::Delete)).is_ok());
    }

    #[test]
    fn no_matching_prefix_denies() {
        let user = User::new("alice").with_action_privilege("/a", Privilege::ALL);
        assert!(authorize_action(&user, &action("/b", Method::Get)).is_err());
    }

    #[test]
    fn non_absolute_resource_is_a_hard_error() {
        let user = User::new("alice").with_action_privilege("/", Privilege::ALL);
        let err = authorize_action(&user, &action("relative/path", Method::Get)).unwrap_err();
        assert!(matches!(err, AuthError::InvalidResource(_)));
    }
}
