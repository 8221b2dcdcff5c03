//! Privilege/authorization model (spec §6.4). Pure and transport-agnostic:
//! the HTTP admin surface in `flowd` consumes `authorize_action`/
//! `authorize_db` at the edge; this crate carries no network code of its
//! own.

pub mod authorize;
pub mod backend;
pub mod privilege;
pub mod user;

pub use authorize::{authorize_action, normalize_path, Action, AuthError, Method};
pub use backend::{AuthBackend, AuthenticationError, StaticBackend};
pub use privilege::Privilege;
pub use user::{User, SUBSCRIPTION_USER_PREFIX};
