//! Collaborator services that wrap external crates for the HTTP admin
//! surface and its middleware (spec §6.4).

pub mod auth;

pub use auth::{method_from_http, AuthService};
