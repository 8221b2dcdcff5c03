//! Configuration module for `flowd`
//!
//! - Environment variable expansion and file includes (`loader`)
//! - Server configuration: SSL/TLS, security, database, LDAP (`server`, spec §6.5)

pub mod loader;
pub mod server;

pub use loader::{deep_merge, load_yaml_config, load_yaml_file};
pub use server::{
    DatabaseConfig, LdapConfig, SecurityConfig, SecurityMode, ServerConfig, ServerConfigError,
    SslConfig, SslMode, X509Config,
};
pub use server::ldap::{LdapClient, LdapError};
pub use server::security::{SecurityState, security_middleware};
pub use server::ssl::{setup_ssl_certificates, SslCertPaths, SslError};
