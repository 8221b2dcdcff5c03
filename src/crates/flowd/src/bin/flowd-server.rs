//! `flowd` server binary: loads configuration, restores previously-enabled
//! tasks, and serves the HTTP admin surface (spec §4.1, §6.1, §6.2, §6.5).

use std::net::SocketAddr;
use std::sync::Arc;

use flowd::api::routes::create_router;
use flowd::config::{setup_ssl_certificates, LdapClient, SecurityState, ServerConfig};
use flowd::db::{repositories::TaskRepository, DatabaseConnection};
use flowd::services::AuthService;
use flowd::taskmaster::{self, Collaborators, DbRp, TaskKind, TaskMaster};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    tracing::info!("Loading server configuration...");
    let config = match ServerConfig::load() {
        Ok(cfg) => {
            tracing::info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            return Err(format!("Configuration required: {e}. Set CONFIG_PATH or place config/orchestrator-server.toml").into());
        }
    };

    tracing::info!("SSL Mode: {:?}", config.ssl.mode);
    tracing::info!("Security Mode: {:?}", config.security.mode);
    tracing::info!("LDAP Enabled: {}", config.ldap.enabled);
    tracing::info!("Database Path: {}", config.database.path);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string()).parse::<u16>().expect("PORT must be a valid u16");
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    let database_url = config.database_url();
    tracing::info!("Connecting to database: {}", database_url);
    let db = DatabaseConnection::new(&database_url).await?;

    if config.ssl.mode == flowd::config::SslMode::Auto || config.ssl.mode == flowd::config::SslMode::Pem {
        match setup_ssl_certificates(&config.ssl, None) {
            Ok(paths) => tracing::info!("SSL certificates configured: {:?}", paths.cert),
            Err(e) => tracing::warn!("SSL certificate setup failed: {}. Server will run without SSL.", e),
        }
    }

    // UserLogin mode with no user-store collaborator wired up denies every
    // request by default (spec §6.4 "no matching prefix denies") rather
    // than the open-everything stance an absent backend would otherwise
    // tempt; operators who need real users configure an `AuthBackend`
    // collaborator before enabling `UserLogin`.
    let security_state = Arc::new(SecurityState::new(config.security.clone(), Arc::new(AuthService::empty())));
    tracing::info!("Security mode: {:?}", security_state.mode());

    let _ldap_client = if config.ldap.enabled {
        let mut client = LdapClient::new(config.ldap.clone());
        if let Err(e) = client.connect().await {
            tracing::warn!("LDAP connection failed: {}. LDAP authentication disabled.", e);
            None
        } else {
            tracing::info!("LDAP authentication enabled");
            Some(client)
        }
    } else {
        None
    };

    tracing::info!("Running database migrations");
    db.run_migrations().await?;

    tracing::info!("Performing database health check");
    db.health_check().await?;

    let task_master = Arc::new(TaskMaster::new());
    let collaborators = Arc::new(Collaborators::default());

    restore_enabled_tasks(&db, &task_master, &collaborators).await;

    tracing::info!("Building API router");
    let app = create_router(db, task_master, collaborators, security_state);

    tracing::info!("Starting flowd server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app.into_make_service()).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("flowd server shut down gracefully");
    Ok(())
}

/// Re-`StartTask` every definition left `enabled` from a prior run, so a
/// restart resumes the same set of running tasks (spec §4.1).
async fn restore_enabled_tasks(db: &DatabaseConnection, task_master: &Arc<TaskMaster>, collaborators: &Arc<Collaborators>) {
    let pool = db.pool();
    let records = match TaskRepository::list_enabled(pool).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!("failed to load enabled tasks: {e}");
            return;
        }
    };

    for record in records {
        let kind = if record.kind == "batch" { TaskKind::Batch } else { TaskKind::Stream };
        let dbrp: Vec<flowd::api::models::DbRpDto> = serde_json::from_str(&record.dbrp).unwrap_or_default();
        let dbrp: Vec<DbRp> = dbrp.into_iter().map(|d| DbRp { database: d.database, retention_policy: d.retention_policy }).collect();
        let vars = serde_json::from_str(&record.vars).unwrap_or_default();

        let spec = match taskmaster::new_task(record.name.clone(), &record.script, kind, dbrp, record.ttl, vars, collaborators) {
            Ok(spec) => spec,
            Err(e) => {
                tracing::warn!(task = %record.name, "failed to compile restored task: {e}");
                continue;
            }
        };

        if let Err(e) = task_master.start_task(spec) {
            tracing::warn!(task = %record.name, "failed to restart task: {e}");
        } else {
            tracing::info!(task = %record.name, "restored task");
        }
    }
}

/// Signal for graceful shutdown (Ctrl-C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("Failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received CTRL-C signal, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down");
        }
    }
}
