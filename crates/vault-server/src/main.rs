mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;

use vault_api::auth::{AppState, AppStateInner, ensure_admin};
use vault_crypto::Codec;
use vault_db::Database;

use crate::config::Config;

const DEFAULT_LOG_FILTER: &str = "vault=debug,vault_api=debug,vault_db=info,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::open(&PathBuf::from(&config.db_path))?;
    info!("Database ready at {}", config.db_path);

    if let Some(admin) = &config.admin {
        ensure_admin(&db, &admin.username, &admin.email, &admin.password)?;
    }

    let state: AppState = Arc::new(AppStateInner {
        db,
        codec: Codec::from_secret(&config.secret_key),
        jwt_secret: config.secret_key.clone(),
        secure_cookies: config.secure_cookies,
    });

    let app = vault_api::router(state, config.max_upload_bytes).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Vault listening on {}", addr);
    info!("Upload limit: {} bytes", config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("No SIGTERM handler ({}); Ctrl+C only", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
