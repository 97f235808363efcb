use tracing::info;

use huddle_server::config::{ServerConfig, StoreBackend};
use huddle_server::{build_app, open_store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug,huddle_server=debug,huddle_gateway=debug,huddle_api=debug,huddle_db=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let store = open_store(&config.store)?;
    match &config.store {
        StoreBackend::Sqlite(path) => info!("Message store: sqlite ({})", path.display()),
        StoreBackend::Memory => info!("Message store: memory (history is lost on restart)"),
    }
    info!(
        "History window {}, clear policy {}, auth {}",
        config.gateway.history_window,
        config.gateway.clear_policy,
        if config.jwt_secret.is_some() { "required" } else { "disabled" }
    );

    let (app, supervisor) = build_app(&config, store);

    info!("Huddle server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Listener and connections are gone
    supervisor.abort();
    info!("Huddle server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
