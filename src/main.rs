use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use request_logger::{
    config::{resolve_config_file, watcher::ConfigWatcher, AppConfig, DEFAULT_CONFIG_PATH},
    create_app, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let initial_config = AppConfig::load()?;
    info!(
        patterns = ?initial_config.logging.url_patterns,
        "Initial configuration loaded successfully"
    );

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config_watcher = if resolve_config_file(&config_path).is_some() {
        info!("Hot-reloading enabled for configuration file: {}", config_path);
        Arc::new(ConfigWatcher::new(&config_path, initial_config.clone())?)
    } else {
        warn!(
            "Configuration file {} not found, using defaults without hot-reload",
            config_path
        );
        Arc::new(ConfigWatcher::unwatched(initial_config.clone()))
    };

    let watcher = config_watcher.clone();
    tokio::spawn(async move {
        let mut reload_rx = watcher.subscribe_to_reloads();
        while let Ok(new_config) = reload_rx.recv().await {
            info!(
                enabled = new_config.logging.enabled,
                patterns = ?new_config.logging.url_patterns,
                "Request logging settings updated"
            );
        }
    });

    let app = create_app(AppState::new(config_watcher)).await;

    let addr = format!("{}:{}", initial_config.server.host, initial_config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Request logger listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(filter);

    match log_format.as_str() {
        "json" => subscriber.with(tracing_subscriber::fmt::layer().json()).init(),
        _ => subscriber.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown signal received");
}
