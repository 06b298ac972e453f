use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notes_rs::{config::Config, routes, AppContainer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        service = %config.service_name,
        host = %config.host,
        port = config.port,
        bus_type = ?config.bus_type,
        store_type = ?config.store_type,
        "Starting notes service"
    );

    let addr = format!("{}:{}", config.host, config.port);
    let container = Arc::new(AppContainer::init(config).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = container.start_consumers(shutdown_rx);

    let app = routes::router(container.clone());
    let served = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => {
            tracing::info!(%addr, "listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
        }
        Err(e) => Err(e),
    };

    let _ = shutdown_tx.send(true);
    match consumer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "User events consumer stopped with error"),
        Err(e) => tracing::error!(error = %e, "User events consumer task panicked"),
    }
    container.close().await;

    served?;
    tracing::info!("Notes service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received");
}
