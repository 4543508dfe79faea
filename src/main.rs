use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chat_relay_service::config::{LoggingConfig, Settings};
use chat_relay_service::postgres::PostgresPool;
use chat_relay_service::server::{create_app, AppState};
use chat_relay_service::store::{create_message_store, PostgresMessageStore};
use chat_relay_service::tasks::HeartbeatTask;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    init_tracing(&settings.logging);
    tracing::info!("Configuration loaded");

    // PostgreSQL is only needed for the postgres message store
    let postgres_pool = match (&settings.database, settings.store.backend.as_str()) {
        (Some(database), "postgres") => {
            let pool = PostgresPool::new(database).await?;
            PostgresMessageStore::new(pool.pool().clone()).migrate().await?;
            Some(pool)
        }
        _ => None,
    };

    let store = create_message_store(&settings.store, postgres_pool.as_ref());
    tracing::info!(backend = store.backend_type(), "Message store ready");

    let state = AppState::with_store(settings.clone(), store);
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let heartbeat_task = HeartbeatTask::new(
        settings.websocket.clone(),
        state.presence.clone(),
        shutdown_tx.subscribe(),
    );
    let heartbeat_handle = tokio::spawn(async move {
        heartbeat_task.run().await;
    });

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    let _ = heartbeat_handle.await;

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    let _ = shutdown_tx.send(());
}
