use crate::config::ServerConfig;
use crate::middleware;
use crate::response::HttpResponse;
use crate::router::Router;
use axum::extract::{Request, State};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Wraps the router in the transport layers: request id, logging,
/// metrics and tracing.
pub fn app(router: Arc<Router>, config: &ServerConfig) -> axum::Router {
    axum::Router::new()
        .fallback(dispatch)
        .with_state(router)
        .layer(axum::middleware::from_fn(
            middleware::create_logging_middleware(
                config.logging.clone(),
                config.max_content_length,
            ),
        ))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(axum::middleware::from_fn(middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

async fn dispatch(State(router): State<Arc<Router>>, request: Request) -> HttpResponse {
    router.handle(request).await
}

/// Binds the configured address and serves until Ctrl+C or SIGTERM.
pub async fn serve(router: Router, config: &ServerConfig) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Starting server on {}", bind_addr);

    axum::serve(listener, app(Arc::new(router), config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped gracefully");
    Ok(())
}

/// Handle shutdown signals for graceful termination
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully");
        },
    }

    tracing::info!("Draining connections...");
    tokio::time::sleep(Duration::from_secs(1)).await;
}
