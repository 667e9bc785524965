// ABOUTME: HTTP tool server exposing sandbox operations to the remote caller
// ABOUTME: Router construction plus start/stop with graceful shutdown

pub mod handlers;
pub mod resolve;
pub mod response;

use axum::routing::{get, post};
use axum::Router;
use relay_sandbox::SandboxAdapter;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind tool server: {0}")]
    Bind(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// A running tool server. Dropping the handle leaves the server
/// running; call `stop()` for a graceful shutdown.
pub struct ToolServerHandle {
    pub local_url: String,
    pub port: u16,
    join_handle: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

impl ToolServerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.join_handle.await;
        info!("Tool server stopped");
    }
}

pub fn create_router(adapter: Arc<SandboxAdapter>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/execute", post(handlers::execute))
        .route("/upload", post(handlers::upload))
        .route("/download", post(handlers::download))
        .route("/check-file", post(handlers::check_file))
        .layer(CorsLayer::permissive())
        .with_state(adapter)
}

/// Bind and serve on localhost. Port 0 asks the OS for an ephemeral
/// port; the handle reports the one actually bound.
pub async fn start_server(adapter: Arc<SandboxAdapter>, port: u16) -> Result<ToolServerHandle> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let port = listener.local_addr()?.port();
    let local_url = format!("http://localhost:{port}");
    info!("Tool server listening on {}", local_url);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let router = create_router(adapter);

    let join_handle = tokio::spawn(async move {
        let serve = axum::serve(listener, router).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = serve.await {
            error!("Tool server error: {}", e);
        }
    });

    Ok(ToolServerHandle {
        local_url,
        port,
        join_handle,
        shutdown_tx,
    })
}
