use std::net::SocketAddr;

use tokio::sync::watch;

use crate::error::Result;

use super::AppState;
use super::routes::create_router;

/// Serve the API on `bind` until `shutdown_rx` turns true
pub async fn start_server(bind: SocketAddr, state: AppState, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
    let app = create_router().with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    log::info!("Routebook API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_rx))
        .await?;

    Ok(())
}

async fn shutdown_signal(mut shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
    log::info!("Shutting down API server");
}
