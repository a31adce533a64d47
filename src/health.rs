use axum::Router;
use axum::routing::get;
use error_stack::{Report, ResultExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::HealthError;

/// Liveness routes. Independent of tick state: answers as long as the
/// process is up.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .fallback(|| async { "spread-notifier is awake" })
}

/// Bind `port` on all interfaces. Kept separate from [`serve`] so a busy port
/// fails startup instead of a background task.
pub async fn bind(port: u16) -> Result<TcpListener, Report<HealthError>> {
    TcpListener::bind(("0.0.0.0", port))
        .await
        .change_context(HealthError::Bind)
        .attach_with(|| format!("port: {port}"))
}

pub async fn serve(listener: TcpListener, cancel: CancellationToken) -> Result<(), Report<HealthError>> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "health endpoint listening");
    }
    axum::serve(listener, router())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .change_context(HealthError::Serve)
}
