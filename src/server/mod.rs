use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::session::RebuildSession;

pub mod routes;

/// Routes over the session's latest graph
pub fn router(session: Arc<RebuildSession>) -> Router {
    Router::new()
        .route("/graph", get(routes::get_graph))
        .route("/elements", get(routes::get_elements))
        .route("/stats", get(routes::get_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(session)
}

/// Serve until the listener fails. Rebuilds happen elsewhere; the server only reads.
pub async fn start_server(port: u16, session: Arc<RebuildSession>) -> anyhow::Result<()> {
    let app = router(session);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
