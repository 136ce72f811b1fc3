//! Router construction and server host for the control API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    Router,
    http::{Method, Request, header::CONTENT_TYPE},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::Span;

use riptide_telemetry::Metrics;

use crate::state::{ApiState, SessionHandles};
use crate::system::{dht_stats, dht_table, health, metrics, session_stats};
use crate::torrents::{
    add_torrent, batch_torrents, delete_torrent, forget_torrent, get_playlist, get_torrent,
    get_torrent_stats, list_torrents, pause_torrent, start_torrent,
};

/// Axum router wrapper that hosts the control API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Construct a server with shared dependencies wired through
    /// application state.
    #[must_use]
    pub fn new(
        handles: SessionHandles,
        metrics: Metrics,
        playlist_extensions: Vec<String>,
    ) -> Self {
        let state = Arc::new(ApiState::new(handles, metrics, playlist_extensions));

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE]);
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );

        let router = Self::build_router()
            .layer(trace_layer)
            .layer(cors_layer)
            .with_state(state);
        Self { router }
    }

    fn build_router() -> Router<Arc<ApiState>> {
        Router::new()
            .route("/torrents", get(list_torrents).post(add_torrent))
            .route("/torrents/batch/{op}", post(batch_torrents))
            .route("/torrents/{id}", get(get_torrent))
            .route("/torrents/{id}/stats", get(get_torrent_stats))
            .route("/torrents/{id}/start", post(start_torrent))
            .route("/torrents/{id}/pause", post(pause_torrent))
            .route("/torrents/{id}/delete", post(delete_torrent))
            .route("/torrents/{id}/forget", post(forget_torrent))
            .route("/torrents/{id}/playlist", get(get_playlist))
            .route("/stats", get(session_stats))
            .route("/dht/stats", get(dht_stats))
            .route("/dht/table", get(dht_table))
            .route("/health", get(health))
            .route("/metrics", get(metrics))
    }

    /// Serve the API on the supplied address until the task is aborted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server
    /// terminates unexpectedly.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        tracing::info!("starting control API on {addr}");
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router.into_make_service()).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) const fn router(&self) -> &Router {
        &self.router
    }
}
