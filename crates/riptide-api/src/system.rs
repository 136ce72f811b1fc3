//! Session-wide endpoints: aggregate stats, DHT diagnostics, health,
//! metrics.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use serde::Serialize;
use tracing::error;

use riptide_api_models::SessionStatsView;
use riptide_core::engine::{DhtNodeInfo, DhtStats};

use crate::errors::ApiError;
use crate::state::ApiState;

#[derive(Serialize)]
pub(crate) struct DhtTableResponse {
    pub(crate) nodes: Vec<DhtNodeInfo>,
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) torrents: u64,
    pub(crate) uptime_seconds: u64,
}

pub(crate) async fn session_stats(State(state): State<Arc<ApiState>>) -> Json<SessionStatsView> {
    Json(SessionStatsView::from(state.handles.stats.session_totals()))
}

pub(crate) async fn dht_stats(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<DhtStats>, ApiError> {
    state.handles.engine.dht_stats().await.map(Json).map_err(
        |err| {
            error!(error = %err, "failed to query DHT stats");
            state.metrics.inc_api_error("internal");
            ApiError::internal("failed to query DHT stats")
        },
    )
}

pub(crate) async fn dht_table(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<DhtTableResponse>, ApiError> {
    match state.handles.engine.dht_table().await {
        Ok(nodes) => Ok(Json(DhtTableResponse { nodes })),
        Err(err) => {
            error!(error = %err, "failed to query DHT table");
            state.metrics.inc_api_error("internal");
            Err(ApiError::internal("failed to query DHT table"))
        }
    }
}

pub(crate) async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let totals = state.handles.stats.session_totals();
    Json(HealthResponse {
        status: "ok",
        torrents: u64::try_from(state.handles.registry.len()).unwrap_or(u64::MAX),
        uptime_seconds: totals.uptime_seconds,
    })
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    match state.metrics.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(body))
            .map_err(|err| {
                error!(error = %err, "failed to build metrics response");
                ApiError::internal("failed to build metrics response")
            }),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            Err(ApiError::internal("failed to render metrics"))
        }
    }
}
