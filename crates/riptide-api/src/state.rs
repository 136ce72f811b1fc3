//! Shared application state for the control API.

use std::sync::Arc;

use riptide_core::engine::TransferEngine;
use riptide_core::error::ControlError;
use riptide_core::lifecycle::LifecycleController;
use riptide_core::registry::Registry;
use riptide_core::stats::StatsAggregator;
use riptide_telemetry::Metrics;

use crate::errors::ApiError;

/// Handles exposing the session core to the HTTP layer.
#[derive(Clone)]
pub struct SessionHandles {
    /// The torrent table.
    pub registry: Arc<Registry>,
    /// The lifecycle controller.
    pub controller: Arc<LifecycleController>,
    /// The stats aggregator.
    pub stats: Arc<StatsAggregator>,
    /// The transport engine (DHT diagnostics).
    pub engine: Arc<dyn TransferEngine>,
}

pub(crate) struct ApiState {
    pub(crate) handles: SessionHandles,
    pub(crate) metrics: Metrics,
    /// Lower-cased media extensions used by playlist rendering.
    pub(crate) playlist_extensions: Vec<String>,
}

impl ApiState {
    pub(crate) fn new(
        handles: SessionHandles,
        metrics: Metrics,
        playlist_extensions: Vec<String>,
    ) -> Self {
        Self {
            handles,
            metrics,
            playlist_extensions: playlist_extensions
                .into_iter()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Convert a controller error into its API problem, counting it.
    pub(crate) fn control_error(&self, error: &ControlError) -> ApiError {
        self.metrics.inc_api_error(error.kind());
        ApiError::from_control(error)
    }
}
