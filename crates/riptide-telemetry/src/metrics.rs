//! Prometheus-backed metrics registry shared across services.

use std::sync::Arc;

use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

/// Cheap-to-clone handle over the daemon's metric collectors.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    active_torrents: IntGauge,
    torrents_by_state: IntGaugeVec,
    session_download_bps: IntGauge,
    session_upload_bps: IntGauge,
    api_errors_total: IntCounterVec,
}

impl Metrics {
    /// Construct a registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any collector cannot be registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let active_torrents =
            IntGauge::with_opts(Opts::new("active_torrents", "Number of tracked torrents"))?;
        let torrents_by_state = IntGaugeVec::new(
            Opts::new("torrents_by_state", "Tracked torrents per lifecycle state"),
            &["state"],
        )?;
        let session_download_bps = IntGauge::with_opts(Opts::new(
            "session_download_bps",
            "Aggregate download rate in bytes per second",
        ))?;
        let session_upload_bps = IntGauge::with_opts(Opts::new(
            "session_upload_bps",
            "Aggregate upload rate in bytes per second",
        ))?;
        let api_errors_total = IntCounterVec::new(
            Opts::new("api_errors_total", "Control API errors by problem kind"),
            &["kind"],
        )?;

        registry.register(Box::new(active_torrents.clone()))?;
        registry.register(Box::new(torrents_by_state.clone()))?;
        registry.register(Box::new(session_download_bps.clone()))?;
        registry.register(Box::new(session_upload_bps.clone()))?;
        registry.register(Box::new(api_errors_total.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                active_torrents,
                torrents_by_state,
                session_download_bps,
                session_upload_bps,
                api_errors_total,
            }),
        })
    }

    /// Record the current number of tracked torrents.
    pub fn set_active_torrents(&self, count: i64) {
        self.inner.active_torrents.set(count);
    }

    /// Record the number of torrents in one lifecycle state.
    pub fn set_state_count(&self, state: &str, count: i64) {
        self.inner
            .torrents_by_state
            .with_label_values(&[state])
            .set(count);
    }

    /// Record the aggregate transfer rates.
    pub fn set_session_rates(&self, download_bps: u64, upload_bps: u64) {
        self.inner
            .session_download_bps
            .set(i64::try_from(download_bps).unwrap_or(i64::MAX));
        self.inner
            .session_upload_bps
            .set(i64::try_from(upload_bps).unwrap_or(i64::MAX));
    }

    /// Count one API error of the given problem kind.
    pub fn inc_api_error(&self, kind: &str) {
        self.inner.api_errors_total.with_label_values(&[kind]).inc();
    }

    /// Render the registry in the prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn render(&self) -> Result<String> {
        let metrics = self.inner.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metrics, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
