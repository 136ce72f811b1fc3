//! Service wiring: configuration, telemetry, event bus, engine, session
//! core, and the control API, with a ctrl-c driven shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use riptide_api::{ApiServer, SessionHandles};
use riptide_config::Config;
use riptide_core::engine::TransferEngine;
use riptide_core::lifecycle::{LifecycleController, LifecyclePolicy};
use riptide_core::registry::Registry;
use riptide_core::stats::StatsAggregator;
use riptide_engine::TransportEngine;
use riptide_events::EventBus;
use riptide_telemetry::{LogFormat, LoggingConfig, Metrics, init_logging};

/// Convenience alias for application-level results.
pub type AppResult<T> = anyhow::Result<T>;

/// Load configuration, wire every service, and serve the control API
/// until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error when configuration is malformed, telemetry cannot be
/// installed, or the API server fails.
pub async fn run_app() -> AppResult<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_logging(&LoggingConfig {
        level: &config.log_level,
        format: log_format(config.log_json),
    })
    .context("failed to initialise logging")?;
    info!(addr = %config.listen_addr(), "riptide starting");

    let services = Services::build(&config)?;
    let aggregator = tokio::spawn(
        Arc::clone(&services.handles.stats).run(config.stats_interval(), services.events.subscribe()),
    );
    let gauges = tokio::spawn(refresh_gauges(
        Arc::clone(&services.handles.stats),
        services.metrics.clone(),
        config.stats_interval(),
    ));

    let server = ApiServer::new(
        services.handles,
        services.metrics,
        config.playlist_extensions.clone(),
    );
    let outcome = tokio::select! {
        result = server.serve(config.listen_addr()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    aggregator.abort();
    gauges.abort();
    outcome
}

/// Fully wired session services, shared between the background tasks and
/// the API server.
pub(crate) struct Services {
    pub(crate) handles: SessionHandles,
    pub(crate) events: EventBus,
    pub(crate) metrics: Metrics,
}

impl Services {
    pub(crate) fn build(config: &Config) -> AppResult<Self> {
        let events = EventBus::new();
        let metrics = Metrics::new().context("failed to build the metrics registry")?;
        let registry = Arc::new(Registry::new(config.allow_duplicates));
        let engine: Arc<dyn TransferEngine> = Arc::new(TransportEngine::new(events.clone()));
        let controller = Arc::new(LifecycleController::new(
            Arc::clone(&registry),
            Arc::clone(&engine),
            events.clone(),
            LifecyclePolicy {
                strict_start: config.strict_start,
            },
            config.ack_timeout(),
            config.output_dir.clone(),
        ));
        let stats = Arc::new(StatsAggregator::new(
            Arc::clone(&registry),
            Arc::clone(&engine),
        ));
        Ok(Self {
            handles: SessionHandles {
                registry,
                controller,
                stats,
                engine,
            },
            events,
            metrics,
        })
    }
}

const fn log_format(log_json: bool) -> LogFormat {
    if log_json {
        LogFormat::Json
    } else {
        LogFormat::infer()
    }
}

/// Push aggregator totals into the prometheus gauges on the stats
/// cadence.
async fn refresh_gauges(stats: Arc<StatsAggregator>, metrics: Metrics, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let totals = stats.session_totals();
        metrics.set_active_torrents(gauge(totals.torrents));
        metrics.set_state_count("initializing", gauge(totals.initializing));
        metrics.set_state_count("running", gauge(totals.running));
        metrics.set_state_count("paused", gauge(totals.paused));
        metrics.set_state_count("completed", gauge(totals.completed));
        metrics.set_state_count("failed", gauge(totals.failed));
        metrics.set_session_rates(totals.download_bps, totals.upload_bps);
    }
}

fn gauge(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use riptide_core::lifecycle::{AddTorrent, AddTorrentOptions};
    use riptide_core::model::TorrentSpec;

    #[test]
    fn log_format_prefers_json_when_asked() {
        assert_eq!(log_format(true), LogFormat::Json);
        assert_eq!(log_format(false), LogFormat::infer());
    }

    #[tokio::test]
    async fn services_wire_into_a_working_controller() -> AppResult<()> {
        let services = Services::build(&Config::default())?;
        let id = services
            .handles
            .controller
            .add(AddTorrent {
                spec: TorrentSpec::magnet(
                    "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=wiring",
                ),
                options: AddTorrentOptions::default(),
            })
            .await?;

        let entry = services.handles.registry.get(id).expect("tracked");
        assert_eq!(entry.meta().name.as_deref(), Some("wiring"));
        assert_eq!(
            entry.meta().output_dir,
            Config::default().output_dir,
            "default output directory flows through"
        );
        Ok(())
    }
}
