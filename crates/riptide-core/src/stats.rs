//! Stats aggregation decoupled from API reads.
//!
//! The aggregator is an independent, continuously scheduled activity: it
//! folds engine events into registry entries as they arrive and polls
//! cumulative transfer counters on a fixed interval, deriving rates from
//! counter deltas. Reads always return the most recent snapshot and never
//! wait on a refresh.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::TransferEngine;
use crate::error::EngineError;
use crate::model::{TransferTotals, to_f64};
use crate::registry::{Registry, TorrentEntry};
use riptide_events::{Event, EventStream, TorrentId, TorrentState};

/// Point-in-time live statistics for one torrent.
///
/// Safe to hand out by value: a snapshot never references the live
/// aggregation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentStats {
    /// Lifecycle state at snapshot time.
    pub state: TorrentState,
    /// Total payload size in bytes, zero while metadata is pending.
    pub total_bytes: u64,
    /// Payload bytes completed, clamped to the total once it is known.
    pub progress_bytes: u64,
    /// Download rate in bytes per second.
    pub download_bps: u64,
    /// Upload rate in bytes per second.
    pub upload_bps: u64,
    /// Peers currently connected.
    pub peers_live: u32,
    /// Peers observed over the torrent's lifetime.
    pub peers_seen: u32,
    /// Estimated seconds to completion; absent at zero speed, when the
    /// torrent is complete, or while the total is unknown.
    pub eta_seconds: Option<u64>,
}

impl TorrentStats {
    /// Completion percentage in `[0, 100]`.
    ///
    /// A zero total reports 100 % only for a completed torrent; a torrent
    /// still resolving metadata reports 0 %.
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        if self.total_bytes == 0 {
            if self.state.is_complete() { 100.0 } else { 0.0 }
        } else {
            let progress = self.progress_bytes.min(self.total_bytes);
            (to_f64(progress) / to_f64(self.total_bytes)) * 100.0
        }
    }

    fn from_entry(entry: &TorrentEntry) -> Self {
        let meta = entry.meta();
        Self {
            state: meta.state,
            total_bytes: meta.total_bytes.unwrap_or(0),
            progress_bytes: 0,
            download_bps: 0,
            upload_bps: 0,
            peers_live: 0,
            peers_seen: 0,
            eta_seconds: None,
        }
    }
}

/// Aggregate of all live snapshots plus daemon uptime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Number of tracked torrents.
    pub torrents: u64,
    /// Torrents currently initializing.
    pub initializing: u64,
    /// Torrents currently running.
    pub running: u64,
    /// Torrents currently paused.
    pub paused: u64,
    /// Torrents that completed their payload.
    pub completed: u64,
    /// Torrents in a failed state.
    pub failed: u64,
    /// Aggregate download rate in bytes per second.
    pub download_bps: u64,
    /// Aggregate upload rate in bytes per second.
    pub upload_bps: u64,
    /// Cumulative bytes downloaded across the session.
    pub bytes_downloaded: u64,
    /// Cumulative bytes uploaded across the session.
    pub bytes_uploaded: u64,
    /// Seconds since the aggregator started.
    pub uptime_seconds: u64,
}

struct RateSample {
    totals: TransferTotals,
    at: Instant,
}

/// Maintains continuously refreshed per-torrent and session snapshots.
pub struct StatsAggregator {
    registry: Arc<Registry>,
    engine: Arc<dyn TransferEngine>,
    snapshots: RwLock<HashMap<TorrentId, TorrentStats>>,
    samples: Mutex<HashMap<TorrentId, RateSample>>,
    started_at: Instant,
}

impl StatsAggregator {
    /// Wire an aggregator over the registry and engine.
    #[must_use]
    pub fn new(registry: Arc<Registry>, engine: Arc<dyn TransferEngine>) -> Self {
        Self {
            registry,
            engine,
            snapshots: RwLock::new(HashMap::new()),
            samples: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    /// Drive the refresh loop: fold events as they arrive, poll counters on
    /// the interval. Returns when the event bus closes.
    pub async fn run(self: Arc<Self>, interval: Duration, mut events: EventStream) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                maybe = events.next() => match maybe {
                    Some(envelope) => self.apply_event(&envelope.event),
                    None => break,
                },
                _ = ticker.tick() => {
                    if let Err(error) = self.refresh_once().await {
                        warn!(error = %error, "stats refresh failed");
                    }
                }
            }
        }
    }

    /// Fold one domain event into the registry entry and snapshot table.
    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::TorrentAdded { torrent_id, .. } => {
                if let Some(entry) = self.registry.get(*torrent_id) {
                    self.write_snapshots()
                        .insert(*torrent_id, TorrentStats::from_entry(&entry));
                }
            }
            Event::MetadataResolved {
                torrent_id,
                name,
                total_bytes,
                files,
            } => {
                if let Some(entry) = self.registry.get(*torrent_id) {
                    entry.update_meta(|meta| {
                        meta.name = Some(name.clone());
                        meta.total_bytes = Some(*total_bytes);
                        meta.files = Some(files.clone());
                    });
                }
                self.with_snapshot(*torrent_id, |snapshot| {
                    snapshot.total_bytes = *total_bytes;
                });
            }
            Event::StateChanged { torrent_id, state } => {
                if let Some(entry) = self.registry.get(*torrent_id) {
                    entry.set_state(state.clone());
                }
                self.with_snapshot(*torrent_id, |snapshot| {
                    snapshot.state = state.clone();
                });
            }
            Event::Progress {
                torrent_id,
                bytes_completed,
                bytes_total,
            } => {
                self.with_snapshot(*torrent_id, |snapshot| {
                    if *bytes_total > 0 {
                        snapshot.total_bytes = *bytes_total;
                    }
                    snapshot.progress_bytes = if snapshot.total_bytes > 0 {
                        (*bytes_completed).min(snapshot.total_bytes)
                    } else {
                        *bytes_completed
                    };
                });
            }
            Event::Completed { torrent_id } => {
                if let Some(entry) = self.registry.get(*torrent_id) {
                    entry.set_state(TorrentState::Completed);
                }
                self.with_snapshot(*torrent_id, |snapshot| {
                    snapshot.state = TorrentState::Completed;
                    snapshot.progress_bytes = snapshot.total_bytes;
                    snapshot.eta_seconds = None;
                });
            }
            Event::TorrentRemoved { torrent_id, .. } => {
                self.write_snapshots().remove(torrent_id);
                self.lock_samples().remove(torrent_id);
            }
            Event::EngineFault {
                torrent_id: Some(torrent_id),
                message,
            } => {
                let state = TorrentState::Failed {
                    message: message.clone(),
                };
                if let Some(entry) = self.registry.get(*torrent_id) {
                    entry.set_state(state.clone());
                }
                self.with_snapshot(*torrent_id, |snapshot| {
                    snapshot.state = state;
                });
            }
            Event::EngineFault {
                torrent_id: None,
                message,
            } => {
                warn!(message = %message, "transport reported a session-level fault");
            }
        }
    }

    /// Poll engine counters once and rebuild the snapshot table.
    ///
    /// # Errors
    ///
    /// Returns the engine error when the counter poll fails; the previous
    /// snapshots stay readable.
    pub async fn refresh_once(&self) -> Result<(), EngineError> {
        let totals = self.engine.transfer_totals().await?;
        let now = Instant::now();
        let entries = self.registry.list();

        let mut samples = self.lock_samples();
        let mut next = HashMap::with_capacity(entries.len());
        for entry in &entries {
            let current = totals.get(&entry.id).copied().unwrap_or_default();
            let (download_bps, upload_bps) = samples.get(&entry.id).map_or((0, 0), |previous| {
                let elapsed = now.duration_since(previous.at);
                (
                    rate(previous.totals.bytes_downloaded, current.bytes_downloaded, elapsed),
                    rate(previous.totals.bytes_uploaded, current.bytes_uploaded, elapsed),
                )
            });
            samples.insert(
                entry.id,
                RateSample {
                    totals: current,
                    at: now,
                },
            );

            let meta = entry.meta();
            let total_bytes = meta.total_bytes.unwrap_or(0);
            let progress_bytes = if total_bytes > 0 {
                current.bytes_downloaded.min(total_bytes)
            } else {
                current.bytes_downloaded
            };
            next.insert(
                entry.id,
                TorrentStats {
                    eta_seconds: eta(&meta.state, total_bytes, progress_bytes, download_bps),
                    state: meta.state,
                    total_bytes,
                    progress_bytes,
                    download_bps,
                    upload_bps,
                    peers_live: current.peers_live,
                    peers_seen: current.peers_seen,
                },
            );
        }
        samples.retain(|id, _| next.contains_key(id));
        drop(samples);

        *self.write_snapshots() = next;
        Ok(())
    }

    /// Most recent snapshot for one torrent.
    #[must_use]
    pub fn snapshot(&self, id: TorrentId) -> Option<TorrentStats> {
        self.read_snapshots().get(&id).cloned()
    }

    /// Snapshot for an entry, synthesizing a fresh one when the torrent
    /// was admitted after the last refresh.
    #[must_use]
    pub fn snapshot_for(&self, entry: &TorrentEntry) -> TorrentStats {
        self.snapshot(entry.id)
            .unwrap_or_else(|| TorrentStats::from_entry(entry))
    }

    /// All snapshots ordered by torrent id.
    #[must_use]
    pub fn snapshot_all(&self) -> Vec<(TorrentId, TorrentStats)> {
        let mut all: Vec<_> = self
            .read_snapshots()
            .iter()
            .map(|(id, snapshot)| (*id, snapshot.clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    /// Aggregate of all live snapshots plus uptime.
    #[must_use]
    pub fn session_totals(&self) -> SessionStats {
        let mut stats = SessionStats::default();
        for snapshot in self.read_snapshots().values() {
            stats.torrents += 1;
            match snapshot.state {
                TorrentState::Initializing => stats.initializing += 1,
                TorrentState::Running => stats.running += 1,
                TorrentState::Paused => stats.paused += 1,
                TorrentState::Completed => stats.completed += 1,
                TorrentState::Failed { .. } => stats.failed += 1,
            }
            stats.download_bps += snapshot.download_bps;
            stats.upload_bps += snapshot.upload_bps;
        }
        for sample in self.lock_samples().values() {
            stats.bytes_downloaded += sample.totals.bytes_downloaded;
            stats.bytes_uploaded += sample.totals.bytes_uploaded;
        }
        stats.uptime_seconds = self.started_at.elapsed().as_secs();
        stats
    }

    fn with_snapshot(&self, id: TorrentId, update: impl FnOnce(&mut TorrentStats)) {
        if let Some(snapshot) = self.write_snapshots().get_mut(&id) {
            update(snapshot);
        }
    }

    fn read_snapshots(&self) -> RwLockReadGuard<'_, HashMap<TorrentId, TorrentStats>> {
        self.snapshots.read().unwrap_or_else(|err| {
            panic!("stats snapshot lock poisoned: {err}");
        })
    }

    fn write_snapshots(&self) -> RwLockWriteGuard<'_, HashMap<TorrentId, TorrentStats>> {
        self.snapshots.write().unwrap_or_else(|err| {
            panic!("stats snapshot lock poisoned: {err}");
        })
    }

    fn lock_samples(&self) -> MutexGuard<'_, HashMap<TorrentId, RateSample>> {
        self.samples.lock().unwrap_or_else(|err| {
            panic!("stats sample lock poisoned: {err}");
        })
    }
}

fn rate(previous: u64, current: u64, elapsed: Duration) -> u64 {
    let delta = current.saturating_sub(previous);
    let seconds = elapsed.as_secs_f64();
    if seconds <= f64::EPSILON {
        return 0;
    }
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "rates are non-negative and far below u64::MAX"
    )]
    {
        (to_f64(delta) / seconds).round() as u64
    }
}

const fn eta(state: &TorrentState, total: u64, progress: u64, download_bps: u64) -> Option<u64> {
    if download_bps == 0 || state.is_complete() || total == 0 || progress >= total {
        None
    } else {
        Some((total - progress) / download_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DhtNodeInfo, DhtStats};
    use crate::error::EngineError;
    use crate::model::{InfoHash, ResolvedSpec};
    use anyhow::Result;
    use async_trait::async_trait;
    use riptide_events::ResolvedFile;
    use std::path::PathBuf;

    #[derive(Default)]
    struct CounterEngine {
        totals: Mutex<HashMap<TorrentId, TransferTotals>>,
    }

    impl CounterEngine {
        fn set(&self, id: TorrentId, totals: TransferTotals) {
            self.totals.lock().expect("lock").insert(id, totals);
        }
    }

    #[async_trait]
    impl TransferEngine for CounterEngine {
        async fn admit(
            &self,
            _id: TorrentId,
            _spec: &ResolvedSpec,
            _start_paused: bool,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn resume(&self, _id: TorrentId) -> Result<(), EngineError> {
            Ok(())
        }

        async fn pause(&self, _id: TorrentId) -> Result<(), EngineError> {
            Ok(())
        }

        async fn remove(&self, _id: TorrentId, _delete_data: bool) -> Result<(), EngineError> {
            Ok(())
        }

        async fn transfer_totals(
            &self,
        ) -> Result<HashMap<TorrentId, TransferTotals>, EngineError> {
            Ok(self.totals.lock().expect("lock").clone())
        }

        async fn dht_stats(&self) -> Result<DhtStats, EngineError> {
            Ok(DhtStats::default())
        }

        async fn dht_table(&self) -> Result<Vec<DhtNodeInfo>, EngineError> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        registry: Arc<Registry>,
        engine: Arc<CounterEngine>,
        aggregator: StatsAggregator,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(Registry::new(false));
        let engine = Arc::new(CounterEngine::default());
        let aggregator = StatsAggregator::new(
            Arc::clone(&registry),
            Arc::clone(&engine) as Arc<dyn TransferEngine>,
        );
        Fixture {
            registry,
            engine,
            aggregator,
        }
    }

    fn add_torrent(registry: &Registry, seed: u8, total_bytes: Option<u64>) -> TorrentId {
        let spec = ResolvedSpec {
            info_hash: InfoHash::from_bytes([seed; 20]),
            name: Some(format!("torrent-{seed}")),
            files: None,
            total_bytes,
        };
        registry
            .add(&spec, None, PathBuf::from("/downloads"))
            .expect("admit")
            .id
    }

    fn stats(state: TorrentState, total: u64, progress: u64) -> TorrentStats {
        TorrentStats {
            state,
            total_bytes: total,
            progress_bytes: progress,
            download_bps: 0,
            upload_bps: 0,
            peers_live: 0,
            peers_seen: 0,
            eta_seconds: None,
        }
    }

    #[test]
    fn percent_is_bounded_and_guards_zero_totals() {
        assert!(stats(TorrentState::Initializing, 0, 0).percent_complete() < f64::EPSILON);
        assert!(
            (stats(TorrentState::Completed, 0, 0).percent_complete() - 100.0).abs()
                < f64::EPSILON
        );
        assert!(
            (stats(TorrentState::Running, 1_000, 1_000).percent_complete() - 100.0).abs()
                < f64::EPSILON
        );
        // Counter overshoot must not push the percentage past 100.
        assert!(
            (stats(TorrentState::Running, 1_000, 1_500).percent_complete() - 100.0).abs()
                < f64::EPSILON
        );
        assert!((stats(TorrentState::Running, 1_000, 250).percent_complete() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn eta_is_absent_at_zero_speed_or_completion() {
        assert_eq!(eta(&TorrentState::Running, 1_000, 500, 0), None);
        assert_eq!(eta(&TorrentState::Completed, 1_000, 1_000, 100), None);
        assert_eq!(eta(&TorrentState::Running, 0, 0, 100), None);
        assert_eq!(eta(&TorrentState::Running, 1_000, 500, 100), Some(5));
    }

    #[test]
    fn rate_derives_from_counter_deltas() {
        assert_eq!(rate(0, 1_000, Duration::from_secs(2)), 500);
        assert_eq!(rate(1_000, 1_000, Duration::from_secs(2)), 0);
        // Counter resets must not underflow.
        assert_eq!(rate(1_000, 500, Duration::from_secs(1)), 0);
        assert_eq!(rate(0, 1_000, Duration::ZERO), 0);
    }

    #[tokio::test]
    async fn refresh_builds_snapshots_from_registry_and_counters() -> Result<()> {
        let fixture = fixture();
        let id = add_torrent(&fixture.registry, 1, Some(1_000));
        fixture.engine.set(
            id,
            TransferTotals {
                bytes_downloaded: 400,
                bytes_uploaded: 40,
                peers_live: 3,
                peers_seen: 9,
            },
        );

        fixture.aggregator.refresh_once().await?;
        let snapshot = fixture.aggregator.snapshot(id).expect("snapshot");
        assert_eq!(snapshot.total_bytes, 1_000);
        assert_eq!(snapshot.progress_bytes, 400);
        assert_eq!(snapshot.peers_live, 3);
        assert_eq!(snapshot.peers_seen, 9);
        assert_eq!(snapshot.download_bps, 0, "no rate before a second sample");
        Ok(())
    }

    #[tokio::test]
    async fn second_refresh_derives_rates_and_eta() -> Result<()> {
        let fixture = fixture();
        let id = add_torrent(&fixture.registry, 1, Some(10_000));
        fixture.engine.set(
            id,
            TransferTotals {
                bytes_downloaded: 1_000,
                ..TransferTotals::default()
            },
        );
        fixture.aggregator.refresh_once().await?;

        fixture.engine.set(
            id,
            TransferTotals {
                bytes_downloaded: 3_000,
                ..TransferTotals::default()
            },
        );
        fixture.aggregator.refresh_once().await?;

        let snapshot = fixture.aggregator.snapshot(id).expect("snapshot");
        assert!(snapshot.download_bps > 0);
        assert!(snapshot.eta_seconds.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn progress_is_clamped_to_the_known_total() -> Result<()> {
        let fixture = fixture();
        let id = add_torrent(&fixture.registry, 1, Some(1_000));
        fixture.engine.set(
            id,
            TransferTotals {
                bytes_downloaded: 2_500,
                ..TransferTotals::default()
            },
        );

        fixture.aggregator.refresh_once().await?;
        let snapshot = fixture.aggregator.snapshot(id).expect("snapshot");
        assert_eq!(snapshot.progress_bytes, 1_000);
        Ok(())
    }

    #[tokio::test]
    async fn events_update_snapshots_between_ticks() {
        let fixture = fixture();
        let id = add_torrent(&fixture.registry, 1, None);

        fixture.aggregator.apply_event(&Event::TorrentAdded {
            torrent_id: id,
            info_hash: InfoHash::from_bytes([1; 20]).to_string(),
            name: None,
        });
        let seeded = fixture.aggregator.snapshot(id).expect("seeded snapshot");
        assert_eq!(seeded.state, TorrentState::Initializing);
        assert_eq!(seeded.total_bytes, 0);

        fixture.aggregator.apply_event(&Event::MetadataResolved {
            torrent_id: id,
            name: "resolved".to_string(),
            total_bytes: 5_000,
            files: vec![ResolvedFile {
                path: "resolved/a.mkv".to_string(),
                size_bytes: 5_000,
            }],
        });
        fixture.aggregator.apply_event(&Event::StateChanged {
            torrent_id: id,
            state: TorrentState::Running,
        });

        let entry = fixture.registry.get(id).expect("tracked");
        assert_eq!(entry.meta().total_bytes, Some(5_000));
        assert_eq!(entry.state(), TorrentState::Running);
        let snapshot = fixture.aggregator.snapshot(id).expect("snapshot");
        assert_eq!(snapshot.total_bytes, 5_000);
        assert_eq!(snapshot.state, TorrentState::Running);
    }

    #[tokio::test]
    async fn removal_prunes_the_snapshot_table() -> Result<()> {
        let fixture = fixture();
        let id = add_torrent(&fixture.registry, 1, Some(100));
        fixture.aggregator.refresh_once().await?;
        assert!(fixture.aggregator.snapshot(id).is_some());

        fixture.registry.remove(id)?;
        fixture.aggregator.apply_event(&Event::TorrentRemoved {
            torrent_id: id,
            deleted_data: false,
        });
        assert!(fixture.aggregator.snapshot(id).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn session_totals_count_states_and_uptime() -> Result<()> {
        let fixture = fixture();
        let first = add_torrent(&fixture.registry, 1, Some(100));
        let second = add_torrent(&fixture.registry, 2, Some(100));
        fixture
            .registry
            .get(second)
            .expect("tracked")
            .set_state(TorrentState::Paused);
        fixture.engine.set(
            first,
            TransferTotals {
                bytes_downloaded: 60,
                bytes_uploaded: 10,
                ..TransferTotals::default()
            },
        );

        fixture.aggregator.refresh_once().await?;
        let totals = fixture.aggregator.session_totals();
        assert_eq!(totals.torrents, 2);
        assert_eq!(totals.initializing, 1);
        assert_eq!(totals.paused, 1);
        assert_eq!(totals.bytes_downloaded, 60);
        assert_eq!(totals.bytes_uploaded, 10);
        Ok(())
    }
}
