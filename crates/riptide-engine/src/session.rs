//! Session abstraction over the wire-level transport, plus the
//! deterministic in-process stub used until a native backend is linked.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use riptide_core::engine::{DhtNodeInfo, DhtStats};
use riptide_core::model::{ResolvedSpec, TransferTotals};
use riptide_events::{ResolvedFile, TorrentId, TorrentState};

/// Payload size assumed for torrents whose metadata the stub cannot fetch.
const SYNTH_TOTAL_BYTES: u64 = 64 * 1024 * 1024;

/// Fraction of the payload the stub transfers per poll tick.
const PROGRESS_STEP_DIVISOR: u64 = 20;

/// Peers the stub reports for an actively transferring torrent.
const LIVE_PEERS: u32 = 4;

/// Events surfaced by a session before translation onto the shared bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Metadata became available for a torrent.
    MetadataResolved {
        /// Affected torrent.
        id: TorrentId,
        /// Resolved display name.
        name: String,
        /// Total payload size in bytes.
        total_bytes: u64,
        /// File listing in metainfo order.
        files: Vec<ResolvedFile>,
    },
    /// A torrent transitioned between lifecycle states.
    StateChanged {
        /// Affected torrent.
        id: TorrentId,
        /// New lifecycle state.
        state: TorrentState,
    },
    /// Byte counters advanced.
    Progress {
        /// Affected torrent.
        id: TorrentId,
        /// Bytes completed so far.
        bytes_completed: u64,
        /// Total bytes expected.
        bytes_total: u64,
    },
    /// A torrent finished its payload.
    Completed {
        /// Affected torrent.
        id: TorrentId,
    },
    /// The session reported a fault.
    Fault {
        /// Affected torrent, if scoped to one.
        id: Option<TorrentId>,
        /// Human-readable failure description.
        message: String,
    },
}

/// Stand-in for the wire-level stack: peer protocol, DHT, and disk live
/// behind this seam.
#[async_trait]
pub trait TransportSession: Send {
    /// Admit a torrent into the session.
    async fn admit(&mut self, id: TorrentId, spec: &ResolvedSpec, start_paused: bool)
    -> Result<()>;
    /// Resume a paused torrent.
    async fn resume(&mut self, id: TorrentId) -> Result<()>;
    /// Pause a running torrent, releasing in-flight resources.
    async fn pause(&mut self, id: TorrentId) -> Result<()>;
    /// Remove a torrent, optionally erasing its payload.
    async fn remove(&mut self, id: TorrentId, delete_data: bool) -> Result<()>;
    /// Cumulative counters for every admitted torrent.
    async fn transfer_totals(&mut self) -> Result<HashMap<TorrentId, TransferTotals>>;
    /// DHT routing health counters.
    async fn dht_stats(&mut self) -> Result<DhtStats>;
    /// DHT routing table contents.
    async fn dht_table(&mut self) -> Result<Vec<DhtNodeInfo>>;
    /// Drain events accumulated since the previous poll.
    async fn poll_events(&mut self) -> Result<Vec<SessionEvent>>;
}

struct StubTorrent {
    #[allow(dead_code)]
    name: String,
    total_bytes: u64,
    progress_bytes: u64,
    uploaded_bytes: u64,
    peers_seen: u32,
    paused: bool,
    completed: bool,
}

/// Deterministic in-process session.
///
/// Admissions resolve metadata immediately (synthesising a single-file
/// payload when the spec carried none), and each poll tick advances
/// running torrents by a fixed payload fraction. Useful for development
/// and tests; a native transport implements [`TransportSession`] the same
/// way.
#[derive(Default)]
pub struct StubSession {
    torrents: HashMap<TorrentId, StubTorrent>,
    pending_events: Vec<SessionEvent>,
}

impl StubSession {
    fn torrent_mut(&mut self, id: TorrentId) -> Result<&mut StubTorrent> {
        self.torrents
            .get_mut(&id)
            .ok_or_else(|| anyhow!("unknown torrent {id}"))
    }

    fn advance_progress(&mut self) {
        let mut ids: Vec<TorrentId> = self.torrents.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let Some(torrent) = self.torrents.get_mut(&id) else {
                continue;
            };
            if torrent.paused || torrent.completed || torrent.total_bytes == 0 {
                continue;
            }
            let remaining = torrent.total_bytes - torrent.progress_bytes;
            let step = (torrent.total_bytes / PROGRESS_STEP_DIVISOR)
                .max(1)
                .min(remaining);
            torrent.progress_bytes += step;
            torrent.uploaded_bytes += step / 4;
            torrent.peers_seen = (torrent.peers_seen + 2).min(48);
            let completed = torrent.progress_bytes >= torrent.total_bytes;
            self.pending_events.push(SessionEvent::Progress {
                id,
                bytes_completed: torrent.progress_bytes,
                bytes_total: torrent.total_bytes,
            });
            if completed {
                torrent.completed = true;
                self.pending_events.push(SessionEvent::Completed { id });
            }
        }
    }
}

#[async_trait]
impl TransportSession for StubSession {
    async fn admit(
        &mut self,
        id: TorrentId,
        spec: &ResolvedSpec,
        start_paused: bool,
    ) -> Result<()> {
        if self.torrents.contains_key(&id) {
            return Err(anyhow!("torrent {id} already admitted"));
        }

        let hash = spec.info_hash.to_string();
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("torrent-{}", &hash[..8]));
        let (files, total_bytes) = match (&spec.files, spec.total_bytes) {
            (Some(files), Some(total)) => (files.clone(), total),
            _ => (
                vec![ResolvedFile {
                    path: name.clone(),
                    size_bytes: SYNTH_TOTAL_BYTES,
                }],
                SYNTH_TOTAL_BYTES,
            ),
        };

        self.torrents.insert(
            id,
            StubTorrent {
                name: name.clone(),
                total_bytes,
                progress_bytes: 0,
                uploaded_bytes: 0,
                peers_seen: 0,
                paused: start_paused,
                completed: false,
            },
        );
        self.pending_events.push(SessionEvent::MetadataResolved {
            id,
            name,
            total_bytes,
            files,
        });
        self.pending_events.push(SessionEvent::StateChanged {
            id,
            state: if start_paused {
                TorrentState::Paused
            } else {
                TorrentState::Running
            },
        });
        Ok(())
    }

    async fn resume(&mut self, id: TorrentId) -> Result<()> {
        let torrent = self.torrent_mut(id)?;
        torrent.paused = false;
        self.pending_events.push(SessionEvent::StateChanged {
            id,
            state: TorrentState::Running,
        });
        Ok(())
    }

    async fn pause(&mut self, id: TorrentId) -> Result<()> {
        let torrent = self.torrent_mut(id)?;
        torrent.paused = true;
        self.pending_events.push(SessionEvent::StateChanged {
            id,
            state: TorrentState::Paused,
        });
        Ok(())
    }

    async fn remove(&mut self, id: TorrentId, _delete_data: bool) -> Result<()> {
        self.torrents
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("unknown torrent {id} for remove"))
    }

    async fn transfer_totals(&mut self) -> Result<HashMap<TorrentId, TransferTotals>> {
        Ok(self
            .torrents
            .iter()
            .map(|(id, torrent)| {
                (
                    *id,
                    TransferTotals {
                        bytes_downloaded: torrent.progress_bytes,
                        bytes_uploaded: torrent.uploaded_bytes,
                        peers_live: if torrent.paused { 0 } else { LIVE_PEERS },
                        peers_seen: torrent.peers_seen,
                    },
                )
            })
            .collect())
    }

    async fn dht_stats(&mut self) -> Result<DhtStats> {
        let admitted = self.torrents.len() as u64;
        Ok(DhtStats {
            routing_table_size: 16 + 8 * admitted,
            live_nodes: 12 + 6 * admitted,
            questionable_nodes: 4 + 2 * admitted,
            outstanding_queries: admitted,
        })
    }

    async fn dht_table(&mut self) -> Result<Vec<DhtNodeInfo>> {
        let mut nodes = Vec::new();
        for bucket in 0..4_u8 {
            for index in 0..2_u8 {
                nodes.push(DhtNodeInfo {
                    node_id: format!(
                        "{:040x}",
                        (u128::from(bucket) + 1) * 0x0100_0000_0000 + u128::from(index) + 1
                    ),
                    address: format!("192.0.2.{}:6881", bucket * 8 + index + 1),
                    bucket,
                    healthy: index == 0,
                });
            }
        }
        Ok(nodes)
    }

    async fn poll_events(&mut self) -> Result<Vec<SessionEvent>> {
        self.advance_progress();
        Ok(std::mem::take(&mut self.pending_events))
    }
}
