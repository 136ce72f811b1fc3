//! Command definitions shipped from the engine facade to its worker.

use std::collections::HashMap;

use tokio::sync::oneshot;

use riptide_core::engine::{DhtNodeInfo, DhtStats};
use riptide_core::model::{ResolvedSpec, TransferTotals};
use riptide_events::TorrentId;

/// Acknowledgment channel for mutating commands.
pub(crate) type Ack = oneshot::Sender<anyhow::Result<()>>;

/// Reply channel for query commands.
pub(crate) type Reply<T> = oneshot::Sender<anyhow::Result<T>>;

/// Commands handled by the background worker.
#[derive(Debug)]
pub(crate) enum EngineCommand {
    /// Admit a torrent into the session.
    Admit {
        /// Registry id assigned to the torrent.
        id: TorrentId,
        /// Validated spec carrying whatever metadata the input had.
        spec: Box<ResolvedSpec>,
        /// Whether the torrent starts paused.
        start_paused: bool,
        /// Acknowledgment channel.
        respond_to: Ack,
    },
    /// Resume a paused torrent.
    Resume {
        /// Registry id of the torrent.
        id: TorrentId,
        /// Acknowledgment channel.
        respond_to: Ack,
    },
    /// Pause a running torrent.
    Pause {
        /// Registry id of the torrent.
        id: TorrentId,
        /// Acknowledgment channel.
        respond_to: Ack,
    },
    /// Remove a torrent, optionally erasing its payload.
    Remove {
        /// Registry id of the torrent.
        id: TorrentId,
        /// Whether on-disk data is erased too.
        delete_data: bool,
        /// Acknowledgment channel.
        respond_to: Ack,
    },
    /// Fetch cumulative transfer counters for every admitted torrent.
    QueryTotals {
        /// Reply channel.
        respond_to: Reply<HashMap<TorrentId, TransferTotals>>,
    },
    /// Fetch DHT routing health counters.
    QueryDhtStats {
        /// Reply channel.
        respond_to: Reply<DhtStats>,
    },
    /// Fetch the DHT routing table contents.
    QueryDhtTable {
        /// Reply channel.
        respond_to: Reply<Vec<DhtNodeInfo>>,
    },
}
