//! The transport-engine seam.
//!
//! Everything wire-level (peer protocol, DHT, disk) lives behind
//! [`TransferEngine`]; the controller only signals transitions and awaits
//! acknowledgment, and the aggregator only polls counters.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{ResolvedSpec, TransferTotals};
use riptide_events::TorrentId;

/// Engine trait implemented by transport adapters.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Admit a torrent into the transport, optionally starting paused.
    async fn admit(
        &self,
        id: TorrentId,
        spec: &ResolvedSpec,
        start_paused: bool,
    ) -> Result<(), EngineError>;

    /// Resume transferring a paused or initializing torrent.
    async fn resume(&self, id: TorrentId) -> Result<(), EngineError>;

    /// Pause a torrent, releasing its in-flight network and disk resources.
    async fn pause(&self, id: TorrentId) -> Result<(), EngineError>;

    /// Remove a torrent from the transport, optionally erasing on-disk
    /// data.
    async fn remove(&self, id: TorrentId, delete_data: bool) -> Result<(), EngineError>;

    /// Cumulative transfer counters for every admitted torrent.
    async fn transfer_totals(&self) -> Result<HashMap<TorrentId, TransferTotals>, EngineError>;

    /// DHT routing diagnostics.
    async fn dht_stats(&self) -> Result<DhtStats, EngineError>;

    /// DHT routing table contents.
    async fn dht_table(&self) -> Result<Vec<DhtNodeInfo>, EngineError>;
}

/// DHT routing table health counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhtStats {
    /// Total nodes currently held in the routing table.
    pub routing_table_size: u64,
    /// Nodes that responded to their most recent query.
    pub live_nodes: u64,
    /// Nodes pending eviction after missed responses.
    pub questionable_nodes: u64,
    /// Queries currently in flight.
    pub outstanding_queries: u64,
}

/// A single routing table entry surfaced for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhtNodeInfo {
    /// Hex node identifier.
    pub node_id: String,
    /// Socket address the node was last seen at.
    pub address: String,
    /// Bucket index within the routing table.
    pub bucket: u8,
    /// Whether the node answered its most recent query.
    pub healthy: bool,
}
