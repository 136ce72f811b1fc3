#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Session core: the torrent registry, lifecycle controller, and stats
//! aggregator, plus the transport-engine seam they are built against.
//!
//! Layout: `model` (identity, specs, progress vocabulary), `registry`
//! (insertion-ordered in-memory table), `lifecycle` (linearizable
//! per-torrent transitions), `stats` (decoupled snapshot refresh),
//! `engine` (the `TransferEngine` trait the wire-level transport
//! implements).

/// Transport engine seam and its diagnostic payloads.
pub mod engine;
/// Error taxonomy for spec parsing, registry, and control operations.
pub mod error;
/// Lifecycle controller.
pub mod lifecycle;
mod metainfo;
/// Domain model: ids, info-hashes, torrent specs, transfer vocabulary.
pub mod model;
/// Insertion-ordered in-memory torrent table.
pub mod registry;
/// Stats aggregation decoupled from API reads.
pub mod stats;

pub use engine::{DhtNodeInfo, DhtStats, TransferEngine};
pub use error::{ControlError, EngineError, RegistryError, SpecError};
pub use lifecycle::{AddTorrent, AddTorrentOptions, BatchFailure, BatchOp, BatchOutcome, LifecycleController, LifecyclePolicy};
pub use model::{InfoHash, ResolvedSpec, TorrentSpec, TransferTotals};
pub use registry::{Registry, TorrentEntry, TorrentMeta};
pub use riptide_events::{ResolvedFile, TorrentId, TorrentState};
pub use stats::{SessionStats, StatsAggregator, TorrentStats};
