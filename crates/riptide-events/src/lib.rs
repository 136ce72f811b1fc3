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

//! Domain event bus shared between the transport engine, the stats
//! aggregator, and the API layer.
//!
//! The bus wraps `tokio::broadcast` with a typed event enum and sequential
//! envelope identifiers. Publishing never blocks: when a subscriber lags
//! behind the channel capacity, the oldest events are dropped for that
//! subscriber and the stream resumes at the next live event.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, Receiver, Sender};

/// Identifier assigned to each event emitted on the bus.
pub type EventId = u64;

/// Default broadcast capacity when none is supplied.
const DEFAULT_CAPACITY: usize = 1_024;

/// Session-scoped torrent identifier.
///
/// Ids are assigned monotonically by the registry and are never reused
/// within a daemon session; a restarted daemon starts numbering afresh.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TorrentId(u64);

impl TorrentId {
    /// Wrap a raw id value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw numeric value of the id.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TorrentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TorrentId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.parse().map(Self)
    }
}

/// Lifecycle states a tracked torrent moves through.
///
/// Removal is not a state: deleted/forgotten torrents leave the registry
/// entirely, and the transition is announced with
/// [`Event::TorrentRemoved`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Admitted but not yet confirmed active by the transport.
    Initializing,
    /// Actively transferring (downloading or seeding).
    Running,
    /// Stopped by request; resources released, entry retained.
    Paused,
    /// All payload bytes verified present.
    Completed,
    /// The transport reported an unrecoverable failure.
    Failed {
        /// Human-readable failure description.
        message: String,
    },
}

impl TorrentState {
    /// Whether the torrent has finished transferring its payload.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Machine-friendly discriminator used in logs and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// File entry carried with metadata resolution events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Relative path of the file within the torrent payload.
    pub path: String,
    /// Total size of the file in bytes.
    pub size_bytes: u64,
}

/// Typed domain events surfaced across the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A torrent was admitted into the registry.
    TorrentAdded {
        /// Registry id of the new torrent.
        torrent_id: TorrentId,
        /// Hex-encoded info-hash derived from the spec.
        info_hash: String,
        /// Display name, when known at admission time.
        name: Option<String>,
    },
    /// The transport resolved the torrent's metadata.
    MetadataResolved {
        /// Registry id of the torrent.
        torrent_id: TorrentId,
        /// Resolved display name.
        name: String,
        /// Total payload size in bytes.
        total_bytes: u64,
        /// File listing in metainfo order.
        files: Vec<ResolvedFile>,
    },
    /// The torrent transitioned between lifecycle states.
    StateChanged {
        /// Registry id of the torrent.
        torrent_id: TorrentId,
        /// New lifecycle state.
        state: TorrentState,
    },
    /// Byte counters advanced.
    Progress {
        /// Registry id of the torrent.
        torrent_id: TorrentId,
        /// Bytes completed so far.
        bytes_completed: u64,
        /// Total bytes expected, zero while metadata is pending.
        bytes_total: u64,
    },
    /// The torrent finished downloading its payload.
    Completed {
        /// Registry id of the torrent.
        torrent_id: TorrentId,
    },
    /// The torrent was deleted or forgotten.
    TorrentRemoved {
        /// Registry id of the removed torrent.
        torrent_id: TorrentId,
        /// Whether on-disk data was erased alongside the entry.
        deleted_data: bool,
    },
    /// The transport reported a fault.
    EngineFault {
        /// Affected torrent, if the fault is scoped to one.
        torrent_id: Option<TorrentId>,
        /// Human-readable failure description.
        message: String,
    },
}

impl Event {
    /// Machine-friendly discriminator for logs and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TorrentAdded { .. } => "torrent_added",
            Self::MetadataResolved { .. } => "metadata_resolved",
            Self::StateChanged { .. } => "state_changed",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::TorrentRemoved { .. } => "torrent_removed",
            Self::EngineFault { .. } => "engine_fault",
        }
    }
}

/// Metadata wrapper around events: sequential id plus emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier assigned at publication.
    pub id: EventId,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Construct a bus with the provided broadcast capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Construct a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Publish an event, assigning it the next sequential identifier.
    ///
    /// Publication succeeds even with no live subscribers.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of the bus. Lagged subscribers skip dropped events and
/// resume at the next live envelope.
pub struct EventStream {
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, or `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
