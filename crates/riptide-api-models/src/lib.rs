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
//! Shared HTTP DTOs for the Riptide control API.
//!
//! The conversions from domain objects live here so the mapping from
//! `TorrentEntry`/`TorrentStats` to wire shapes stays a single source of
//! truth for the server and any Rust clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use riptide_core::model::{format_duration, format_rate};
use riptide_core::registry::TorrentEntry;
use riptide_core::stats::{SessionStats, TorrentStats};
use riptide_events::{ResolvedFile, TorrentId, TorrentState};

pub use riptide_core::lifecycle::{BatchFailure, BatchOutcome};

/// RFC9457-compatible problem document surfaced on errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    /// URI reference identifying the problem type.
    pub kind: String,
    /// Short, human-readable summary of the issue.
    pub title: String,
    /// HTTP status code associated with the error.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Detailed diagnostic message when available.
    pub detail: Option<String>,
}

/// Coarse lifecycle states surfaced via the API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TorrentStateKind {
    /// Admitted but not yet confirmed active by the transport.
    Initializing,
    /// Actively transferring.
    Running,
    /// Stopped by request.
    Paused,
    /// Payload fully present.
    Completed,
    /// Unrecoverable failure reported by the transport.
    Failed,
}

impl From<&TorrentState> for TorrentStateKind {
    fn from(value: &TorrentState) -> Self {
        match value {
            TorrentState::Initializing => Self::Initializing,
            TorrentState::Running => Self::Running,
            TorrentState::Paused => Self::Paused,
            TorrentState::Completed => Self::Completed,
            TorrentState::Failed { .. } => Self::Failed,
        }
    }
}

/// State plus optional failure context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TorrentStateView {
    /// Normalised lifecycle state label.
    pub kind: TorrentStateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Failure context when the torrent stopped unexpectedly.
    pub failure_message: Option<String>,
}

impl From<&TorrentState> for TorrentStateView {
    fn from(value: &TorrentState) -> Self {
        Self {
            kind: value.into(),
            failure_message: match value {
                TorrentState::Failed { message } => Some(message.clone()),
                _ => None,
            },
        }
    }
}

/// Row in the torrent list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TorrentSummary {
    /// Session-scoped identifier.
    pub id: TorrentId,
    /// Hex info-hash.
    pub info_hash: String,
    /// Display name, absent until metadata resolves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<&TorrentEntry> for TorrentSummary {
    fn from(entry: &TorrentEntry) -> Self {
        Self {
            id: entry.id,
            info_hash: entry.info_hash.to_string(),
            name: entry.meta().name,
        }
    }
}

/// Response payload for the torrent list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TorrentListResponse {
    /// Tracked torrents in insertion order.
    pub torrents: Vec<TorrentSummary>,
}

/// File metadata in detail views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileView {
    /// Relative path within the torrent payload.
    pub path: String,
    /// Total size of the file in bytes.
    pub size_bytes: u64,
}

impl From<&ResolvedFile> for FileView {
    fn from(file: &ResolvedFile) -> Self {
        Self {
            path: file.path.clone(),
            size_bytes: file.size_bytes,
        }
    }
}

/// Full torrent detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TorrentDetail {
    /// Session-scoped identifier.
    pub id: TorrentId,
    /// Hex info-hash.
    pub info_hash: String,
    /// Display name, absent until metadata resolves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Directory the transport writes the payload into.
    pub output_folder: String,
    /// File listing in metainfo order; empty until metadata resolves.
    pub files: Vec<FileView>,
    /// Total payload size in bytes, absent until metadata resolves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    /// Current lifecycle state.
    pub state: TorrentStateView,
    /// When the torrent was admitted.
    pub added_at: DateTime<Utc>,
}

impl From<&TorrentEntry> for TorrentDetail {
    fn from(entry: &TorrentEntry) -> Self {
        let meta = entry.meta();
        Self {
            id: entry.id,
            info_hash: entry.info_hash.to_string(),
            name: meta.name,
            output_folder: meta.output_dir.display().to_string(),
            files: meta
                .files
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(FileView::from)
                .collect(),
            total_bytes: meta.total_bytes,
            state: TorrentStateView::from(&meta.state),
            added_at: entry.added_at,
        }
    }
}

/// Live statistics snapshot for one torrent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TorrentStatsView {
    /// Lifecycle state at snapshot time.
    pub state: TorrentStateView,
    /// Total payload size in bytes, zero while metadata is pending.
    pub total_bytes: u64,
    /// Bytes completed so far.
    pub progress_bytes: u64,
    /// Completion percentage in `[0, 100]`.
    pub percent_complete: f64,
    /// Download rate in bytes per second.
    pub download_bps: u64,
    /// Human-readable download rate.
    pub download_rate: String,
    /// Upload rate in bytes per second.
    pub upload_bps: u64,
    /// Human-readable upload rate.
    pub upload_rate: String,
    /// Peers currently connected.
    pub peers_live: u32,
    /// Peers observed over the torrent's lifetime.
    pub peers_seen: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Estimated seconds to completion, absent at zero speed or when
    /// complete.
    pub eta_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Human-readable time remaining.
    pub eta: Option<String>,
}

impl From<&TorrentStats> for TorrentStatsView {
    fn from(stats: &TorrentStats) -> Self {
        Self {
            state: TorrentStateView::from(&stats.state),
            total_bytes: stats.total_bytes,
            progress_bytes: stats.progress_bytes,
            percent_complete: stats.percent_complete(),
            download_bps: stats.download_bps,
            download_rate: format_rate(stats.download_bps),
            upload_bps: stats.upload_bps,
            upload_rate: format_rate(stats.upload_bps),
            peers_live: stats.peers_live,
            peers_seen: stats.peers_seen,
            eta_seconds: stats.eta_seconds,
            eta: stats.eta_seconds.map(format_duration),
        }
    }
}

/// Aggregate session statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStatsView {
    /// Raw aggregate counters.
    #[serde(flatten)]
    pub totals: SessionStats,
    /// Human-readable aggregate download rate.
    pub download_rate: String,
    /// Human-readable aggregate upload rate.
    pub upload_rate: String,
}

impl From<SessionStats> for SessionStatsView {
    fn from(totals: SessionStats) -> Self {
        Self {
            download_rate: format_rate(totals.download_bps),
            upload_rate: format_rate(totals.upload_bps),
            totals,
        }
    }
}

/// Request payload for admitting a torrent.
///
/// Exactly one of `magnet`, `metainfo_base64`, or `info_hash` must be
/// supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddTorrentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Magnet URI.
    pub magnet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Base64-encoded `.torrent` metainfo bytes.
    pub metainfo_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Bare 40-hex info-hash.
    pub info_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Friendly name shown before metadata resolves.
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Override for the configured output directory.
    pub output_dir: Option<String>,
    #[serde(default)]
    /// Admit the torrent paused instead of starting it.
    pub start_paused: bool,
}

impl AddTorrentRequest {
    /// Number of spec sources present in the request.
    #[must_use]
    pub fn source_count(&self) -> usize {
        [
            self.magnet.is_some(),
            self.metainfo_base64.is_some(),
            self.info_hash.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

/// Response payload for a successful admission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddTorrentResponse {
    /// Session-scoped identifier of the new torrent.
    pub id: TorrentId,
}

/// Request payload for batch lifecycle operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchRequest {
    /// The ids to apply the operation to.
    pub ids: Vec<TorrentId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use riptide_core::model::{InfoHash, ResolvedSpec};
    use riptide_core::registry::Registry;
    use std::path::PathBuf;

    fn sample_entry() -> Result<TorrentDetail> {
        let registry = Registry::new(false);
        let entry = registry.add(
            &ResolvedSpec {
                info_hash: InfoHash::from_bytes([7; 20]),
                name: Some("demo".to_string()),
                files: Some(vec![ResolvedFile {
                    path: "demo/a.mkv".to_string(),
                    size_bytes: 1_000,
                }]),
                total_bytes: Some(1_000),
            },
            None,
            PathBuf::from("/downloads/demo"),
        )?;
        Ok(TorrentDetail::from(entry.as_ref()))
    }

    #[test]
    fn detail_carries_identity_files_and_state() -> Result<()> {
        let detail = sample_entry()?;
        assert_eq!(detail.info_hash, InfoHash::from_bytes([7; 20]).to_string());
        assert_eq!(detail.output_folder, "/downloads/demo");
        assert_eq!(detail.files.len(), 1);
        assert_eq!(detail.state.kind, TorrentStateKind::Initializing);
        Ok(())
    }

    #[test]
    fn stats_view_formats_rates_and_eta() {
        let stats = TorrentStats {
            state: TorrentState::Running,
            total_bytes: 1_000,
            progress_bytes: 250,
            download_bps: 1_536,
            upload_bps: 0,
            peers_live: 3,
            peers_seen: 11,
            eta_seconds: Some(129),
        };
        let view = TorrentStatsView::from(&stats);
        assert_eq!(view.download_rate, "1.5 KiB/s");
        assert_eq!(view.upload_rate, "0 B/s");
        assert!((view.percent_complete - 25.0).abs() < 1e-9);
        assert_eq!(view.eta.as_deref(), Some("2m 09s"));
    }

    #[test]
    fn stats_view_omits_eta_when_absent() -> Result<()> {
        let stats = TorrentStats {
            state: TorrentState::Completed,
            total_bytes: 1_000,
            progress_bytes: 1_000,
            download_bps: 0,
            upload_bps: 0,
            peers_live: 0,
            peers_seen: 4,
            eta_seconds: None,
        };
        let json = serde_json::to_value(TorrentStatsView::from(&stats))?;
        assert!(json.get("eta_seconds").is_none());
        assert!(json.get("eta").is_none());
        assert_eq!(json["percent_complete"], 100.0);
        Ok(())
    }

    #[test]
    fn failed_state_view_keeps_the_message() {
        let state = TorrentState::Failed {
            message: "tracker unreachable".to_string(),
        };
        let view = TorrentStateView::from(&state);
        assert_eq!(view.kind, TorrentStateKind::Failed);
        assert_eq!(view.failure_message.as_deref(), Some("tracker unreachable"));
    }

    #[test]
    fn add_request_counts_its_sources() {
        let mut request = AddTorrentRequest {
            magnet: Some("magnet:?xt=urn:btih:00".to_string()),
            ..AddTorrentRequest::default()
        };
        assert_eq!(request.source_count(), 1);
        request.info_hash = Some("00".to_string());
        assert_eq!(request.source_count(), 2);
        assert_eq!(AddTorrentRequest::default().source_count(), 0);
    }

    #[test]
    fn session_stats_view_flattens_totals() -> Result<()> {
        let view = SessionStatsView::from(SessionStats {
            torrents: 2,
            running: 1,
            paused: 1,
            download_bps: 2_048,
            ..SessionStats::default()
        });
        let json = serde_json::to_value(view)?;
        assert_eq!(json["torrents"], 2);
        assert_eq!(json["download_bps"], 2_048);
        assert_eq!(json["download_rate"], "2.0 KiB/s");
        Ok(())
    }
}
