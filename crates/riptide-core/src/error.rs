//! Error taxonomy for torrent control operations.
//!
//! Callers distinguish outcomes structurally: the API layer maps each
//! variant to a problem type, and batch reports carry [`ControlError::kind`]
//! rather than message text.

use std::error::Error;

use thiserror::Error;

use crate::model::InfoHash;
use riptide_events::TorrentId;

/// Errors raised while parsing a torrent spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// The magnet URI could not be parsed.
    #[error("magnet URI is malformed: {reason}")]
    Magnet {
        /// What the parser objected to.
        reason: &'static str,
    },
    /// The metainfo payload is not a valid bencoded dictionary.
    #[error("metainfo payload is malformed: {reason}")]
    Metainfo {
        /// What the parser objected to.
        reason: &'static str,
    },
    /// The info-hash string is not a 40-character hex digest.
    #[error("info-hash is malformed: {reason}")]
    InfoHash {
        /// What the parser objected to.
        reason: &'static str,
    },
}

/// Errors raised by the torrent registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No torrent is tracked under the given id.
    #[error("torrent not found")]
    NotFound {
        /// The unknown identifier.
        torrent_id: TorrentId,
    },
    /// The info-hash is already tracked and duplicates are not allowed.
    #[error("info-hash already tracked")]
    DuplicateTorrent {
        /// The duplicated content identity.
        info_hash: InfoHash,
        /// Id of the torrent already tracking it.
        existing: TorrentId,
    },
}

/// Errors surfaced by a transport engine adapter.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine worker is gone (channel closed, task dead).
    #[error("transport engine unavailable")]
    Unavailable,
    /// The engine did not acknowledge a command within the deadline.
    #[error("transport did not acknowledge {operation} in time")]
    Timeout {
        /// Operation identifier.
        operation: &'static str,
    },
    /// The engine rejected or failed the operation.
    #[error("transport operation {operation} failed")]
    Operation {
        /// Operation identifier.
        operation: &'static str,
        /// Affected torrent, when the failure is scoped to one.
        torrent_id: Option<TorrentId>,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Primary error type for lifecycle control operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// No torrent is tracked under the given id.
    #[error("torrent not found")]
    NotFound {
        /// The unknown identifier.
        torrent_id: TorrentId,
    },
    /// The supplied spec could not be parsed.
    #[error("torrent spec is invalid")]
    InvalidSpec {
        /// Parse failure detail.
        #[source]
        source: SpecError,
    },
    /// The info-hash is already tracked and duplicates are not allowed.
    #[error("info-hash already tracked")]
    Duplicate {
        /// The duplicated content identity.
        info_hash: InfoHash,
        /// Id of the torrent already tracking it.
        existing: TorrentId,
    },
    /// The operation conflicts with the torrent's current state.
    #[error("operation conflicts with the torrent state: {reason}")]
    Conflict {
        /// Affected torrent.
        torrent_id: TorrentId,
        /// Why the transition is rejected.
        reason: &'static str,
    },
    /// The transport engine failed or timed out; the registry is unchanged
    /// unless the operation had already fully completed.
    #[error("internal failure during {operation}")]
    Internal {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: EngineError,
    },
}

impl ControlError {
    /// Stable machine-readable discriminator for batch reports, metrics
    /// labels, and HTTP problem types.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidSpec { .. } => "invalid_spec",
            Self::Duplicate { .. } => "duplicate",
            Self::Conflict { .. } => "conflict",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<SpecError> for ControlError {
    fn from(source: SpecError) -> Self {
        Self::InvalidSpec { source }
    }
}

impl From<RegistryError> for ControlError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound { torrent_id } => Self::NotFound { torrent_id },
            RegistryError::DuplicateTorrent {
                info_hash,
                existing,
            } => Self::Duplicate {
                info_hash,
                existing,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_map_onto_control_kinds() {
        let not_found: ControlError = RegistryError::NotFound {
            torrent_id: TorrentId::new(9),
        }
        .into();
        assert_eq!(not_found.kind(), "not_found");

        let duplicate: ControlError = RegistryError::DuplicateTorrent {
            info_hash: InfoHash::from_bytes([0xab; 20]),
            existing: TorrentId::new(1),
        }
        .into();
        assert_eq!(duplicate.kind(), "duplicate");
    }

    #[test]
    fn spec_errors_become_invalid_spec() {
        let error: ControlError = SpecError::Magnet {
            reason: "missing xt parameter",
        }
        .into();
        assert_eq!(error.kind(), "invalid_spec");
        assert!(error.to_string().contains("invalid"));
    }
}
