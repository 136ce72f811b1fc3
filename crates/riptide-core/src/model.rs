//! Domain model: content identity, torrent specs, and transfer vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::SpecError;
use crate::metainfo;
use riptide_events::ResolvedFile;

/// Content-derived stable identifier for a torrent's metadata.
///
/// Distinct from the session-local [`riptide_events::TorrentId`]: the
/// info-hash survives restarts and is globally unique per payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Wrap a raw 20-byte digest.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for InfoHash {
    type Err = SpecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != 40 {
            return Err(SpecError::InfoHash {
                reason: "expected 40 hex characters",
            });
        }
        let decoded = hex::decode(value).map_err(|_| SpecError::InfoHash {
            reason: "expected 40 hex characters",
        })?;
        let mut bytes = [0_u8; 20];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(D::Error::custom)
    }
}

/// Source describing how a torrent should be added.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TorrentSpec {
    /// A magnet URI to resolve.
    Magnet {
        /// The full `magnet:?…` URI.
        uri: String,
    },
    /// Raw bencoded `.torrent` metainfo bytes.
    Metainfo {
        /// Bencoded metainfo payload.
        bytes: Vec<u8>,
    },
    /// A bare hex info-hash; metadata is fetched by the transport.
    InfoHash {
        /// 40-character hex digest.
        hash: String,
    },
}

impl TorrentSpec {
    /// Convenience constructor for magnet-based specs.
    #[must_use]
    pub fn magnet(uri: impl Into<String>) -> Self {
        Self::Magnet { uri: uri.into() }
    }

    /// Convenience constructor for metainfo-based specs.
    #[must_use]
    pub fn metainfo(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Metainfo {
            bytes: bytes.into(),
        }
    }

    /// Convenience constructor for bare info-hash specs.
    #[must_use]
    pub fn info_hash(hash: impl Into<String>) -> Self {
        Self::InfoHash { hash: hash.into() }
    }

    /// Validate the spec and derive its content identity and any metadata
    /// available without touching the network.
    ///
    /// # Errors
    ///
    /// Returns a [`SpecError`] when the input cannot be parsed.
    pub fn resolve(&self) -> Result<ResolvedSpec, SpecError> {
        match self {
            Self::Magnet { uri } => resolve_magnet(uri),
            Self::Metainfo { bytes } => {
                let summary = metainfo::parse(bytes)?;
                Ok(ResolvedSpec {
                    info_hash: summary.info_hash,
                    name: summary.name,
                    files: Some(summary.files),
                    total_bytes: Some(summary.total_bytes),
                })
            }
            Self::InfoHash { hash } => Ok(ResolvedSpec {
                info_hash: hash.parse()?,
                name: None,
                files: None,
                total_bytes: None,
            }),
        }
    }
}

/// Validated spec: stable identity plus whatever metadata the input
/// carried. Magnet and bare-hash specs leave the file list to the
/// transport's metadata fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedSpec {
    /// Content identity derived from the spec.
    pub info_hash: InfoHash,
    /// Display name, when the spec carried one.
    pub name: Option<String>,
    /// File listing in metainfo order, when available.
    pub files: Option<Vec<ResolvedFile>>,
    /// Total payload size in bytes, when available.
    pub total_bytes: Option<u64>,
}

fn resolve_magnet(uri: &str) -> Result<ResolvedSpec, SpecError> {
    let url = Url::parse(uri.trim()).map_err(|_| SpecError::Magnet {
        reason: "not a valid URI",
    })?;
    if url.scheme() != "magnet" {
        return Err(SpecError::Magnet {
            reason: "expected the magnet scheme",
        });
    }

    let mut info_hash = None;
    let mut name = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "xt" => {
                if let Some(encoded) = value.strip_prefix("urn:btih:") {
                    info_hash = Some(decode_btih(encoded)?);
                }
            }
            "dn" => {
                if !value.is_empty() {
                    name = Some(value.into_owned());
                }
            }
            _ => {}
        }
    }

    info_hash.map_or(
        Err(SpecError::Magnet {
            reason: "missing xt=urn:btih parameter",
        }),
        |info_hash| {
            Ok(ResolvedSpec {
                info_hash,
                name,
                files: None,
                total_bytes: None,
            })
        },
    )
}

fn decode_btih(encoded: &str) -> Result<InfoHash, SpecError> {
    match encoded.len() {
        40 => encoded.parse().map_err(|_| SpecError::Magnet {
            reason: "xt digest is not valid hex",
        }),
        32 => decode_base32(encoded)
            .map(InfoHash::from_bytes)
            .ok_or(SpecError::Magnet {
                reason: "xt digest is not valid base32",
            }),
        _ => Err(SpecError::Magnet {
            reason: "xt digest has an unexpected length",
        }),
    }
}

/// RFC 4648 base32 decode of a 32-character magnet digest into 20 bytes.
fn decode_base32(encoded: &str) -> Option<[u8; 20]> {
    let mut output = [0_u8; 20];
    let mut accumulator: u64 = 0;
    let mut bits = 0_u32;
    let mut written = 0_usize;
    for ch in encoded.bytes() {
        let value = match ch {
            b'A'..=b'Z' => ch - b'A',
            b'a'..=b'z' => ch - b'a',
            b'2'..=b'7' => ch - b'2' + 26,
            _ => return None,
        };
        accumulator = (accumulator << 5) | u64::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            if written == output.len() {
                return None;
            }
            output[written] = u8::try_from((accumulator >> bits) & 0xff).ok()?;
            written += 1;
        }
    }
    (written == output.len()).then_some(output)
}

/// Cumulative transfer counters reported by the transport engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferTotals {
    /// Payload bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Payload bytes uploaded so far.
    pub bytes_uploaded: u64,
    /// Peers currently connected.
    pub peers_live: u32,
    /// Peers observed over the torrent's lifetime.
    pub peers_seen: u32,
}

/// Render a byte rate in a human-readable form, e.g. `1.5 MiB/s`.
#[must_use]
pub fn format_rate(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Render a byte count in a human-readable form, e.g. `1.5 MiB`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = to_f64(bytes);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Render a duration in seconds as `1h 02m`, `4m 09s`, or `42s`.
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}

pub(crate) const fn to_f64(value: u64) -> f64 {
    #[expect(
        clippy::cast_precision_loss,
        reason = "u64 to f64 conversion is required for user-facing reporting"
    )]
    {
        value as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const DEMO_HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn info_hash_round_trips_through_hex() -> Result<()> {
        let hash: InfoHash = DEMO_HASH.parse()?;
        assert_eq!(hash.to_string(), DEMO_HASH);
        assert_eq!(serde_json::to_value(hash)?, DEMO_HASH);
        Ok(())
    }

    #[test]
    fn info_hash_rejects_bad_lengths_and_digits() {
        assert!("abc".parse::<InfoHash>().is_err());
        assert!(
            "zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz"
                .parse::<InfoHash>()
                .is_err()
        );
    }

    #[test]
    fn magnet_with_hex_digest_resolves() -> Result<()> {
        let spec = TorrentSpec::magnet(format!(
            "magnet:?xt=urn:btih:{DEMO_HASH}&dn=Demo+Torrent&tr=udp%3A%2F%2Ftracker.example"
        ));
        let resolved = spec.resolve()?;
        assert_eq!(resolved.info_hash.to_string(), DEMO_HASH);
        assert_eq!(resolved.name.as_deref(), Some("Demo Torrent"));
        assert!(resolved.files.is_none());
        Ok(())
    }

    #[test]
    fn magnet_with_base32_digest_resolves() -> Result<()> {
        // 20 bytes of 0x00 encode as 32 'A's in base32.
        let spec = TorrentSpec::magnet(format!("magnet:?xt=urn:btih:{}", "A".repeat(32)));
        let resolved = spec.resolve()?;
        assert_eq!(resolved.info_hash, InfoHash::from_bytes([0_u8; 20]));
        Ok(())
    }

    #[test]
    fn malformed_magnets_are_rejected() {
        for uri in [
            "http://example.com/file.torrent",
            "magnet:?dn=no-digest",
            "magnet:?xt=urn:btih:tooshort",
            "not a uri at all",
        ] {
            assert!(
                TorrentSpec::magnet(uri).resolve().is_err(),
                "expected rejection for {uri}"
            );
        }
    }

    #[test]
    fn bare_info_hash_resolves_without_metadata() -> Result<()> {
        let resolved = TorrentSpec::info_hash(DEMO_HASH).resolve()?;
        assert_eq!(resolved.info_hash.to_string(), DEMO_HASH);
        assert!(resolved.name.is_none());
        assert!(resolved.total_bytes.is_none());
        Ok(())
    }

    #[test]
    fn base32_rejects_invalid_characters() {
        assert!(decode_base32(&"1".repeat(32)).is_none());
        assert!(decode_base32("AAAA").is_none());
    }

    #[test]
    fn rates_and_durations_format_for_humans() {
        assert_eq!(format_rate(0), "0 B/s");
        assert_eq!(format_rate(512), "512 B/s");
        assert_eq!(format_rate(1_536), "1.5 KiB/s");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(249), "4m 09s");
        assert_eq!(format_duration(3_726), "1h 02m");
    }
}
