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

//! Daemon configuration: defaults, optional TOML file, environment
//! overrides.
//!
//! Precedence is defaults < file < `RIPTIDE_*` environment variables. A
//! missing file falls back to defaults; a present-but-invalid file is a
//! startup error so misconfiguration never degrades silently.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the config file path.
pub const CONFIG_PATH_VAR: &str = "RIPTIDE_CONFIG";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}")]
    Read {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The config file contents are not valid TOML for [`Config`].
    #[error("failed to parse config file {path}")]
    Parse {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying TOML failure.
        #[source]
        source: toml::de::Error,
    },
}

/// Daemon configuration.
///
/// File: `$RIPTIDE_CONFIG`, else `./riptide.toml`, else
/// `~/.config/riptide/config.toml`, else `/etc/riptide/config.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the control API binds to (default 127.0.0.1).
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,
    /// Control API port (default 3030).
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Directory the transport writes payloads into (default ./downloads).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Stats aggregator refresh interval in milliseconds (default 2000).
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
    /// How long to await transport acknowledgments before reporting an
    /// internal error, in milliseconds (default 5000).
    #[serde(default = "default_ack_timeout_ms")]
    pub engine_ack_timeout_ms: u64,
    /// Whether a second torrent with an already-tracked info-hash may be
    /// added (default false).
    #[serde(default)]
    pub allow_duplicates: bool,
    /// Whether `start` on an already-running torrent is a conflict rather
    /// than an idempotent no-op (default false).
    #[serde(default)]
    pub strict_start: bool,
    /// File extensions considered playable when rendering playlists.
    #[serde(default = "default_playlist_extensions")]
    pub playlist_extensions: Vec<String>,
    /// Log level when `RUST_LOG` is not set (default "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON logs instead of the human-readable format (default false).
    #[serde(default)]
    pub log_json: bool,
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_http_port() -> u16 {
    3030
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_stats_interval_ms() -> u64 {
    2_000
}

fn default_ack_timeout_ms() -> u64 {
    5_000
}

fn default_playlist_extensions() -> Vec<String> {
    [
        "mp4", "mkv", "avi", "webm", "mov", "m4v", "mp3", "flac", "ogg", "opus", "m4a", "wav",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            http_port: default_http_port(),
            output_dir: default_output_dir(),
            stats_interval_ms: default_stats_interval_ms(),
            engine_ack_timeout_ms: default_ack_timeout_ms(),
            allow_duplicates: false,
            strict_start: false,
            playlist_extensions: default_playlist_extensions(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration: merge defaults, the first config file found, and
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when a config file is present but unreadable or
    /// malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match located_file() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is unreadable or malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `RIPTIDE_*` overrides from the supplied lookup.
    ///
    /// Values that fail to parse are ignored, keeping the previous value;
    /// overrides are a convenience layer, not a validation surface.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(value) = get("RIPTIDE_BIND_ADDR")
            && let Ok(addr) = value.parse()
        {
            self.bind_addr = addr;
        }
        if let Some(value) = get("RIPTIDE_HTTP_PORT")
            && let Ok(port) = value.parse()
        {
            self.http_port = port;
        }
        if let Some(value) = get("RIPTIDE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(value);
        }
        if let Some(value) = get("RIPTIDE_LOG_LEVEL") {
            self.log_level = value;
        }
    }

    /// Socket address the control API listens on.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.http_port)
    }

    /// Stats aggregator refresh interval.
    #[must_use]
    pub const fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    /// Transport acknowledgment timeout.
    #[must_use]
    pub const fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_ack_timeout_ms)
    }
}

fn located_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
        return Some(PathBuf::from(path));
    }
    let mut candidates = vec![PathBuf::from("riptide.toml")];
    if let Some(home) = std::env::var_os("HOME") {
        candidates.push(PathBuf::from(home).join(".config/riptide/config.toml"));
    }
    candidates.push(PathBuf::from("/etc/riptide/config.toml"));
    candidates.into_iter().find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.http_port, 3030);
        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:3030");
        assert!(!config.allow_duplicates);
        assert!(!config.strict_start);
        assert_eq!(config.stats_interval(), Duration::from_millis(2_000));
        assert!(config.playlist_extensions.iter().any(|ext| ext == "mkv"));
    }

    #[test]
    fn file_values_override_defaults() -> Result<()> {
        let config: Config = toml::from_str(
            r#"
            http_port = 4040
            allow_duplicates = true
            playlist_extensions = ["mkv"]
            "#,
        )?;
        assert_eq!(config.http_port, 4040);
        assert!(config.allow_duplicates);
        assert_eq!(config.playlist_extensions, vec!["mkv".to_string()]);
        assert_eq!(config.bind_addr, default_bind_addr());
        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Config, _> = toml::from_str("htpp_port = 4040");
        assert!(result.is_err(), "typoed keys must not pass silently");
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "RIPTIDE_HTTP_PORT" => Some("9090".to_string()),
            "RIPTIDE_BIND_ADDR" => Some("0.0.0.0".to_string()),
            _ => None,
        });
        assert_eq!(config.http_port, 9090);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0");
    }

    #[test]
    fn unparseable_env_values_keep_previous_settings() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "RIPTIDE_HTTP_PORT" => Some("not-a-port".to_string()),
            _ => None,
        });
        assert_eq!(config.http_port, 3030);
    }
}
