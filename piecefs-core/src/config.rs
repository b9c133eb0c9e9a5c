//! Centralized configuration for piecefs.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

use crate::torrent::{RateLimits, SessionSettings};

/// Central configuration for all piecefs components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct PiecefsConfig {
    pub window: WindowConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub dispatch: DispatchConfig,
}

/// Piece priority window configuration.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Bytes ahead of the cursor held at urgent priority, rounded up to whole pieces
    pub urgent_window_bytes: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            urgent_window_bytes: 2 * 1024 * 1024, // 2 MiB
        }
    }
}

/// Transfer limits and session settings handed to the engine.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Download bandwidth limit in bytes per second (None = unlimited)
    pub download_limit: Option<u64>,
    /// Upload bandwidth limit in bytes per second (None = unlimited)
    pub upload_limit: Option<u64>,
    pub session: SessionSettings,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            download_limit: Some(5 * 1024 * 1024 / 8), // 5 Mbit/s
            upload_limit: Some(5 * 1024 * 1024 / 8),
            session: SessionSettings::default(),
        }
    }
}

impl NetworkConfig {
    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            download: self.download_limit,
            upload: self.upload_limit,
        }
    }
}

/// Scratch directory configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root under which per-run scratch directories are created.
    /// Falls back to `$HOME/piecefs`, then to the system temp directory.
    pub target_root: Option<PathBuf>,
    /// Prefix of the per-run scratch directory name
    pub scratch_prefix: &'static str,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            target_root: None,
            scratch_prefix: "piecefs-",
        }
    }
}

/// Event dispatch loop configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Longest time the loop waits for a notification before checking for shutdown
    pub poll_interval: Duration,
    /// Name given to the dispatch thread
    pub thread_name: &'static str,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            thread_name: "piecefs-dispatch",
        }
    }
}

impl PiecefsConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(bytes) = std::env::var("PIECEFS_URGENT_WINDOW_BYTES") {
            if let Ok(value) = bytes.parse::<u64>() {
                config.window.urgent_window_bytes = value;
            }
        }

        if let Ok(limit) = std::env::var("PIECEFS_DOWNLOAD_LIMIT") {
            if let Some(value) = parse_limit(&limit) {
                config.network.download_limit = value;
            }
        }

        if let Ok(limit) = std::env::var("PIECEFS_UPLOAD_LIMIT") {
            if let Some(value) = parse_limit(&limit) {
                config.network.upload_limit = value;
            }
        }

        if let Ok(target) = std::env::var("PIECEFS_TARGET") {
            if !target.is_empty() {
                config.storage.target_root = Some(PathBuf::from(target));
            }
        }

        if let Ok(interval) = std::env::var("PIECEFS_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse::<u64>() {
                config.dispatch.poll_interval = Duration::from_millis(ms.max(1));
            }
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Short poll interval so shutdown is quick, small urgent window so
    /// window arithmetic is visible with tiny pieces, no rate limits.
    pub fn for_testing() -> Self {
        Self {
            window: WindowConfig {
                urgent_window_bytes: 64 * 1024,
            },
            network: NetworkConfig {
                download_limit: None,
                upload_limit: None,
                session: SessionSettings::default(),
            },
            dispatch: DispatchConfig {
                poll_interval: Duration::from_millis(10),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Parses a limit value; `0` and `unlimited` mean no limit.
fn parse_limit(raw: &str) -> Option<Option<u64>> {
    if raw.eq_ignore_ascii_case("unlimited") {
        return Some(None);
    }
    match raw.parse::<u64>() {
        Ok(0) => Some(None),
        Ok(value) => Some(Some(value)),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = PiecefsConfig::default();

        assert_eq!(config.window.urgent_window_bytes, 0x200000);
        assert_eq!(config.network.download_limit, Some(655_360));
        assert_eq!(config.network.upload_limit, Some(655_360));
        assert_eq!(config.dispatch.poll_interval, Duration::from_secs(1));
        assert!(config.storage.target_root.is_none());
    }

    #[test]
    fn test_testing_config_is_unlimited() {
        let config = PiecefsConfig::for_testing();
        assert_eq!(config.network.rate_limits(), RateLimits::default());
        assert!(config.dispatch.poll_interval < Duration::from_secs(1));
    }

    #[test]
    fn test_parse_limit_values() {
        assert_eq!(parse_limit("1024"), Some(Some(1024)));
        assert_eq!(parse_limit("0"), Some(None));
        assert_eq!(parse_limit("Unlimited"), Some(None));
        assert_eq!(parse_limit("fast"), None);
    }
}
