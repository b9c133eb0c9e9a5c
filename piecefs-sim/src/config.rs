//! Simulation parameters.

use std::time::Duration;

/// Configuration for the simulated swarm.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Random seed for deterministic tie breaking
    pub seed: u64,
    /// Swarm capacity in bytes per second; `None` means pieces arrive as
    /// fast as `max_pieces_per_tick` allows
    pub download_rate_bps: Option<u64>,
    /// Upper bound on pieces completed in one tick
    pub max_pieces_per_tick: usize,
    /// Interval between simulation steps
    pub tick: Duration,
    /// Time a magnet link takes to yield metadata
    pub metadata_delay: Duration,
    /// Number of recently read pieces kept for synchronous access
    pub cache_pieces: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            download_rate_bps: Some(8 * 1024 * 1024), // 8 MB/s
            max_pieces_per_tick: 16,
            tick: Duration::from_millis(10),
            metadata_delay: Duration::from_millis(200),
            cache_pieces: 32,
        }
    }
}

impl SimConfig {
    /// Unthrottled swarm with near-instant metadata, for fast tests.
    pub fn instant() -> Self {
        Self {
            download_rate_bps: None,
            max_pieces_per_tick: 64,
            tick: Duration::from_millis(1),
            metadata_delay: Duration::from_millis(1),
            ..Self::default()
        }
    }

    /// Default configuration with a specific seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_is_unthrottled() {
        let config = SimConfig::instant();
        assert!(config.download_rate_bps.is_none());
        assert!(config.tick < SimConfig::default().tick);
    }

    #[test]
    fn test_with_seed_keeps_defaults() {
        let config = SimConfig::with_seed(7);
        assert_eq!(config.seed, 7);
        assert_eq!(config.cache_pieces, SimConfig::default().cache_pieces);
    }
}
