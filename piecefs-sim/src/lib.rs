//! Piecefs Simulation - A torrent engine without a swarm.
//!
//! [`SimulatedEngine`] implements [`piecefs_core::TorrentEngine`] over content
//! held in memory. A background thread "downloads" pieces in priority order
//! at a configurable rate, serves piece reads asynchronously and keeps a
//! small cache of recently read pieces. Runs are reproducible: the same seed
//! always breaks priority ties the same way.
//!
//! # Example
//!
//! ```rust,no_run
//! use piecefs_core::torrent::MetadataSource;
//! use piecefs_core::{PiecefsConfig, Session};
//! use piecefs_sim::{InMemoryPieceStore, SimConfig, SimulatedEngine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryPieceStore::from_files(16384, [("hello.txt", b"hello".to_vec())])?;
//! let (engine, notifications) = SimulatedEngine::spawn(Some(store), SimConfig::instant())?;
//!
//! let source = MetadataSource::resolve("magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567")?;
//! let session = Session::start(engine, notifications, source, &PiecefsConfig::default())?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod piece_store;
pub mod rng;

pub use config::SimConfig;
pub use engine::{SimStats, SimulatedEngine};
pub use piece_store::InMemoryPieceStore;
pub use rng::DeterministicRng;

use std::path::PathBuf;

use piecefs_core::TorrentError;

/// Errors raised while setting up a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Cannot read content directory {path}: {source}")]
    ContentDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid simulated torrent: {0}")]
    Torrent(#[from] TorrentError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
