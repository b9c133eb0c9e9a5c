//! Piecefs Core - Read-only filesystem over a downloading torrent
//!
//! Files appear with their final size as soon as metadata is known, and byte
//! ranges become readable as the pieces behind them arrive. Reads block
//! until their pieces are delivered while a sliding priority window pulls
//! the engine's download order toward the read position.

pub mod config;
pub mod fs;
pub mod session;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_mocks;
pub mod torrent;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::PiecefsConfig;
pub use fs::{FsError, FsStats, Lookup, TorrentFs};
pub use session::Session;
pub use storage::{ScratchDir, StorageError};
pub use torrent::{TorrentEngine, TorrentError};

/// Core errors that can bubble up from any piecefs subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PiecefsError {
    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PiecefsError {
    /// Checks if this error stops the process from serving at all.
    ///
    /// An unusable scratch directory or metadata source is fatal at startup.
    /// Everything else is local to one operation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PiecefsError::Configuration { .. }
                | PiecefsError::Torrent(
                    TorrentError::UnsupportedSource { .. }
                        | TorrentError::InvalidMagnetLink { .. }
                        | TorrentError::MetadataNotFound { .. }
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, PiecefsError>;
