//! Torrent engine boundary: piece geometry, priorities, notifications and
//! the engine collaborator trait the filesystem core drives.

pub mod engine;
pub mod layout;
pub mod priority;
pub mod source;

use std::fmt;

pub use engine::{
    AddTorrentParams, EngineNotification, RateLimits, SessionSettings, TorrentEngine,
};
pub use layout::{FileInfo, PieceSlice, TorrentLayout};
pub use priority::PiecePriority;
pub use source::{MagnetLink, MetadataSource};

/// Zero-based piece number, also the unit the priority window moves in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceIndex(pub u32);

impl PieceIndex {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PieceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur at the torrent engine boundary.
///
/// Covers metadata source resolution and engine lifecycle failures. Piece
/// availability problems are never errors here: a missing piece simply
/// keeps its reader waiting.
#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    #[error("Unsupported metadata source: {reason}")]
    UnsupportedSource { reason: String },

    #[error("Invalid magnet link: {reason}")]
    InvalidMagnetLink { reason: String },

    #[error("Can't find metadata at {path}")]
    MetadataNotFound {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid torrent layout: {reason}")]
    InvalidLayout { reason: String },

    #[error("Torrent already added")]
    DuplicateTorrent,

    #[error("Torrent engine has shut down")]
    EngineShutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_index_ordering() {
        let piece1 = PieceIndex::new(5);
        let piece2 = PieceIndex::new(10);
        assert!(piece1 < piece2);
        assert_eq!(piece1.as_u32(), 5);
    }

    #[test]
    fn test_piece_index_display() {
        let piece = PieceIndex::new(42);
        assert_eq!(piece.to_string(), "42");
    }
}
