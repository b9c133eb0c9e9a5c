//! Torrent engine collaborator interface.
//!
//! The engine owns peers, piece verification and on-disk storage. The
//! filesystem core only steers piece priorities, asks for piece bytes and
//! listens to the notifications the engine emits from its own threads.

use std::path::PathBuf;

use bytes::Bytes;

use super::{MetadataSource, PieceIndex, PiecePriority, TorrentError, TorrentLayout};

/// Session-wide engine settings applied once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Whether end-game mode only kicks in once every piece is requested
    pub strict_end_game_mode: bool,
    /// Announce to every tracker instead of stopping at the first success
    pub announce_to_all_trackers: bool,
    /// Announce to every tracker tier
    pub announce_to_all_tiers: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            strict_end_game_mode: false,
            announce_to_all_trackers: true,
            announce_to_all_tiers: true,
        }
    }
}

/// Per-torrent transfer rate limits in bytes per second.
///
/// `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimits {
    pub download: Option<u64>,
    pub upload: Option<u64>,
}

/// Everything the engine needs to start a torrent.
#[derive(Debug, Clone)]
pub struct AddTorrentParams {
    pub source: MetadataSource,
    /// Scratch directory holding downloaded piece data
    pub save_path: PathBuf,
    pub settings: SessionSettings,
}

/// Asynchronous notification delivered by the engine.
#[derive(Debug, Clone)]
pub enum EngineNotification {
    /// Bytes of a piece requested through `request_piece_read`.
    PieceRead { piece: PieceIndex, data: Bytes },
    /// A piece finished downloading and passed verification.
    PieceFinished { piece: PieceIndex },
    /// Metadata arrived from the swarm; `layout()` now answers.
    MetadataReceived,
    /// The swarm could not supply metadata.
    MetadataFailed { reason: String },
    /// The torrent was added to the session.
    TorrentAdded { has_metadata: bool },
    /// Any other engine event; carried for logging only.
    Other { kind: &'static str },
}

impl EngineNotification {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineNotification::PieceRead { .. } => "piece_read",
            EngineNotification::PieceFinished { .. } => "piece_finished",
            EngineNotification::MetadataReceived => "metadata_received",
            EngineNotification::MetadataFailed { .. } => "metadata_failed",
            EngineNotification::TorrentAdded { .. } => "torrent_added",
            EngineNotification::Other { kind } => *kind,
        }
    }
}

/// Synchronous control surface of a torrent engine.
///
/// Implementations do their own internal locking and must never call back
/// into the filesystem core synchronously; results of asynchronous requests
/// arrive as [`EngineNotification`]s on the engine's channel.
pub trait TorrentEngine: Send + Sync {
    /// Starts the torrent described by `params`.
    ///
    /// # Errors
    ///
    /// - `TorrentError::DuplicateTorrent` - If a torrent is already running
    /// - `TorrentError::EngineShutdown` - If the engine has stopped
    fn add_torrent(&self, params: AddTorrentParams) -> Result<(), TorrentError>;

    /// Applies session-wide settings.
    fn apply_settings(&self, settings: SessionSettings);

    /// Piece and file geometry, or `None` while metadata is unknown.
    fn layout(&self) -> Option<TorrentLayout>;

    /// Whether the piece is downloaded and verified.
    fn have_piece(&self, piece: PieceIndex) -> bool;

    fn set_piece_priority(&self, piece: PieceIndex, priority: PiecePriority);

    fn set_file_priority(&self, file_index: usize, priority: PiecePriority);

    /// Asks for a downloaded piece's bytes; answered by `PieceRead`.
    fn request_piece_read(&self, piece: PieceIndex);

    fn set_rate_limits(&self, limits: RateLimits);

    /// Bytes of a downloaded piece that can be served without a round trip.
    fn cached_piece(&self, _piece: PieceIndex) -> Option<Bytes> {
        None
    }
}
