//! Read-only filesystem view over a torrent that is still downloading.
//!
//! Files show up with their final size as soon as metadata is known. A read
//! blocks its calling thread until every piece it touches has been delivered,
//! while steering the engine's download order toward the read position.

pub mod dispatch;
pub mod namespace;
pub mod read;
pub mod state;
pub mod window;

use std::sync::Arc;
use std::time::Duration;

pub use dispatch::{DispatcherHandle, spawn_dispatcher};
pub use namespace::{FileEntry, Lookup, Namespace};
pub use read::{DecomposeError, Part, ReadTracker, decompose};
pub use state::{FsShared, FsStats, ReadId, SharedState};
pub use window::{PieceWindow, WindowGeometry, WindowSpan};

use crate::config::PiecefsConfig;
use crate::torrent::TorrentEngine;

/// Errors surfaced to the filesystem binding.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("No such file or directory: {path}")]
    NotFound { path: String },

    #[error("Is a directory: {path}")]
    IsDirectory { path: String },

    #[error("Not a directory: {path}")]
    NotDirectory { path: String },

    /// Metadata has not arrived yet, so no file exists.
    #[error("Torrent metadata not available yet")]
    NotReady,

    /// The dispatch loop stopped before the read could be satisfied.
    #[error("Read interrupted by shutdown")]
    Interrupted,

    #[error("Cannot map read onto pieces: {0}")]
    Decompose(#[from] DecomposeError),
}

/// Filesystem core shared by every binding thread.
///
/// Cloning is cheap; all clones see the same state.
#[derive(Clone)]
pub struct TorrentFs {
    shared: Arc<FsShared>,
    engine: Arc<dyn TorrentEngine>,
}

impl TorrentFs {
    /// Creates an unpopulated filesystem driving `engine`.
    ///
    /// Nothing happens until a dispatcher feeds it notifications; see
    /// [`spawn_dispatcher`].
    pub fn new(engine: Arc<dyn TorrentEngine>, config: &PiecefsConfig) -> Self {
        Self {
            shared: Arc::new(FsShared::new(config.window.urgent_window_bytes)),
            engine,
        }
    }

    /// True once metadata arrived and the namespace is built.
    pub fn is_ready(&self) -> bool {
        self.shared.lock().namespace.is_built()
    }

    /// Blocks until the namespace is built, the dispatcher stops, or `timeout` passes.
    ///
    /// Returns whether the filesystem is ready.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = state::deadline_after(timeout);
        let mut state = self.shared.lock();
        while !state.namespace.is_built() && !state.closed {
            if !self.shared.wait_until(&mut state, deadline) {
                break;
            }
        }
        state.namespace.is_built()
    }

    pub fn lookup(&self, path: &str) -> Lookup {
        self.shared.lock().namespace.lookup(path)
    }

    /// Sorted child names of a directory.
    ///
    /// # Errors
    ///
    /// - `FsError::NotDirectory` - If `path` is a file
    /// - `FsError::NotFound` - If `path` does not exist
    pub fn read_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        match self.lookup(path) {
            Lookup::Directory(children) => Ok(children),
            Lookup::File { .. } => Err(FsError::NotDirectory {
                path: path.to_string(),
            }),
            Lookup::NotFound => Err(FsError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    /// Reads up to `buffer.len()` bytes of `path` starting at `offset`.
    ///
    /// Blocks the calling thread until every piece the range touches has
    /// been delivered. Reads at or past the end of the file return `Ok(0)`.
    /// There is no timeout: if the swarm never supplies a piece, the call
    /// only returns when the dispatcher shuts down.
    ///
    /// # Errors
    ///
    /// - `FsError::NotReady` - If metadata has not arrived yet
    /// - `FsError::NotFound` - If `path` does not exist
    /// - `FsError::IsDirectory` - If `path` is a directory
    /// - `FsError::Interrupted` - If the dispatcher stopped while waiting
    /// - `FsError::Decompose` - If the layout cannot place the range
    pub fn read(&self, path: &str, offset: u64, buffer: &mut [u8]) -> Result<usize, FsError> {
        let mut state = self.shared.lock();

        if !state.namespace.is_built() {
            return Err(FsError::NotReady);
        }
        if state.namespace.is_dir(path) {
            return Err(FsError::IsDirectory {
                path: path.to_string(),
            });
        }
        let (Some(file), Some(layout)) = (state.namespace.file(path), state.layout.as_ref()) else {
            return Err(FsError::NotFound {
                path: path.to_string(),
            });
        };

        let parts = match decompose(layout, file, offset, buffer.len() as u64) {
            Ok(parts) => parts,
            Err(DecomposeError::OutOfRange { .. }) => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        if parts.is_empty() {
            return Ok(0);
        }

        let tracker = ReadTracker::new(parts);
        let lead = tracker.lead_piece();
        let size = tracker.size();
        let id = state.register(tracker);

        if let Some(tracker) = state.reads.get_mut(&id) {
            tracker.trigger(&*self.engine);
        }
        if let (Some(geometry), Some(lead)) = (state.geometry(), lead) {
            state.window.recompute(&*self.engine, geometry, lead, size);
        }

        let mut waited = false;
        while !state.is_filled(id) && !state.closed {
            waited = true;
            self.shared.wait(&mut state);
        }

        let tracker = state.unregister(id).filter(ReadTracker::is_filled);
        match tracker {
            Some(_) => {
                state.stats.reads_completed += 1;
                if waited {
                    state.stats.blocking_reads += 1;
                }
            }
            None => state.stats.reads_interrupted += 1,
        }
        drop(state);

        match tracker {
            Some(tracker) => Ok(tracker.write_into(buffer)),
            None => Err(FsError::Interrupted),
        }
    }

    pub fn stats(&self) -> FsStats {
        self.shared.lock().snapshot()
    }
}

impl std::fmt::Debug for TorrentFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorrentFs")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::test_mocks::{MockEngine, content_range};
    use crate::torrent::{EngineNotification, PieceIndex, PiecePriority, TorrentLayout};

    const PIECE: u32 = 16384;

    struct Fixture {
        engine: Arc<MockEngine>,
        fs: TorrentFs,
        dispatcher: Option<DispatcherHandle>,
    }

    impl Fixture {
        fn new(layout: TorrentLayout) -> Self {
            let (engine, notifications) = MockEngine::with_layout(layout);
            let config = PiecefsConfig::for_testing();
            let fs = TorrentFs::new(engine.clone(), &config);
            let dispatcher = spawn_dispatcher(&fs, notifications, &config).unwrap();
            engine.notify(EngineNotification::MetadataReceived);
            assert!(fs.wait_ready(Duration::from_secs(5)));
            Self {
                engine,
                fs,
                dispatcher: Some(dispatcher),
            }
        }

        fn movie() -> Self {
            Self::new(TorrentLayout::new(PIECE, [("movie.mp4", 50_000u64)]).unwrap())
        }

        fn wait_for_pending(&self, count: usize) {
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            while self.fs.stats().pending_reads < count {
                assert!(std::time::Instant::now() < deadline, "read never registered");
                thread::sleep(Duration::from_millis(2));
            }
        }
    }

    #[test]
    fn test_blocked_read_completes_on_delivery() {
        let fixture = Fixture::movie();
        let reader = {
            let fs = fixture.fs.clone();
            thread::spawn(move || {
                let mut buffer = vec![0u8; 100];
                let n = fs.read("/movie.mp4", 16_000, &mut buffer).unwrap();
                (n, buffer)
            })
        };

        fixture.wait_for_pending(1);
        assert_eq!(fixture.engine.priority(PieceIndex::new(0)), PiecePriority::Urgent);

        fixture.engine.finish_piece(PieceIndex::new(0));
        fixture.engine.deliver_piece(PieceIndex::new(0));
        fixture.engine.finish_piece(PieceIndex::new(1));
        fixture.engine.deliver_piece(PieceIndex::new(1));

        let (n, buffer) = reader.join().unwrap();
        assert_eq!(n, 100);
        assert_eq!(buffer, content_range(16_000, 100));

        let stats = fixture.fs.stats();
        assert_eq!(stats.reads_completed, 1);
        assert_eq!(stats.blocking_reads, 1);
        assert_eq!(stats.pending_reads, 0);
    }

    #[test]
    fn test_unrelated_piece_does_not_wake_read() {
        let fixture = Fixture::movie();
        let reader = {
            let fs = fixture.fs.clone();
            thread::spawn(move || {
                let mut buffer = vec![0u8; 10];
                fs.read("/movie.mp4", 0, &mut buffer)
            })
        };

        fixture.wait_for_pending(1);
        fixture.engine.finish_piece(PieceIndex::new(2));
        fixture.engine.deliver_piece(PieceIndex::new(2));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(fixture.fs.stats().pending_reads, 1);
        assert!(!reader.is_finished());

        fixture.engine.finish_piece(PieceIndex::new(0));
        fixture.engine.deliver_piece(PieceIndex::new(0));
        assert_eq!(reader.join().unwrap().unwrap(), 10);
    }

    #[test]
    fn test_cached_pieces_complete_without_blocking() {
        let fixture = Fixture::movie();
        fixture.engine.enable_cache();
        for piece in 0..4 {
            fixture.engine.mark_have(PieceIndex::new(piece));
        }

        let mut buffer = vec![0u8; 50_000];
        let n = fixture.fs.read("/movie.mp4", 0, &mut buffer).unwrap();

        assert_eq!(n, 50_000);
        assert_eq!(buffer, content_range(0, 50_000));
        assert_eq!(fixture.fs.stats().blocking_reads, 0);
        assert!(fixture.engine.read_requests().is_empty());
    }

    #[test]
    fn test_served_reads_complete_through_dispatch() {
        let fixture = Fixture::movie();
        fixture.engine.serve_reads();
        fixture.engine.mark_have(PieceIndex::new(3));

        let mut buffer = vec![0u8; 1_000];
        let n = fixture.fs.read("/movie.mp4", 49_999, &mut buffer).unwrap();

        assert_eq!(n, 1);
        assert_eq!(buffer[0], content_range(49_999, 1)[0]);
    }

    #[test]
    fn test_read_at_end_returns_zero() {
        let fixture = Fixture::movie();
        let mut buffer = vec![0u8; 10];

        assert_eq!(fixture.fs.read("/movie.mp4", 50_000, &mut buffer).unwrap(), 0);
        assert_eq!(fixture.fs.read("/movie.mp4", 90_000, &mut buffer).unwrap(), 0);
        assert_eq!(fixture.fs.read("/movie.mp4", 0, &mut []).unwrap(), 0);
        assert_eq!(fixture.fs.stats().pending_reads, 0);
    }

    #[test]
    fn test_read_rejects_directories_and_missing_files() {
        let fixture = Fixture::new(
            TorrentLayout::new(PIECE, [("season/ep1.mkv", 10u64), ("season/ep2.mkv", 10)])
                .unwrap(),
        );
        let mut buffer = vec![0u8; 10];

        assert!(matches!(
            fixture.fs.read("/season", 0, &mut buffer),
            Err(FsError::IsDirectory { .. })
        ));
        assert!(matches!(
            fixture.fs.read("/season/ep3.mkv", 0, &mut buffer),
            Err(FsError::NotFound { .. })
        ));
        assert!(matches!(
            fixture.fs.read_dir("/season/ep1.mkv"),
            Err(FsError::NotDirectory { .. })
        ));
        assert_eq!(fixture.fs.read_dir("/").unwrap(), vec!["season"]);
    }

    #[test]
    fn test_read_before_metadata_is_not_ready() {
        let (engine, _notifications) = MockEngine::new();
        let fs = TorrentFs::new(engine, &PiecefsConfig::for_testing());
        let mut buffer = vec![0u8; 10];

        assert!(matches!(
            fs.read("/movie.mp4", 0, &mut buffer),
            Err(FsError::NotReady)
        ));
        assert!(!fs.wait_ready(Duration::from_millis(10)));
    }

    #[test]
    fn test_shutdown_interrupts_blocked_read() {
        let mut fixture = Fixture::movie();
        let reader = {
            let fs = fixture.fs.clone();
            thread::spawn(move || {
                let mut buffer = vec![0u8; 10];
                fs.read("/movie.mp4", 0, &mut buffer)
            })
        };

        fixture.wait_for_pending(1);
        fixture.dispatcher.take().unwrap().shutdown();

        assert!(matches!(reader.join().unwrap(), Err(FsError::Interrupted)));
        let stats = fixture.fs.stats();
        assert_eq!(stats.reads_interrupted, 1);
        assert_eq!(stats.pending_reads, 0);
    }

    #[test]
    fn test_concurrent_reads_share_one_delivery() {
        let fixture = Fixture::movie();
        let readers: Vec<_> = (0..3)
            .map(|i| {
                let fs = fixture.fs.clone();
                thread::spawn(move || {
                    let mut buffer = vec![0u8; 64];
                    let n = fs.read("/movie.mp4", i * 1000, &mut buffer).unwrap();
                    (i, n, buffer)
                })
            })
            .collect();

        fixture.wait_for_pending(3);
        fixture.engine.finish_piece(PieceIndex::new(0));
        fixture.engine.deliver_piece(PieceIndex::new(0));

        for reader in readers {
            let (i, n, buffer) = reader.join().unwrap();
            assert_eq!(n, 64);
            assert_eq!(buffer, content_range(i * 1000, 64));
        }
    }
}
